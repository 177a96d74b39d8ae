use std::io::{self, BufRead, IsTerminal, StdinLock, Stdout, Write};

use crate::credentials::Credentials;
use crate::settings::KNOWN_REGIONS;

/// Reads one line without echoing it.
pub type SecretReader = fn(&str) -> io::Result<String>;

fn read_hidden(prompt: &str) -> io::Result<String> {
    rpassword::prompt_password(prompt)
}

pub struct Prompter<R, W> {
    input: R,
    output: W,
    secret_reader: Option<SecretReader>,
}

impl Prompter<StdinLock<'static>, Stdout> {
    /// Prompts on the process terminal. Secrets are read without echo when
    /// stdin is a TTY.
    pub fn terminal() -> Self {
        let prompter = Prompter::new(io::stdin().lock(), io::stdout());
        if io::stdin().is_terminal() {
            prompter.with_secret_reader(read_hidden)
        } else {
            prompter
        }
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            secret_reader: None,
        }
    }

    pub fn with_secret_reader(mut self, reader: SecretReader) -> Self {
        self.secret_reader = Some(reader);
        self
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    /// Returns `None` once input is exhausted.
    pub fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask_secret(&mut self, question: &str) -> io::Result<Option<String>> {
        let Some(read) = self.secret_reader else {
            return self.ask(question);
        };
        self.output.flush()?;
        match read(question) {
            Ok(secret) => Ok(Some(secret.trim().to_string())),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn confirm_yes(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{question} Type 'yes' to continue: "))?;
        Ok(answer.is_some_and(|answer| answer.eq_ignore_ascii_case("yes")))
    }

    /// Destructive actions on a named resource require retyping the name.
    pub fn confirm_typed(&mut self, question: &str, expected: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{question} Type '{expected}' to confirm: "))?;
        Ok(answer.as_deref() == Some(expected))
    }

    pub fn credentials(&mut self, current: Option<&Credentials>) -> io::Result<Option<Credentials>> {
        let access_prompt = match current {
            Some(current) => format!("AWS access key ID [{}]: ", current.masked_access_key()),
            None => "AWS access key ID: ".to_string(),
        };
        let Some(access_key) = self.ask(&access_prompt)? else {
            return Ok(None);
        };
        let access_key = match (access_key.is_empty(), current) {
            (true, Some(current)) => current.access_key.clone(),
            _ => access_key,
        };

        let secret_prompt = if current.is_some() {
            "AWS secret access key [keep current]: "
        } else {
            "AWS secret access key: "
        };
        let Some(secret_key) = self.ask_secret(secret_prompt)? else {
            return Ok(None);
        };
        let secret_key = match (secret_key.is_empty(), current) {
            (true, Some(current)) => current.secret_key.clone(),
            _ => secret_key,
        };

        let Some(region) = self.ask("Default region (blank to keep): ")? else {
            return Ok(None);
        };

        let mut credentials = Credentials::new(access_key, secret_key);
        if !region.is_empty() {
            credentials = credentials.with_region(region);
        }
        if !credentials.is_complete() {
            writeln!(self.output, "Both the access key and the secret key are required.")?;
            return Ok(None);
        }
        Ok(Some(credentials))
    }

    /// Asks for a bucket name and a region, by number or name.
    pub fn create_bucket(&mut self, default_region: &str) -> io::Result<Option<(String, String)>> {
        let Some(name) = self.ask("New bucket name: ")? else {
            return Ok(None);
        };
        if name.is_empty() {
            return Ok(None);
        }

        for (index, region) in KNOWN_REGIONS.iter().enumerate() {
            writeln!(self.output, "  {:>2}. {region}", index + 1)?;
        }
        let Some(choice) = self.ask(&format!("Region [{default_region}]: "))? else {
            return Ok(None);
        };
        let region = if choice.is_empty() {
            default_region.to_string()
        } else if let Ok(number) = choice.parse::<usize>() {
            match KNOWN_REGIONS.get(number.wrapping_sub(1)) {
                Some(region) => region.to_string(),
                None => {
                    writeln!(self.output, "No region numbered {number}.")?;
                    return Ok(None);
                }
            }
        } else {
            choice
        };
        Ok(Some((name, region)))
    }
}
