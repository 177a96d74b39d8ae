use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    None,
    Indices(BTreeSet<usize>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    Help,
    Buckets,
    Use(String),
    Info,
    Files,
    Select(Selection),
    Download(Option<String>),
    Delete,
    Permissions,
    CreateBucket,
    DeleteBucket,
    Logs,
    ClearLogs,
    ExportLogs(Option<String>),
    Credentials,
    Forget,
    Status,
    Quit,
}

pub const HELP: &str = "\
Buckets
  buckets                 list buckets
  use <name|number>       open a bucket and list its files
  info                    details of the open bucket
  permissions             check access to the open bucket
  create-bucket           create a new bucket
  delete-bucket           empty and delete the open bucket
Files
  files                   reload the file list
  select <1,3-5|all|none> choose files by number
  download [dir]          download the selected files (default ~/Downloads)
  delete                  delete the selected files
Logs
  logs                    show the log
  logs clear              clear the log
  logs export [file]      write the log to a text file
Other
  credentials             enter AWS credentials
  forget                  remove stored credentials
  status                  show the current operation
  help, quit";

/// Parses `1,3-5 8` style selections against a 1-based list of `count` items
/// into 0-based indices.
pub fn parse_selection(input: &str, count: usize) -> Result<Selection, String> {
    let input = input.trim();
    match input.to_ascii_lowercase().as_str() {
        "" => return Err("Nothing to select".to_string()),
        "all" | "*" => return Ok(Selection::All),
        "none" => return Ok(Selection::None),
        _ => {}
    }

    let parse_index = |raw: &str| -> Result<usize, String> {
        let value: usize = raw
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not a file number", raw.trim()))?;
        if value == 0 || value > count {
            return Err(format!("{value} is out of range (1-{count})"));
        }
        Ok(value - 1)
    };

    let mut indices = BTreeSet::new();
    for part in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
    {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (parse_index(start)?, parse_index(end)?);
                if start > end {
                    return Err(format!("Range {part} is reversed"));
                }
                indices.extend(start..=end);
            }
            None => {
                indices.insert(parse_index(part)?);
            }
        }
    }
    Ok(Selection::Indices(indices))
}

pub fn parse_command(line: &str, file_count: usize) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());

    let command = match head.to_ascii_lowercase().as_str() {
        "help" | "?" => ShellCommand::Help,
        "buckets" | "refresh" => ShellCommand::Buckets,
        "use" | "open" if !rest.is_empty() => ShellCommand::Use(rest.to_string()),
        "use" | "open" => return Err("Usage: use <bucket name or number>".to_string()),
        "info" => ShellCommand::Info,
        "files" | "ls" => ShellCommand::Files,
        "select" => ShellCommand::Select(parse_selection(rest, file_count)?),
        "download" => ShellCommand::Download(optional(rest)),
        "delete" | "rm" => ShellCommand::Delete,
        "permissions" | "perms" => ShellCommand::Permissions,
        "create-bucket" => ShellCommand::CreateBucket,
        "delete-bucket" => ShellCommand::DeleteBucket,
        "logs" | "log" => {
            let (sub, arg) = match rest.split_once(char::is_whitespace) {
                Some((sub, arg)) => (sub, arg.trim()),
                None => (rest, ""),
            };
            match sub {
                "" => ShellCommand::Logs,
                "clear" => ShellCommand::ClearLogs,
                "export" => ShellCommand::ExportLogs(optional(arg)),
                other => return Err(format!("Unknown logs action '{other}'")),
            }
        }
        "credentials" | "configure" => ShellCommand::Credentials,
        "forget" => ShellCommand::Forget,
        "status" => ShellCommand::Status,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        "" => return Err(String::new()),
        other => return Err(format!("Unknown command '{other}'. Type 'help' for a list.")),
    };
    Ok(command)
}
