//! Interactive terminal front end. It renders worker events on a pump thread
//! and never talks to S3 itself.

pub mod command;
pub mod logbook;
pub mod prompt;
pub mod render;
pub mod state;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::debug;

use crate::app::Session;
use crate::config_paths::{
    downloads_dir, expand_user_path, first_run_marker_path, onboarding_due, touch_marker,
};
use crate::worker::{EventPayload, LogLevel, Operation, Worker, WorkerEvent};

use command::{parse_command, ShellCommand, HELP};
use prompt::Prompter;
use render::{bucket_table, event_line, object_table};
use state::{ShellState, View};

const WELCOME: &str = "\
Welcome to s3manager.
Browse, download and delete objects, manage buckets and check permissions.
Credentials are kept in the OS keychain (when available) and ~/.aws/credentials.";

type SharedState = Arc<Mutex<ShellState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ShellState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn print_event(state: &ShellState, event: &WorkerEvent) {
    match &event.payload {
        EventPayload::BucketsListed { buckets } if state.view == View::Buckets => {
            println!("{}", bucket_table(buckets, state.bucket.as_deref()));
        }
        EventPayload::ObjectsListed { bucket, objects }
            if state.bucket.as_deref() == Some(bucket.as_str()) =>
        {
            println!("Files in '{bucket}':");
            println!("{}", object_table(objects, &state.selected));
        }
        EventPayload::BucketsListed { .. }
        | EventPayload::ObjectsListed { .. }
        | EventPayload::PermissionsChecked { .. } => {}
        _ => println!("{}", event_line(event)),
    }
}

fn spawn_pump(
    worker: Weak<Worker>,
    state: SharedState,
    events: Receiver<WorkerEvent>,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("s3manager-events".to_string())
        .spawn(move || {
            for event in events {
                let follow_up = {
                    let mut state = lock(&state);
                    let follow_up = state.apply(&event);
                    print_event(&state, &event);
                    follow_up
                };
                let Some(operation) = follow_up else {
                    continue;
                };
                let Some(live) = worker.upgrade() else {
                    continue;
                };
                if let Err(err) = live.submit(operation) {
                    println!("Could not refresh: {err}");
                    lock(&state).logs.push(LogLevel::Warning, err.to_string());
                }
            }
            debug!("Event pump stopped");
        })
}

struct Shell<R, W> {
    session: Session,
    state: SharedState,
    prompter: Prompter<R, W>,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    fn submit(&self, operation: Operation) {
        if let Err(err) = self.session.worker.submit(operation) {
            println!("{err}");
            lock(&self.state).logs.push(LogLevel::Warning, err.to_string());
        }
    }

    fn open_bucket(&self) -> Option<String> {
        let bucket = lock(&self.state).bucket.clone();
        if bucket.is_none() {
            println!("No bucket is open. Use 'buckets' and 'use <name>' first.");
        }
        bucket
    }

    fn onboarding(&mut self) -> Result<()> {
        let marker = first_run_marker_path()?;
        let has_credentials = self.session.store.has_credentials();
        if !onboarding_due(&marker, has_credentials) {
            return Ok(());
        }

        println!("{WELCOME}\n");
        if !has_credentials {
            println!("No AWS credentials were found. Enter them now or later with 'credentials'.");
            self.configure_credentials()?;
        }
        touch_marker(&marker)?;
        Ok(())
    }

    fn configure_credentials(&mut self) -> Result<()> {
        let current = self.session.credentials().map(|(credentials, _)| credentials);
        let Some(credentials) = self.prompter.credentials(current.as_ref())? else {
            println!("Credentials unchanged.");
            return Ok(());
        };
        for note in self.session.save_credentials(&credentials)? {
            println!("{note}");
        }
        lock(&self.state)
            .logs
            .push(LogLevel::Info, "Credentials saved".to_string());
        Ok(())
    }

    fn print_info(&self) {
        let state = lock(&self.state);
        let Some(bucket) = state.bucket.as_deref() else {
            println!("No bucket is open.");
            return;
        };
        println!("Bucket: {bucket}");
        if let Some(summary) = state.buckets.iter().find(|b| b.name == bucket) {
            if let Some(created) = summary.created_at {
                println!("Created: {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        let total: u64 = state.objects.iter().map(|object| object.size).sum();
        println!(
            "Objects loaded: {} ({:.2} MB), selected: {}",
            state.objects.len(),
            total as f64 / (1024.0 * 1024.0),
            state.selected.len()
        );
        if let Some(report) = &state.last_report {
            println!("{report}");
        }
    }

    fn print_status(&self) {
        match self.session.worker.running() {
            Some(kind) => {
                let percent = lock(&self.state)
                    .progress
                    .filter(|(running, _)| *running == kind)
                    .map(|(_, percent)| percent)
                    .unwrap_or(0);
                println!("Running {kind} ({percent}%)");
            }
            None => println!("Idle"),
        }
        let config = self.session.worker.client_config();
        match self.session.credentials() {
            Some((credentials, source)) => println!(
                "Credentials: {} from {source}",
                credentials.masked_access_key()
            ),
            None => println!("Credentials: not configured"),
        }
        println!("Region: {}", config.region);
        if let Some(endpoint) = &config.endpoint {
            println!("Endpoint: {endpoint}");
        }
    }

    fn export_logs(&self, path: Option<String>) -> Result<()> {
        let path = match path {
            Some(path) => expand_user_path(&path),
            None => downloads_dir()?.join(format!(
                "s3manager-log-{}.txt",
                Local::now().format("%Y%m%d-%H%M%S")
            )),
        };
        let written = lock(&self.state).logs.export(&path)?;
        println!("Exported {written} log entries to {}", path.display());
        Ok(())
    }

    fn destination(path: Option<String>) -> Result<PathBuf> {
        Ok(match path {
            Some(path) => expand_user_path(&path),
            None => downloads_dir()?,
        })
    }

    fn handle(&mut self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Buckets => {
                lock(&self.state).view = View::Buckets;
                self.submit(Operation::ListBuckets);
            }
            ShellCommand::Use(name) => {
                let resolved = lock(&self.state).resolve_bucket(&name);
                match resolved {
                    Some(bucket) => {
                        lock(&self.state).open_bucket(bucket.clone());
                        self.submit(Operation::ListObjects { bucket });
                    }
                    None => println!("No bucket named or numbered '{name}'"),
                }
            }
            ShellCommand::Info => self.print_info(),
            ShellCommand::Files => {
                if let Some(bucket) = self.open_bucket() {
                    lock(&self.state).view = View::Files;
                    self.submit(Operation::ListObjects { bucket });
                }
            }
            ShellCommand::Select(selection) => {
                if self.open_bucket().is_some() {
                    let mut state = lock(&self.state);
                    state.select(selection);
                    state.view = View::Files;
                    println!("{}", object_table(&state.objects, &state.selected));
                }
            }
            ShellCommand::Download(path) => {
                if let Some(bucket) = self.open_bucket() {
                    let keys = lock(&self.state).selected_keys();
                    if keys.is_empty() {
                        println!("No files selected. Use 'select' first.");
                        return Ok(());
                    }
                    let destination = Self::destination(path)?;
                    self.submit(Operation::DownloadObjects {
                        bucket,
                        keys,
                        destination,
                    });
                }
            }
            ShellCommand::Delete => {
                if let Some(bucket) = self.open_bucket() {
                    let keys = lock(&self.state).selected_keys();
                    if keys.is_empty() {
                        println!("No files selected. Use 'select' first.");
                        return Ok(());
                    }
                    let question = format!(
                        "Delete {} file(s) from '{bucket}'? This cannot be undone.",
                        keys.len()
                    );
                    if self.prompter.confirm_yes(&question)? {
                        self.submit(Operation::DeleteObjects { bucket, keys });
                    } else {
                        println!("Deletion cancelled");
                    }
                }
            }
            ShellCommand::Permissions => {
                if let Some(bucket) = self.open_bucket() {
                    self.submit(Operation::CheckPermissions { bucket });
                }
            }
            ShellCommand::CreateBucket => {
                let default_region = self.session.settings.default_region.clone();
                match self.prompter.create_bucket(&default_region)? {
                    Some((bucket, region)) => {
                        self.submit(Operation::CreateBucket { bucket, region })
                    }
                    None => println!("Bucket creation cancelled"),
                }
            }
            ShellCommand::DeleteBucket => {
                if let Some(bucket) = self.open_bucket() {
                    let question = format!(
                        "This permanently deletes '{bucket}' with all of its objects and versions."
                    );
                    if self.prompter.confirm_typed(&question, &bucket)? {
                        self.submit(Operation::DeleteBucket { bucket });
                    } else {
                        println!("Bucket deletion cancelled");
                    }
                }
            }
            ShellCommand::Logs => {
                let mut state = lock(&self.state);
                state.view = View::Logs;
                if state.logs.is_empty() {
                    println!("Log is empty");
                } else {
                    println!("{}", state.logs.render());
                }
            }
            ShellCommand::ClearLogs => {
                lock(&self.state).logs.clear();
                println!("Log cleared");
            }
            ShellCommand::ExportLogs(path) => self.export_logs(path)?,
            ShellCommand::Credentials => self.configure_credentials()?,
            ShellCommand::Forget => {
                if self
                    .prompter
                    .confirm_yes("Remove the stored AWS credentials?")?
                {
                    self.session.forget_credentials()?;
                    println!("Stored credentials removed");
                }
            }
            ShellCommand::Status => self.print_status(),
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    fn repl(&mut self) -> Result<()> {
        loop {
            let Some(line) = self.prompter.ask("s3manager> ")? else {
                println!();
                return Ok(());
            };
            let file_count = lock(&self.state).objects.len();
            let command = match parse_command(&line, file_count) {
                Ok(ShellCommand::Quit) => return Ok(()),
                Ok(command) => command,
                Err(message) => {
                    if !message.is_empty() {
                        println!("{message}");
                    }
                    continue;
                }
            };
            if let Err(err) = self.handle(command) {
                println!("Error: {err:#}");
                lock(&self.state).logs.push(LogLevel::Error, format!("{err:#}"));
            }
        }
    }
}

pub fn run(session: Session, events: Receiver<WorkerEvent>) -> Result<()> {
    let state: SharedState = Arc::new(Mutex::new(ShellState::default()));
    let pump = spawn_pump(Arc::downgrade(&session.worker), Arc::clone(&state), events)
        .context("starting the event pump")?;

    let mut shell = Shell {
        session,
        state,
        prompter: Prompter::terminal(),
    };
    shell.onboarding()?;
    shell.submit(Operation::ListBuckets);
    let result = shell.repl();

    if let Some(kind) = shell.session.worker.running() {
        println!("Waiting for {kind} to finish...");
    }
    drop(shell);
    if pump.join().is_err() {
        anyhow::bail!("the event pump panicked");
    }
    result
}
