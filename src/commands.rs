use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::Receiver;

use anyhow::{bail, Context, Result};

use crate::app::Session;
use crate::cli::Command;
use crate::config_paths::{downloads_dir, expand_user_path};
use crate::credentials::Credentials;
use crate::shell::prompt::Prompter;
use crate::shell::render::{bucket_table, event_line, object_table};
use crate::worker::{EventPayload, Operation, WorkerEvent};

/// Runs one operation to completion, printing its events as they arrive.
pub fn run_operation(
    session: &Session,
    events: &Receiver<WorkerEvent>,
    operation: Operation,
    out: &mut impl Write,
) -> Result<()> {
    let id = session.worker.submit(operation)?;
    loop {
        let event = events
            .recv()
            .context("the background worker stopped unexpectedly")?;
        if event.operation_id != id {
            continue;
        }
        match &event.payload {
            EventPayload::BucketsListed { buckets } => {
                writeln!(out, "{}", bucket_table(buckets, None))?
            }
            EventPayload::ObjectsListed { objects, .. } => {
                writeln!(out, "{}", object_table(objects, &BTreeSet::new()))?
            }
            EventPayload::PermissionsChecked { .. } => {}
            EventPayload::Completed { success, message, .. } => {
                if *success {
                    writeln!(out, "{message}")?;
                    return Ok(());
                }
                bail!("{message}");
            }
            _ => writeln!(out, "{}", event_line(&event))?,
        }
    }
}

fn confirmed<R: BufRead, W: Write>(
    prompter: &mut Prompter<R, W>,
    skip: bool,
    ask: impl FnOnce(&mut Prompter<R, W>) -> io::Result<bool>,
) -> Result<()> {
    if skip || ask(prompter)? {
        Ok(())
    } else {
        bail!("Cancelled")
    }
}

pub fn run_command(
    command: Command,
    mut session: Session,
    events: Receiver<WorkerEvent>,
) -> Result<()> {
    let mut out = io::stdout();

    let operation = match command {
        Command::Buckets => Operation::ListBuckets,
        Command::Files { bucket } => Operation::ListObjects { bucket },
        Command::Download { bucket, keys, to } => {
            let destination = match to {
                Some(path) => expand_user_path(&path.to_string_lossy()),
                None => downloads_dir()?,
            };
            Operation::DownloadObjects {
                bucket,
                keys,
                destination,
            }
        }
        Command::Delete { bucket, keys, yes } => {
            let question = format!("Delete {} file(s) from '{bucket}'?", keys.len());
            confirmed(&mut Prompter::terminal(), yes, |p| p.confirm_yes(&question))?;
            Operation::DeleteObjects { bucket, keys }
        }
        Command::Permissions { bucket } => Operation::CheckPermissions { bucket },
        Command::CreateBucket {
            bucket,
            bucket_region,
        } => Operation::CreateBucket {
            bucket,
            region: bucket_region.unwrap_or_else(|| session.settings.default_region.clone()),
        },
        Command::DeleteBucket { bucket, yes } => {
            let question = format!(
                "This permanently deletes '{bucket}' and every object and version in it."
            );
            confirmed(&mut Prompter::terminal(), yes, |p| p.confirm_typed(&question, &bucket))?;
            Operation::DeleteBucket { bucket }
        }
        Command::Configure {
            access_key,
            secret_key,
            default_region,
        } => {
            let credentials = match (access_key, secret_key) {
                (Some(access_key), Some(secret_key)) => {
                    let credentials = Credentials::new(access_key, secret_key);
                    match default_region {
                        Some(region) => credentials.with_region(region),
                        None => credentials,
                    }
                }
                _ => {
                    let current = session.credentials().map(|(credentials, _)| credentials);
                    match Prompter::terminal().credentials(current.as_ref())? {
                        Some(credentials) => credentials,
                        None => bail!("Cancelled"),
                    }
                }
            };
            for note in session.save_credentials(&credentials)? {
                writeln!(out, "{note}")?;
            }
            return Ok(());
        }
        Command::Forget => {
            session.forget_credentials()?;
            writeln!(out, "Stored credentials removed")?;
            return Ok(());
        }
        Command::Shell => return crate::shell::run(session, events),
    };

    run_operation(&session, &events, operation, &mut out)
}
