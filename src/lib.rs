pub mod app;
pub mod cli;
pub mod commands;
pub mod config_paths;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod s3;
pub mod settings;
pub mod shell;
pub mod worker;

use clap::Parser;

pub fn run() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logging::init();

    let (session, events) = app::Session::start(&args)?;
    let command = args.command.clone().unwrap_or(cli::Command::Shell);
    commands::run_command(command, session, events)
}
