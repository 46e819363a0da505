//! `ktsm` binary entry point.
//!
//! Parses arguments, installs the log subscriber and runs one command.
//! Failures print `Error: <message>` on stdout and exit with status 1.

use std::io::{BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ktsm_tools::transfer::{load, save};
use ktsm_tools::{Cli, Command};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout with status 0, usage errors to
            // stderr with status 1.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(cli.log_filter()))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Load { key, path } => {
            let (memory, size) = load(key, path, cli.ipc_config())?;
            println!("Loaded {size} bytes from {}", path.display());
            println!("Press Enter to exit...");
            std::io::stdout().flush().context("unable to write to stdout")?;

            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("unable to read from stdin")?;

            tracing::debug!(key = %memory.key(), "releasing segment");
            drop(memory);
        }
        Command::Save { key, path } => {
            let size = save(key, path, cli.ipc_config())?;
            println!("Saved {size} bytes to {}", path.display());
        }
    }
    Ok(())
}
