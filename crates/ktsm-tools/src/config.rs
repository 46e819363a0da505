//! Command line configuration.
//!
//! Arguments can be given on the command line or, where noted, through
//! environment variables:
//!
//! - `KTSM_LOG`: log filter directives (default `warn`)
//! - `KTSM_KEY_DIR`: directory for System V marker files

use clap::{Parser, Subcommand};
use ktsm::IpcConfig;
use std::path::PathBuf;

/// Copy files into and out of named shared memory segments.
#[derive(Debug, Clone, Parser)]
#[command(name = "ktsm", about = "Shared memory load/save tools", version)]
pub struct Cli {
    /// Log at `info` level unless `KTSM_LOG` says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log filter directives
    #[arg(long, env = "KTSM_LOG", global = true)]
    pub log: Option<String>,

    /// Directory holding System V key files
    #[arg(long, env = "KTSM_KEY_DIR", global = true)]
    pub key_dir: Option<PathBuf>,

    /// Command to run
    #[command(subcommand)]
    pub command: Command,
}

/// What to do with the segment.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a segment holding the file and keep it alive until Enter
    Load {
        /// Segment key
        key: String,
        /// File to read
        path: PathBuf,
    },
    /// Attach to a segment and write its payload to a file
    Save {
        /// Segment key
        key: String,
        /// File to write
        path: PathBuf,
    },
}

impl Cli {
    /// Library configuration for the parsed arguments.
    pub fn ipc_config(&self) -> IpcConfig {
        self.key_dir
            .as_ref()
            .map_or_else(IpcConfig::default, IpcConfig::new)
    }

    /// Filter directives for the log subscriber.
    pub fn log_filter(&self) -> String {
        match (&self.log, self.verbose) {
            (Some(filter), _) => filter.clone(),
            (None, true) => "info".to_string(),
            (None, false) => "warn".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_load() {
        let cli = Cli::try_parse_from(["ktsm", "load", "demo", "in.bin"]).expect("parse");
        match cli.command {
            Command::Load { key, path } => {
                assert_eq!(key, "demo");
                assert_eq!(path, PathBuf::from("in.bin"));
            }
            Command::Save { .. } => panic!("expected load"),
        }
    }

    fn save_command() -> Command {
        Command::Save {
            key: "demo".to_string(),
            path: PathBuf::from("out.bin"),
        }
    }

    #[test]
    fn test_verbose_flag_is_parsed() {
        let cli =
            Cli::try_parse_from(["ktsm", "--verbose", "save", "demo", "out.bin"]).expect("parse");
        assert!(cli.verbose);
    }

    #[test]
    fn test_verbose_raises_log_level() {
        let quiet = Cli {
            verbose: false,
            log: None,
            key_dir: None,
            command: save_command(),
        };
        assert_eq!(quiet.log_filter(), "warn");

        let verbose = Cli {
            verbose: true,
            ..quiet
        };
        assert_eq!(verbose.log_filter(), "info");
    }

    #[test]
    fn test_explicit_filter_wins() {
        let cli = Cli::try_parse_from(["ktsm", "--log", "ktsm=debug", "-v", "save", "k", "p"])
            .expect("parse");
        assert_eq!(cli.log_filter(), "ktsm=debug");
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["ktsm", "load", "demo"]).is_err());
        assert!(Cli::try_parse_from(["ktsm", "copy", "a", "b"]).is_err());
    }

    #[test]
    fn test_key_dir_flows_into_config() {
        let cli = Cli::try_parse_from(["ktsm", "--key-dir", "/var/tmp/ktsm", "save", "k", "p"])
            .expect("parse");
        assert_eq!(cli.ipc_config().key_dir(), PathBuf::from("/var/tmp/ktsm"));
    }
}
