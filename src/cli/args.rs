//! CLI argument definitions using clap
//!
//! Commands:
//! - pirstream check --config <path>
//! - pirstream run --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pirstream - streaming accumulation tier of a PIR responder
#[derive(Parser, Debug)]
#[command(name = "pirstream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file and build the query context
    Check {
        /// Path to configuration file
        #[arg(long, default_value = "./pirstream.json")]
        config: PathBuf,
    },

    /// Stream JSON records from stdin through the pipeline
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./pirstream.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::try_parse_from(["pirstream", "run", "--config", "/tmp/pir.json"]).unwrap();
        match cli.command {
            Command::Run { config } => assert_eq!(config, PathBuf::from("/tmp/pir.json")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["pirstream", "check"]).unwrap();
        assert!(matches!(cli.command, Command::Check { config } if config == PathBuf::from("./pirstream.json")));
    }
}
