//! CLI module for pirstream
//!
//! Provides command-line interface for:
//! - check: Validate configuration and build the query context
//! - run: Stream stdin records through the pipeline

mod args;
mod commands;
mod echo;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, run, run_command, run_stream};
pub use echo::{run_echo, EchoSummary};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{forward_records, write_error, write_response, write_value};
