//! plspec CLI library
//!
//! Command-line surface of the plspec coverage engine: connection profiles,
//! test command supervision, progress output and exit statuses.

#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod handlers;
pub mod logging;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConnectionArgs, ObjectsArgs, RestoreArgs, RunArgs, SelectionArgs,
};
pub use config::{
    CliConfig, ColorChoice, ConnectionFile, ConnectionProfile, Verbosity, DEFAULT_CONNECTION_FILE,
    DEFAULT_PROFILE,
};
pub use error::{CliError, CliResult, ExitStatus};
pub use output::ProgressReporter;
pub use runner::{TestCommand, TestStatus};
