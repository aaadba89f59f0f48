//! CLI command definitions using clap

use crate::config::{ColorChoice, DEFAULT_CONNECTION_FILE, DEFAULT_PROFILE};
use clap::{Args, Parser, Subcommand, ValueEnum};
use plspec::{ReportFormat, DEFAULT_OUTPUT_DIR};
use std::path::PathBuf;

/// plspec: run stored-procedure tests with line coverage
#[derive(Parser, Debug)]
#[command(name = "plspec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test command, optionally measuring line coverage
    Run(RunArgs),

    /// List the objects a coverage run would instrument
    Objects(ObjectsArgs),

    /// Redeploy originals left behind by an interrupted run
    Restore(RestoreArgs),
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Where to find the database
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Connection file
    #[arg(long, env = "PLSPEC_CONFIG", default_value = DEFAULT_CONNECTION_FILE)]
    pub config: PathBuf,

    /// Profile in the connection file
    #[arg(long, default_value = DEFAULT_PROFILE)]
    pub connection: String,
}

/// Which objects take part in coverage
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Schemas excluded from coverage (comma separated)
    #[arg(
        long,
        alias = "ignore_schemas",
        env = "PLSQL_COVERAGE_IGNORE_SCHEMAS",
        value_delimiter = ',',
        value_name = "SCHEMA"
    )]
    pub ignore_schemas: Vec<String>,

    /// Only objects whose SCHEMA.NAME matches one of these globs (% * _ ?)
    #[arg(long, env = "PLSQL_COVERAGE_LIKE", value_delimiter = ',', value_name = "PATTERN")]
    pub like: Vec<String>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Measure coverage, writing reports to DIR
    #[arg(
        long,
        env = "PLSQL_COVERAGE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_OUTPUT_DIR,
        value_name = "DIR"
    )]
    pub coverage: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Report formats (html, lcov, cobertura)
    #[arg(long, value_delimiter = ',', default_value = "html")]
    pub format: Vec<ReportFormat>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Test command and its arguments
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Report directory, or `None` when coverage is off
    ///
    /// `PLSQL_COVERAGE=true` selects the default directory and `false`
    /// or an empty value turn coverage off.
    #[must_use]
    pub fn coverage_dir(&self) -> Option<PathBuf> {
        let value = self.coverage.as_deref()?.trim();
        match value.to_ascii_lowercase().as_str() {
            "" | "false" | "0" | "no" | "off" => None,
            "true" | "1" | "yes" | "on" => Some(PathBuf::from(DEFAULT_OUTPUT_DIR)),
            _ => Some(PathBuf::from(value)),
        }
    }
}

/// Arguments for the objects command
#[derive(Args, Debug)]
pub struct ObjectsArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Print a JSON array instead of one object per line
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Arguments for the restore command
#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Report directory holding the restore manifest
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, value_name = "DIR")]
    pub coverage: PathBuf,

    /// Manifest file, overriding --coverage
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

impl RestoreArgs {
    /// Manifest to replay
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| plspec::RestoreManifest::path_in(&self.coverage))
    }
}
