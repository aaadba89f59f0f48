//! CLI configuration and connection profiles

use crate::error::{CliError, CliResult};
use plspec::{CatalogScope, SqliteDatabase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default connection file, relative to the working directory
pub const DEFAULT_CONNECTION_FILE: &str = "spec/database.yml";

/// Profile used when `--connection` is not given
pub const DEFAULT_PROFILE: &str = "default";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - failures only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - per-object progress
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Log filter used when `PLSPEC_LOG` is unset
    #[must_use]
    pub const fn default_log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }
}

/// One named entry of the connection file
///
/// ```yaml
/// default:
///   database: db/app.sqlite
///   username: HR
///   all_schemas: false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Database file
    pub database: PathBuf,
    /// Schema to connect as
    pub username: String,
    /// List objects of every schema instead of the connected one
    #[serde(default)]
    pub all_schemas: bool,
}

impl ConnectionProfile {
    /// Catalog scope for this profile
    #[must_use]
    pub const fn scope(&self) -> CatalogScope {
        if self.all_schemas {
            CatalogScope::AllSchemas
        } else {
            CatalogScope::CurrentSchema
        }
    }

    /// Open a connection
    pub fn connect(&self) -> CliResult<SqliteDatabase> {
        let db = SqliteDatabase::open(&self.database, &self.username)?;
        Ok(db.with_scope(self.scope()))
    }
}

/// Parsed connection file: profile name to profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionFile {
    profiles: BTreeMap<String, ConnectionProfile>,
}

impl ConnectionFile {
    /// Parse YAML text
    pub fn parse(yaml: &str) -> CliResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Read and parse a connection file
    pub fn load(path: &Path) -> CliResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&yaml)
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> CliResult<&ConnectionProfile> {
        self.profiles.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.names().collect();
            CliError::config(format!(
                "no connection profile '{name}' (available: {})",
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ))
        })
    }

    /// Profile names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_default_verbosity() {
            assert_eq!(Verbosity::default(), Verbosity::Normal);
        }

        #[test]
        fn test_is_quiet() {
            assert!(Verbosity::Quiet.is_quiet());
            assert!(!Verbosity::Normal.is_quiet());
            assert!(!Verbosity::Debug.is_quiet());
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Quiet.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Debug.is_verbose());
        }

        #[test]
        fn test_default_log_filter() {
            assert_eq!(Verbosity::Quiet.default_log_filter(), "error");
            assert_eq!(Verbosity::Normal.default_log_filter(), "warn");
            assert_eq!(Verbosity::Verbose.default_log_filter(), "info");
            assert_eq!(Verbosity::Debug.default_log_filter(), "debug");
        }
    }

    mod color_choice_tests {
        use super::*;

        #[test]
        fn test_default_color() {
            assert_eq!(ColorChoice::default(), ColorChoice::Auto);
        }

        #[test]
        fn test_should_color_fixed_choices() {
            assert!(ColorChoice::Always.should_color());
            assert!(!ColorChoice::Never.should_color());
        }

        #[test]
        fn test_deserialize() {
            let c: ColorChoice = serde_json::from_str("\"Never\"").unwrap();
            assert_eq!(c, ColorChoice::Never);
        }
    }

    mod cli_config_tests {
        use super::*;

        #[test]
        fn test_chained_builders() {
            let config = CliConfig::new()
                .with_verbosity(Verbosity::Verbose)
                .with_color(ColorChoice::Always);
            assert_eq!(config.verbosity, Verbosity::Verbose);
            assert_eq!(config.color, ColorChoice::Always);
        }
    }

    mod connection_file_tests {
        use super::*;

        const YAML: &str = "
default:
  database: db/app.sqlite
  username: hr
ci:
  database: /tmp/ci.sqlite
  username: APP
  all_schemas: true
";

        #[test]
        fn test_parse_profiles() {
            let file = ConnectionFile::parse(YAML).unwrap();
            assert_eq!(file.names().collect::<Vec<_>>(), ["ci", "default"]);

            let default = file.profile(DEFAULT_PROFILE).unwrap();
            assert_eq!(default.database, PathBuf::from("db/app.sqlite"));
            assert_eq!(default.username, "hr");
            assert_eq!(default.scope(), CatalogScope::CurrentSchema);

            assert_eq!(file.profile("ci").unwrap().scope(), CatalogScope::AllSchemas);
        }

        #[test]
        fn test_unknown_profile_lists_available() {
            let file = ConnectionFile::parse(YAML).unwrap();
            let err = file.profile("prod").unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("'prod'"));
            assert!(msg.contains("ci, default"));
        }

        #[test]
        fn test_missing_username_is_rejected() {
            let err = ConnectionFile::parse("default:\n  database: x.db\n").unwrap_err();
            assert!(matches!(err, CliError::Yaml(_)));
        }

        #[test]
        fn test_load_missing_file() {
            let dir = tempfile::tempdir().unwrap();
            let err = ConnectionFile::load(&dir.path().join("database.yml")).unwrap_err();
            assert!(matches!(err, CliError::Config { .. }));
        }

        #[test]
        fn test_connect_uppercases_schema() {
            let dir = tempfile::tempdir().unwrap();
            let profile = ConnectionProfile {
                database: dir.path().join("app.db"),
                username: "hr".to_string(),
                all_schemas: true,
            };
            let db = profile.connect().unwrap();
            assert_eq!(db.schema(), "HR");
            assert_eq!(db.scope(), CatalogScope::AllSchemas);
        }
    }
}
