//! Command handlers, one module per subcommand

pub mod objects;
pub mod restore;
pub mod run;

pub use objects::execute_objects;
pub use restore::execute_restore;
pub use run::execute_run;

use crate::commands::{ConnectionArgs, SelectionArgs};
use crate::config::{CliConfig, ConnectionFile, ConnectionProfile};
use crate::error::CliResult;
use crate::output::ProgressReporter;
use plspec::RunFilter;
use std::path::PathBuf;

/// Load the selected profile from the connection file
pub fn load_profile(args: &ConnectionArgs) -> CliResult<ConnectionProfile> {
    let file = ConnectionFile::load(&args.config)?;
    let profile = file.profile(&args.connection)?.clone();
    tracing::debug!(
        config = %args.config.display(),
        profile = %args.connection,
        database = %profile.database.display(),
        "connection profile loaded"
    );
    Ok(profile)
}

/// Build the run filter from selection flags
pub fn build_filter(selection: &SelectionArgs, output_dir: Option<PathBuf>) -> CliResult<RunFilter> {
    let mut builder = RunFilter::builder()
        .ignore_schemas(selection.ignore_schemas.iter().map(String::as_str))
        .like_any(selection.like.iter().map(String::as_str));
    if let Some(dir) = output_dir {
        builder = builder.output_dir(dir);
    }
    Ok(builder.build()?)
}

/// Reporter matching the CLI configuration
#[must_use]
pub fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
        .with_verbose(config.verbosity.is_verbose())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use plspec::{ObjectId, ObjectType};

    #[test]
    fn test_build_filter_trims_and_drops_empty_entries() {
        let selection = SelectionArgs {
            ignore_schemas: vec![" sys ".to_string(), String::new()],
            like: vec!["HR.%".to_string(), " ".to_string()],
        };
        let filter = build_filter(&selection, Some(PathBuf::from("out"))).unwrap();
        assert!(filter.is_ignored_schema("SYS"));
        assert_eq!(filter.patterns().len(), 1);
        assert_eq!(filter.output_dir(), std::path::Path::new("out"));
        assert!(filter.admits(&ObjectId::new("HR", "PAY", ObjectType::Package)));
        assert!(!filter.admits(&ObjectId::new("APP", "PAY", ObjectType::Package)));
    }

    #[test]
    fn test_build_filter_rejects_nothing_by_default() {
        let filter = build_filter(&SelectionArgs::default(), None).unwrap();
        assert_eq!(filter.output_dir(), std::path::Path::new(plspec::DEFAULT_OUTPUT_DIR));
        assert!(filter.admits(&ObjectId::new("HR", "P", ObjectType::Procedure)));
    }

    #[test]
    fn test_load_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.yml");
        std::fs::write(&path, "default:\n  database: app.db\n  username: HR\n").unwrap();
        let args = ConnectionArgs {
            config: path,
            connection: "default".to_string(),
        };
        assert_eq!(load_profile(&args).unwrap().username, "HR");
    }
}
