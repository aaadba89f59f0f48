//! Restore command handler

use super::{load_profile, reporter};
use crate::commands::RestoreArgs;
use crate::config::CliConfig;
use crate::error::{CliResult, ExitStatus};
use crate::output::ProgressReporter;
use plspec::{Catalog, ObjectId, ReplayOutcome, RestoreManifest, Restorer};
use std::path::Path;

/// Execute the restore command
pub fn execute_restore(config: &CliConfig, args: &RestoreArgs) -> CliResult<ExitStatus> {
    let reporter = reporter(config);
    let path = args.manifest_path();
    if !path.exists() {
        reporter.info(&format!("Nothing to restore: {} not found", path.display()));
        return Ok(ExitStatus::Success);
    }

    let manifest = RestoreManifest::load(&path)?;
    let db = load_profile(&args.connection)?.connect()?;
    let status = replay_manifest(&db, manifest, &path, &reporter)?;
    Ok(status)
}

/// Replay a manifest and rewrite the file with whatever is left
///
/// The file is removed once every entry has been handled; entries that
/// failed stay in it for another attempt.
pub fn replay_manifest(
    catalog: &dyn Catalog,
    mut manifest: RestoreManifest,
    path: &Path,
    reporter: &ProgressReporter,
) -> CliResult<ExitStatus> {
    tracing::info!(
        path = %path.display(),
        objects = manifest.entries.len(),
        "replaying restore manifest"
    );
    let outcome = Restorer::new(catalog).replay(&manifest);
    print_outcome(reporter, &outcome);

    let failed: Vec<ObjectId> = outcome
        .failures
        .iter()
        .filter_map(|e| e.object().cloned())
        .collect();
    manifest.retain(&failed);

    if manifest.is_empty() {
        std::fs::remove_file(path)?;
        Ok(ExitStatus::Success)
    } else {
        std::fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
        Ok(ExitStatus::RestorationFailed)
    }
}

fn print_outcome(reporter: &ProgressReporter, outcome: &ReplayOutcome) {
    for id in &outcome.restored {
        reporter.success(&format!("restored {id}"));
    }
    for (id, reason) in &outcome.skipped {
        reporter.warning(&format!("skipped {id}: {reason}"));
    }
    for failure in &outcome.failures {
        reporter.failure(&failure.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use plspec::{CoverageConfig, CoverageEngine, ObjectType, RunFilter, Source, SqliteDatabase};

    const BODY: &str = "PROCEDURE p IS\nBEGIN\n  NULL;\nEND;\n";

    #[test]
    fn test_replay_restores_and_removes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let id = ObjectId::new("HR", "P", ObjectType::Procedure);
        db.create_or_replace(&id, &Source::new(BODY)).unwrap();

        let filter = RunFilter::builder().output_dir(dir.path()).build().unwrap();
        let engine = CoverageEngine::new(&db, &db, CoverageConfig::new(filter));
        let session = engine.begin().unwrap();
        let path = RestoreManifest::path_in(dir.path());
        // Simulate a crash: keep the manifest, leave the object instrumented
        let manifest = RestoreManifest::load(&path).unwrap();
        std::mem::forget(session);
        assert_ne!(db.fetch_source(&id).unwrap(), Source::new(BODY));

        let reporter = ProgressReporter::new(false, true);
        let status = replay_manifest(&db, manifest, &path, &reporter).unwrap();
        assert_eq!(status, ExitStatus::Success);
        assert_eq!(db.fetch_source(&id).unwrap(), Source::new(BODY));
        assert!(!path.exists());
    }
}
