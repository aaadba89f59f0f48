//! Run command handler

use super::{build_filter, load_profile, reporter};
use crate::commands::RunArgs;
use crate::config::CliConfig;
use crate::error::{CliResult, ExitStatus};
use crate::output::ProgressReporter;
use crate::runner::{Supervisor, TestCommand, TestStatus};
use plspec::report::INDEX_FILE;
use plspec::{CoverageConfig, CoverageEngine, CoverageError, RunOutcome};

/// Environment variable naming the database file, set for the test command
pub const DATABASE_ENV: &str = "PLSPEC_DATABASE";

/// Environment variable naming the connected schema, set for the test command
pub const SCHEMA_ENV: &str = "PLSPEC_SCHEMA";

/// Execute the run command
pub fn execute_run(config: &CliConfig, args: &RunArgs) -> CliResult<ExitStatus> {
    let profile = load_profile(&args.connection)?;
    let command = TestCommand::from_argv(&args.command)?
        .with_env(DATABASE_ENV, profile.database.display().to_string())
        .with_env(SCHEMA_ENV, profile.username.trim().to_uppercase());
    let reporter = reporter(config);
    let supervisor = Supervisor::new()?;
    supervisor.watch_ctrl_c()?;

    let Some(output_dir) = args.coverage_dir() else {
        let status = supervisor.run(&command)?;
        report_test_status(&reporter, command.program(), status);
        return Ok(test_exit_status(status));
    };

    let db = profile.connect()?;
    let filter = build_filter(&args.selection, Some(output_dir))?;
    let coverage = CoverageConfig::new(filter).with_formats(args.format.iter().copied());
    let engine = CoverageEngine::new(&db, &db, coverage)
        .with_observer(&reporter)
        .with_interrupt(supervisor.interrupt_flag());

    let outcome = match engine.run(|| supervisor.run(&command)) {
        Ok(outcome) => outcome,
        Err(CoverageError::Interrupted { unrestored }) => {
            return Ok(interrupted_status(&reporter, unrestored));
        }
        Err(e) => return Err(e.into()),
    };
    let index = engine.config().filter.output_dir().join(INDEX_FILE);
    Ok(summarize(&reporter, command.program(), &outcome, &index))
}

/// Print the outcome of a coverage run and pick the exit status
fn summarize(
    reporter: &ProgressReporter,
    program: &str,
    outcome: &RunOutcome<CliResult<TestStatus>>,
    index: &std::path::Path,
) -> ExitStatus {
    for failure in &outcome.aggregation_failures {
        reporter.warning(&failure.to_string());
    }

    match &outcome.report_error {
        Some(e) => reporter.failure(&format!("reports not written: {e}")),
        None => {
            reporter.coverage_summary(&outcome.coverage.summary());
            if outcome.report_files.iter().any(|f| f == index) {
                reporter.info(&format!("Coverage report: {}", index.display()));
            }
        }
    }

    let test_status = match &outcome.test_result {
        Ok(status) => {
            report_test_status(reporter, program, *status);
            test_exit_status(*status)
        }
        Err(e) => {
            reporter.failure(&e.to_string());
            ExitStatus::Fatal
        }
    };

    if outcome.is_fully_restored() {
        test_status
    } else {
        reporter.failure(&format!(
            "{} objects are still instrumented; run `plspec restore`",
            outcome.restoration_failures.len()
        ));
        test_status.worst(ExitStatus::RestorationFailed)
    }
}

/// Exit status for a run interrupted before the test command started
fn interrupted_status(reporter: &ProgressReporter, unrestored: usize) -> ExitStatus {
    if unrestored == 0 {
        reporter.failure("interrupted; all objects restored");
        ExitStatus::TestsFailed
    } else {
        reporter.failure(&format!(
            "interrupted; {unrestored} objects are still instrumented; run `plspec restore`"
        ));
        ExitStatus::RestorationFailed
    }
}

fn report_test_status(reporter: &ProgressReporter, program: &str, status: TestStatus) {
    match status {
        TestStatus::Passed => reporter.success(&format!("{program} passed")),
        TestStatus::Failed(Some(code)) => {
            reporter.failure(&format!("{program} failed with exit code {code}"));
        }
        TestStatus::Failed(None) => reporter.failure(&format!("{program} was killed by a signal")),
        TestStatus::Interrupted => reporter.failure(&format!("{program} was interrupted")),
    }
}

/// Exit status for a finished test command
#[must_use]
pub const fn test_exit_status(status: TestStatus) -> ExitStatus {
    if status.passed() {
        ExitStatus::Success
    } else {
        ExitStatus::TestsFailed
    }
}
