//! Coverage engine: resolve, instrument, run tests, aggregate, report, restore.
//!
//! [`CoverageEngine::begin`] acquires instrumentation and returns a
//! [`CoverageSession`]. The session is a guard: [`CoverageSession::finish`]
//! aggregates, writes reports and restores, and dropping an unfinished
//! session still restores every instrumented object.
//!
//! An [`InterruptFlag`] raised while objects are being deployed stops the
//! deployment, rolls back what was deployed and fails `begin` with
//! [`CoverageError::Interrupted`].

use crate::aggregate::{Aggregator, CoverageSet};
use crate::db::{Catalog, CounterStore};
use crate::filter::RunFilter;
use crate::instrument::{InstrumentationArena, Instrumenter, PreparedObject};
use crate::object::ObjectId;
use crate::report::{ReportFormat, ReportWriter};
use crate::restore::{RestoreManifest, Restorer};
use crate::result::{CoverageError, PlspecResult};
use crate::tracker::ExecutionTracker;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative interrupt request shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create a flag that is not raised
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an interrupt
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether an interrupt was requested
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Options of one coverage run
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageConfig {
    /// Which objects to instrument, and the report directory
    pub filter: RunFilter,
    /// Report formats to write
    pub formats: BTreeSet<ReportFormat>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            filter: RunFilter::default(),
            formats: BTreeSet::from([ReportFormat::Html]),
        }
    }
}

impl CoverageConfig {
    /// HTML reports for the objects a filter admits
    #[must_use]
    pub fn new(filter: RunFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Replace the report formats
    #[must_use]
    pub fn with_formats<I: IntoIterator<Item = ReportFormat>>(mut self, formats: I) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }
}

/// Progress callbacks; every method defaults to doing nothing
pub trait EngineObserver {
    /// Objects selected for instrumentation
    fn on_resolved(&self, _objects: &[ObjectId]) {}
    /// One object deployed in instrumented form
    fn on_instrumented(&self, _id: &ObjectId) {}
    /// One object dropped out of the run
    fn on_instrumentation_failed(&self, _error: &CoverageError) {}
    /// Reports written
    fn on_reports_written(&self, _files: &[PathBuf]) {}
    /// Restoration finished
    fn on_restored(&self, _restored: usize, _failures: &[CoverageError]) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Everything a coverage run produced
#[derive(Debug)]
pub struct RunOutcome<T> {
    /// Whatever the test suite returned
    pub test_result: T,
    /// Aggregated coverage
    pub coverage: CoverageSet,
    /// Report files written, in a stable order
    pub report_files: Vec<PathBuf>,
    /// Objects excluded because they could not be instrumented
    pub instrumentation_failures: Vec<CoverageError>,
    /// Objects whose counters could not be read
    pub aggregation_failures: Vec<CoverageError>,
    /// Objects left instrumented in the database
    pub restoration_failures: Vec<CoverageError>,
    /// Set when the report directory could not be written
    pub report_error: Option<CoverageError>,
}

impl<T> RunOutcome<T> {
    /// Whether every instrumented object got its original back
    #[must_use]
    pub fn is_fully_restored(&self) -> bool {
        self.restoration_failures.is_empty()
    }
}

/// Drives one coverage run over a catalog and a counter store
pub struct CoverageEngine<'a> {
    catalog: &'a dyn Catalog,
    counters: &'a dyn CounterStore,
    config: CoverageConfig,
    observer: &'a dyn EngineObserver,
    interrupt: InterruptFlag,
}

impl std::fmt::Debug for CoverageEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> CoverageEngine<'a> {
    /// Create an engine; the caller owns the connections
    #[must_use]
    pub fn new(
        catalog: &'a dyn Catalog,
        counters: &'a dyn CounterStore,
        config: CoverageConfig,
    ) -> Self {
        Self {
            catalog,
            counters,
            config,
            observer: &NoopObserver,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Watch a flag while deploying
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Report progress to an observer
    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn EngineObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Objects the run would instrument, in identity order
    ///
    /// Fails with [`CoverageError::CatalogAccess`] when metadata cannot be
    /// read; nothing has been mutated at that point.
    pub fn resolve(&self) -> PlspecResult<Vec<ObjectId>> {
        let tracker = ExecutionTracker::new(self.counters);
        let mut ids: Vec<ObjectId> = self
            .catalog
            .list_objects()?
            .into_iter()
            .filter(|id| !tracker.owns(id))
            .filter(|id| self.config.filter.admits(id))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Resolve, install the tracker and deploy instrumented objects
    pub fn begin(&self) -> PlspecResult<CoverageSession<'a>> {
        let ids = self.resolve()?;
        tracing::info!(objects = ids.len(), "resolved coverage candidates");
        self.observer.on_resolved(&ids);

        ExecutionTracker::new(self.counters).install()?;

        let instrumenter = Instrumenter::new(self.catalog);
        let mut instrumentation_failures = Vec::new();
        let mut prepared: Vec<PreparedObject> = Vec::with_capacity(ids.len());
        for id in &ids {
            match instrumenter.prepare(id) {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    tracing::warn!(object = %id, error = %e, "excluded from coverage");
                    self.observer.on_instrumentation_failed(&e);
                    instrumentation_failures.push(e);
                }
            }
        }

        let output_dir = self.config.filter.output_dir().to_path_buf();
        let manifest = RestoreManifest::from_prepared(&prepared);
        manifest.save(&output_dir)?;

        let mut session = CoverageSession {
            catalog: self.catalog,
            counters: self.counters,
            observer: self.observer,
            output_dir,
            formats: self.config.formats.clone(),
            arena: InstrumentationArena::new(),
            manifest,
            instrumentation_failures,
            restoration_failures: Vec::new(),
            unrestored: Vec::new(),
            restored: false,
        };

        let total = prepared.len();
        for (done, p) in prepared.into_iter().enumerate() {
            self.check_interrupt(&mut session, total - done)?;
            let id = p.id.clone();
            match instrumenter.deploy(p) {
                Ok(object) => {
                    self.observer.on_instrumented(&object.id);
                    session.arena.insert(object);
                }
                Err(failure) => {
                    tracing::warn!(object = %id, error = %failure.error, "excluded from coverage");
                    self.observer.on_instrumentation_failed(&failure.error);
                    session.instrumentation_failures.push(failure.error);
                    if let Some(restore_error) = failure.restore_error {
                        session.unrestored.push(id);
                        session.restoration_failures.push(restore_error);
                    }
                }
            }
        }

        self.check_interrupt(&mut session, 0)?;

        tracing::info!(
            instrumented = session.arena.len(),
            failed = session.instrumentation_failures.len(),
            "instrumentation deployed"
        );
        Ok(session)
    }

    /// Roll the session back when an interrupt was requested
    fn check_interrupt(&self, session: &mut CoverageSession<'_>, remaining: usize) -> PlspecResult<()> {
        if !self.interrupt.is_raised() {
            return Ok(());
        }
        tracing::warn!(
            deployed = session.arena.len(),
            remaining,
            "interrupted during instrumentation, restoring"
        );
        session.restore();
        Err(CoverageError::Interrupted {
            unrestored: session.unrestored.len(),
        })
    }

    /// Bracket a test closure with instrumentation and restoration
    ///
    /// A panic in `tests` still restores every object before unwinding
    /// further.
    pub fn run<T, F>(&self, tests: F) -> PlspecResult<RunOutcome<T>>
    where
        F: FnOnce() -> T,
    {
        let session = self.begin()?;
        match std::panic::catch_unwind(AssertUnwindSafe(tests)) {
            Ok(test_result) => Ok(session.finish(test_result)),
            Err(payload) => {
                drop(session);
                std::panic::resume_unwind(payload)
            }
        }
    }
}

/// Live instrumentation of one run
///
/// Dropping the session without calling [`finish`](Self::finish) restores
/// every object on a best-effort basis.
pub struct CoverageSession<'a> {
    catalog: &'a dyn Catalog,
    counters: &'a dyn CounterStore,
    observer: &'a dyn EngineObserver,
    output_dir: PathBuf,
    formats: BTreeSet<ReportFormat>,
    arena: InstrumentationArena,
    manifest: RestoreManifest,
    instrumentation_failures: Vec<CoverageError>,
    restoration_failures: Vec<CoverageError>,
    unrestored: Vec<ObjectId>,
    restored: bool,
}

impl std::fmt::Debug for CoverageSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageSession")
            .field("output_dir", &self.output_dir)
            .field("objects", &self.arena.len())
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

impl CoverageSession<'_> {
    /// Objects currently instrumented
    #[must_use]
    pub fn instrumented(&self) -> &InstrumentationArena {
        &self.arena
    }

    /// Objects excluded so far
    #[must_use]
    pub fn instrumentation_failures(&self) -> &[CoverageError] {
        &self.instrumentation_failures
    }

    /// Aggregate counters, write reports and restore every object
    pub fn finish<T>(mut self, test_result: T) -> RunOutcome<T> {
        let tracker = ExecutionTracker::new(self.counters);
        let snapshot = tracker.snapshot(self.arena.iter().map(|o| &o.id));
        let coverage = Aggregator::aggregate(&self.arena, &snapshot);
        let aggregation_failures = coverage.failures();
        let summary = coverage.summary();
        tracing::info!(
            objects = summary.objects,
            covered = summary.covered_lines,
            executable = summary.executable_lines,
            "coverage aggregated"
        );

        let (report_files, report_error) = match ReportWriter::new(&self.output_dir)
            .with_formats(self.formats.iter().copied())
            .write(&coverage)
        {
            Ok(files) => {
                self.observer.on_reports_written(&files);
                (files, None)
            }
            Err(e) => {
                tracing::warn!(dir = %self.output_dir.display(), error = %e, "reports not written");
                (Vec::new(), Some(e))
            }
        };

        self.restore();

        RunOutcome {
            test_result,
            coverage,
            report_files,
            instrumentation_failures: std::mem::take(&mut self.instrumentation_failures),
            aggregation_failures,
            restoration_failures: std::mem::take(&mut self.restoration_failures),
            report_error,
        }
    }

    /// Restore every instrumented object; later calls do nothing
    pub fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        let attempted = self.arena.len();
        let failures = Restorer::new(self.catalog).restore_all(&mut self.arena);
        self.unrestored.extend(self.arena.ids());
        self.observer.on_restored(attempted - failures.len(), &failures);
        self.restoration_failures.extend(failures);

        let manifest_path = RestoreManifest::path_in(&self.output_dir);
        if self.unrestored.is_empty() {
            if let Err(e) = std::fs::remove_file(&manifest_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %manifest_path.display(), error = %e, "manifest not removed");
                }
            }
            tracing::info!(restored = attempted, "original sources restored");
        } else {
            self.manifest.retain(&self.unrestored);
            if let Err(e) = self.manifest.save(&self.output_dir) {
                tracing::warn!(path = %manifest_path.display(), error = %e, "manifest not updated");
            }
            tracing::warn!(
                unrestored = self.unrestored.len(),
                manifest = %manifest_path.display(),
                "objects left instrumented; run `plspec restore`"
            );
        }
    }
}

impl Drop for CoverageSession<'_> {
    fn drop(&mut self) {
        // Best effort restore if finish was never reached
        self.restore();
    }
}
