//! plspec: Line Coverage for Database Stored Procedures
//!
//! Measures which lines of database-resident procedural code (procedures,
//! functions, packages, triggers, type bodies) an external test suite
//! executes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────┐
//! │ Resolver │──►│ Instrumenter │──►│ test suite │──►│ Aggregator │──►│ Reports  │
//! │ (filter) │   │  (deploy)    │   │ (external) │   │ (counters) │   │ html/... │
//! └──────────┘   └──────────────┘   └────────────┘   └────────────┘   └──────────┘
//!                       │                                                  │
//!                       └────────────── Restorer (always runs) ◄───────────┘
//! ```
//!
//! The engine talks to the database only through [`Catalog`] and
//! [`CounterStore`]. [`SqliteDatabase`] implements both over a SQLite file.
//!
//! ```no_run
//! use plspec::{CoverageConfig, CoverageEngine, RunFilter, SqliteDatabase};
//!
//! # fn main() -> plspec::PlspecResult<()> {
//! let db = SqliteDatabase::open("app.db".as_ref(), "HR")?;
//! let filter = RunFilter::builder().like("HR.PAY%").build()?;
//! let engine = CoverageEngine::new(&db, &db, CoverageConfig::new(filter));
//! let outcome = engine.run(|| {
//!     // drive the test suite here
//!     true
//! })?;
//! println!("{:.2}%", outcome.coverage.summary().coverage_percent);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod aggregate;
pub mod db;
mod engine;
mod filter;
pub mod instrument;
mod object;
pub mod report;
pub mod restore;
mod result;
pub mod tracker;

pub use aggregate::{
    coverage_percent, Aggregator, CoverageSet, CoverageSummary, LineClass, LineCoverage,
    ObjectCoverage, UnavailableObject,
};
pub use db::{Catalog, CatalogScope, CounterStore, DeployStatus, SqliteDatabase};
pub use engine::{
    CoverageConfig, CoverageEngine, CoverageSession, EngineObserver, InterruptFlag, NoopObserver,
    RunOutcome,
};
pub use filter::{NamePattern, RunFilter, RunFilterBuilder, DEFAULT_OUTPUT_DIR};
pub use instrument::{InstrumentationArena, Instrumenter, LineMap, SlotId};
pub use object::{line_content, ObjectId, ObjectType, ProceduralObject, Source, UnknownObjectType};
pub use report::{ReportFormat, ReportWriter};
pub use restore::{ReplayOutcome, RestoreManifest, Restorer, MANIFEST_FILE};
pub use result::{CoverageError, PlspecResult};
pub use tracker::{CounterSnapshot, ExecutionTracker};
