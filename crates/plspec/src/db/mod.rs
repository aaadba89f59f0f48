//! Database boundary.
//!
//! The engine never opens or closes connections. It talks to the catalog of
//! procedural objects through [`Catalog`] and to the shared counter table
//! through [`CounterStore`]; callers pass both in as trait objects.

mod sqlite;

pub use sqlite::{CatalogScope, SqliteDatabase};

use crate::instrument::SlotId;
use crate::object::{ObjectId, Source};
use crate::result::PlspecResult;
use std::collections::BTreeMap;

/// What a deploy left behind in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStatus {
    /// Definition replaced and compiled
    Valid,
    /// Definition replaced but stored with compile errors
    Invalid {
        /// Compiler message
        message: String,
    },
}

impl DeployStatus {
    /// Whether the definition compiled
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Metadata and DDL access to procedural objects
pub trait Catalog {
    /// Schema of the connected user
    fn current_schema(&self) -> PlspecResult<String>;

    /// Every procedural object visible to the connection
    ///
    /// Implementations report unreadable metadata as
    /// [`CoverageError::CatalogAccess`](crate::CoverageError::CatalogAccess).
    fn list_objects(&self) -> PlspecResult<Vec<ObjectId>>;

    /// Current source of an object
    fn fetch_source(&self, id: &ObjectId) -> PlspecResult<Source>;

    /// Replace the live definition of an object
    ///
    /// A definition that was stored but does not compile comes back as
    /// [`DeployStatus::Invalid`]. An error means the live definition was not
    /// replaced, e.g. [`CoverageError::Deploy`](crate::CoverageError::Deploy)
    /// for a refused DDL statement.
    fn deploy(&self, id: &ObjectId, source: &Source) -> PlspecResult<DeployStatus>;
}

/// Shared execution counters keyed by (object, slot)
///
/// Writers are concurrent database sessions; `increment` must be a single
/// atomic operation in the store, never a read followed by a write.
pub trait CounterStore {
    /// Create the counter facility if it does not exist
    fn install(&self) -> PlspecResult<()>;

    /// Remove every recorded count
    fn clear(&self) -> PlspecResult<()>;

    /// Add one to the count of a slot
    fn increment(&self, id: &ObjectId, slot: SlotId) -> PlspecResult<()>;

    /// Counts recorded for one object; slots never hit may be absent
    fn counts_for(&self, id: &ObjectId) -> PlspecResult<BTreeMap<SlotId, u64>>;

    /// Whether an object belongs to the counter facility itself
    ///
    /// Such objects are never instrumented.
    fn is_tracker_object(&self, _id: &ObjectId) -> bool {
        false
    }
}
