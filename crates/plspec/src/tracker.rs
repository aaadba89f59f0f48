//! Execution tracker: the shared counter facility instrumented code calls.

use crate::db::CounterStore;
use crate::instrument::SlotId;
use crate::object::ObjectId;
use crate::result::{CoverageError, PlspecResult};
use std::collections::BTreeMap;

/// Name of the package that owns the counter routine
pub const TRACKER_PACKAGE: &str = "PLSPEC_COVERAGE";

/// Routine invoked by every injected call
pub const TRACKER_ROUTINE: &str = "plspec_coverage.hit";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The call injected in front of an executable line
///
/// The text is a complete statement followed by one space and never
/// contains a line terminator.
#[must_use]
pub fn hit_call(id: &ObjectId, slot: SlotId) -> String {
    format!(
        "{}({}, {}, {}, {}); ",
        TRACKER_ROUTINE,
        quote(&id.schema),
        quote(&id.name),
        quote(id.object_type.as_str()),
        slot
    )
}

/// Counts captured once after a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    counts: BTreeMap<ObjectId, BTreeMap<SlotId, u64>>,
    unavailable: BTreeMap<ObjectId, String>,
}

impl CounterSnapshot {
    /// Create an empty snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the counts read for an object
    pub fn insert_counts(&mut self, id: ObjectId, counts: BTreeMap<SlotId, u64>) {
        self.unavailable.remove(&id);
        self.counts.insert(id, counts);
    }

    /// Record that an object's counters could not be read
    pub fn mark_unavailable(&mut self, id: ObjectId, reason: impl Into<String>) {
        self.counts.remove(&id);
        self.unavailable.insert(id, reason.into());
    }

    /// Counts for an object, `None` when it was never read or is unavailable
    #[must_use]
    pub fn counts_for(&self, id: &ObjectId) -> Option<&BTreeMap<SlotId, u64>> {
        self.counts.get(id)
    }

    /// Count of one slot; missing slots count zero
    #[must_use]
    pub fn count(&self, id: &ObjectId, slot: SlotId) -> u64 {
        self.counts
            .get(id)
            .and_then(|slots| slots.get(&slot))
            .copied()
            .unwrap_or(0)
    }

    /// Why an object's counters are unavailable
    #[must_use]
    pub fn unavailable_reason(&self, id: &ObjectId) -> Option<&str> {
        self.unavailable.get(id).map(String::as_str)
    }

    /// Objects whose counters could not be read
    pub fn unavailable(&self) -> impl Iterator<Item = (&ObjectId, &str)> {
        self.unavailable.iter().map(|(id, r)| (id, r.as_str()))
    }
}

/// Front end to a [`CounterStore`]
#[derive(Clone, Copy)]
pub struct ExecutionTracker<'a> {
    store: &'a dyn CounterStore,
}

impl std::fmt::Debug for ExecutionTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTracker").finish_non_exhaustive()
    }
}

impl<'a> ExecutionTracker<'a> {
    /// Wrap a counter store
    #[must_use]
    pub fn new(store: &'a dyn CounterStore) -> Self {
        Self { store }
    }

    /// Install the counter facility and reset every count
    ///
    /// Failure here is fatal for the run.
    pub fn install(&self) -> PlspecResult<()> {
        self.store
            .install()
            .map_err(|e| CoverageError::tracker(format!("install failed: {e}")))?;
        self.store
            .clear()
            .map_err(|e| CoverageError::tracker(format!("clear failed: {e}")))?;
        tracing::debug!("execution tracker installed");
        Ok(())
    }

    /// Whether an object belongs to the tracker itself
    #[must_use]
    pub fn owns(&self, id: &ObjectId) -> bool {
        self.store.is_tracker_object(id)
    }

    /// Read the counters of every listed object
    ///
    /// An unreadable object is marked unavailable; the others are still read.
    #[must_use]
    pub fn snapshot<'i, I>(&self, ids: I) -> CounterSnapshot
    where
        I: IntoIterator<Item = &'i ObjectId>,
    {
        let mut snapshot = CounterSnapshot::new();
        for id in ids {
            match self.store.counts_for(id) {
                Ok(counts) => snapshot.insert_counts(id.clone(), counts),
                Err(e) => {
                    tracing::warn!(object = %id, error = %e, "counters unavailable");
                    snapshot.mark_unavailable(id.clone(), e.to_string());
                }
            }
        }
        snapshot
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use crate::object::ObjectType;

    #[test]
    fn test_hit_call_doubles_quotes_and_has_no_newline() {
        let id = ObjectId::new("HR", "O'BRIEN", ObjectType::PackageBody);
        let call = hit_call(&id, SlotId::new(3));
        assert_eq!(
            call,
            "plspec_coverage.hit('HR', 'O''BRIEN', 'PACKAGE BODY', 3); "
        );
        assert!(!call.contains('\n'));
    }

    #[test]
    fn test_snapshot_missing_slot_counts_zero() {
        let id = ObjectId::new("HR", "F", ObjectType::Function);
        let mut snapshot = CounterSnapshot::new();
        snapshot.insert_counts(id.clone(), BTreeMap::from([(SlotId::new(1), 4)]));
        assert_eq!(snapshot.count(&id, SlotId::new(1)), 4);
        assert_eq!(snapshot.count(&id, SlotId::new(2)), 0);
        assert!(snapshot.unavailable_reason(&id).is_none());
    }

    #[test]
    fn test_mark_unavailable_replaces_counts() {
        let id = ObjectId::new("HR", "F", ObjectType::Function);
        let mut snapshot = CounterSnapshot::new();
        snapshot.insert_counts(id.clone(), BTreeMap::new());
        snapshot.mark_unavailable(id.clone(), "gone");
        assert!(snapshot.counts_for(&id).is_none());
        assert_eq!(snapshot.unavailable_reason(&id), Some("gone"));
        assert_eq!(snapshot.unavailable().count(), 1);
    }

    #[test]
    fn test_install_clears_previous_counts() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let tracker = ExecutionTracker::new(&db);
        let id = ObjectId::new("HR", "F", ObjectType::Function);

        tracker.install().unwrap();
        db.increment(&id, SlotId::new(1)).unwrap();
        db.increment(&id, SlotId::new(1)).unwrap();
        assert_eq!(tracker.snapshot([&id]).count(&id, SlotId::new(1)), 2);

        tracker.install().unwrap();
        assert_eq!(tracker.snapshot([&id]).count(&id, SlotId::new(1)), 0);
    }

    #[test]
    fn test_tracker_package_is_owned() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let tracker = ExecutionTracker::new(&db);
        tracker.install().unwrap();
        assert!(tracker.owns(&ObjectId::new("HR", TRACKER_PACKAGE, ObjectType::Package)));
        assert!(!tracker.owns(&ObjectId::new("HR", "PAY", ObjectType::Package)));
    }
}
