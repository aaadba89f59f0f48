//! Aggregation of raw counters into per-object, per-line coverage.
//!
//! Aggregation is a pure function of the instrumentation arena and a counter
//! snapshot: running it twice over the same inputs gives equal results.

use crate::instrument::{InstrumentationArena, LineMap, SlotId};
use crate::object::{line_content, ObjectId, Source};
use crate::result::CoverageError;
use crate::tracker::CounterSnapshot;
use serde::Serialize;
use std::collections::BTreeMap;

/// Coverage percentage; zero executable lines counts as fully covered
#[must_use]
pub fn coverage_percent(covered: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        (covered as f64 / total as f64) * 100.0
    }
}

/// Classification of one source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineClass {
    /// No statement starts on the line
    NonExecutable,
    /// Executed at least once
    Covered,
    /// Executable but never executed
    Uncovered,
}

impl LineClass {
    /// CSS class / serialized name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonExecutable => "non-executable",
            Self::Covered => "covered",
            Self::Uncovered => "uncovered",
        }
    }
}

/// One annotated source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineCoverage {
    /// 1-based line number
    pub number: usize,
    /// Line text without its terminator
    pub text: String,
    /// Hit count, `None` for non-executable lines
    pub hits: Option<u64>,
    /// Classification
    pub class: LineClass,
}

/// Coverage of one object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCoverage {
    /// Identity
    pub id: ObjectId,
    /// Every physical line of the original source
    pub lines: Vec<LineCoverage>,
}

impl ObjectCoverage {
    /// Correlate a line map with slot counts; missing slots count zero
    #[must_use]
    pub fn from_counts(
        id: ObjectId,
        source: &Source,
        line_map: &LineMap,
        counts: &BTreeMap<SlotId, u64>,
    ) -> Self {
        let lines = source
            .lines()
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let number = index + 1;
                let slot = line_map.get(number).and_then(|info| info.slot_id());
                let hits = slot.map(|s| counts.get(&s).copied().unwrap_or(0));
                let class = match hits {
                    None => LineClass::NonExecutable,
                    Some(0) => LineClass::Uncovered,
                    Some(_) => LineClass::Covered,
                };
                LineCoverage {
                    number,
                    text: line_content(text).to_string(),
                    hits,
                    class,
                }
            })
            .collect();
        Self { id, lines }
    }

    /// Number of executable lines
    #[must_use]
    pub fn executable_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.class != LineClass::NonExecutable)
            .count()
    }

    /// Number of covered lines
    #[must_use]
    pub fn covered_lines(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.class == LineClass::Covered)
            .count()
    }

    /// Number of uncovered lines
    #[must_use]
    pub fn uncovered_lines(&self) -> usize {
        self.executable_lines() - self.covered_lines()
    }

    /// covered / executable × 100
    #[must_use]
    pub fn percentage(&self) -> f64 {
        coverage_percent(self.covered_lines(), self.executable_lines())
    }
}

/// An object whose counters could not be read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnavailableObject {
    /// Identity
    pub id: ObjectId,
    /// Why the counters are missing
    pub reason: String,
}

/// Totals over a set of objects
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageSummary {
    /// Objects with coverage data
    pub objects: usize,
    /// Executable lines over all objects
    pub executable_lines: usize,
    /// Covered lines over all objects
    pub covered_lines: usize,
    /// Overall percentage
    pub coverage_percent: f64,
}

/// Result of aggregating one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageSet {
    /// Objects with coverage, in identity order
    pub objects: Vec<ObjectCoverage>,
    /// Objects whose counters were unavailable, in identity order
    pub unavailable: Vec<UnavailableObject>,
}

impl CoverageSet {
    /// Totals over the available objects
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let executable_lines = self.objects.iter().map(ObjectCoverage::executable_lines).sum();
        let covered_lines = self.objects.iter().map(ObjectCoverage::covered_lines).sum();
        CoverageSummary {
            objects: self.objects.len(),
            executable_lines,
            covered_lines,
            coverage_percent: coverage_percent(covered_lines, executable_lines),
        }
    }

    /// Coverage of one object
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&ObjectCoverage> {
        self.objects.iter().find(|o| &o.id == id)
    }

    /// Unavailable objects as per-object errors
    #[must_use]
    pub fn failures(&self) -> Vec<CoverageError> {
        self.unavailable
            .iter()
            .map(|u| CoverageError::Aggregation {
                object: u.id.clone(),
                message: u.reason.clone(),
            })
            .collect()
    }
}

/// Builds a [`CoverageSet`] from the arena and a snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    /// Aggregate every object in the arena
    #[must_use]
    pub fn aggregate(arena: &InstrumentationArena, snapshot: &CounterSnapshot) -> CoverageSet {
        let mut set = CoverageSet::default();

        for object in arena.iter() {
            if let Some(reason) = snapshot.unavailable_reason(&object.id) {
                set.unavailable.push(UnavailableObject {
                    id: object.id.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }

            let empty = BTreeMap::new();
            let counts = snapshot.counts_for(&object.id).unwrap_or(&empty);
            let coverage =
                ObjectCoverage::from_counts(object.id.clone(), &object.original, &object.line_map, counts);
            tracing::debug!(
                object = %object.id,
                covered = coverage.covered_lines(),
                executable = coverage.executable_lines(),
                "aggregated"
            );
            set.objects.push(coverage);
        }

        set
    }
}
