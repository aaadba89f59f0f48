//! Per-object line map and type-safe slot identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe instrumentation slot identifier
///
/// Slots are numbered from 1 in line order within one object. Cannot be
/// confused with a line number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Create a new slot ID
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the instrumenter decided about one physical line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    /// 1-based line number
    pub line: usize,
    /// Slot and byte offset of the injected call, for executable lines
    pub slot: Option<(SlotId, usize)>,
}

impl LineInfo {
    /// Whether the line carries a tracker call
    #[must_use]
    pub const fn is_executable(&self) -> bool {
        self.slot.is_some()
    }

    /// Slot id, for executable lines
    #[must_use]
    pub fn slot_id(&self) -> Option<SlotId> {
        self.slot.map(|(id, _)| id)
    }
}

/// Immutable map from physical line to instrumentation slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    lines: Vec<LineInfo>,
}

impl LineMap {
    /// Build from per-line injection offsets, assigning slots in line order
    #[must_use]
    pub fn from_points(points: &[Option<usize>]) -> Self {
        let mut next = 1;
        let lines = points
            .iter()
            .enumerate()
            .map(|(index, point)| LineInfo {
                line: index + 1,
                slot: point.map(|offset| {
                    let id = SlotId::new(next);
                    next += 1;
                    (id, offset)
                }),
            })
            .collect();
        Self { lines }
    }

    /// Every line, in order
    #[must_use]
    pub fn lines(&self) -> &[LineInfo] {
        &self.lines
    }

    /// Info for a 1-based line number
    #[must_use]
    pub fn get(&self, line: usize) -> Option<&LineInfo> {
        line.checked_sub(1).and_then(|i| self.lines.get(i))
    }

    /// Number of physical lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Number of executable lines
    #[must_use]
    pub fn executable_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_executable()).count()
    }

    /// Slot ids in line order
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.lines.iter().filter_map(LineInfo::slot_id)
    }
}
