//! Restoration of original definitions, and the crash-recovery manifest.
//!
//! Before the first instrumented deployment the engine writes
//! `<out>/.plspec-restore.json` with every object's original source. If the
//! process dies before restoring, `plspec restore` replays that file.

use crate::db::{Catalog, DeployStatus};
use crate::instrument::{InstrumentationArena, PreparedObject};
use crate::object::{ObjectId, ProceduralObject, Source};
use crate::result::{CoverageError, PlspecResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the restore manifest inside the report directory
pub const MANIFEST_FILE: &str = ".plspec-restore.json";

const MANIFEST_VERSION: u32 = 1;

/// One object recorded in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Identity
    pub id: ObjectId,
    /// Source to redeploy
    pub original: Source,
    /// SHA-256 of the instrumented text that was deployed
    pub instrumented_sha256: String,
}

/// Originals of every object a run is about to instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreManifest {
    /// Format version
    pub version: u32,
    /// When the manifest was written
    pub created_at: DateTime<Utc>,
    /// Recorded objects, in identity order
    pub entries: Vec<ManifestEntry>,
}

impl RestoreManifest {
    /// Build a manifest from prepared objects
    #[must_use]
    pub fn from_prepared(prepared: &[PreparedObject]) -> Self {
        let mut entries: Vec<ManifestEntry> = prepared
            .iter()
            .map(|p| ManifestEntry {
                id: p.id.clone(),
                original: p.original.clone(),
                instrumented_sha256: p.instrumented.sha256_hex(),
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            entries,
        }
    }

    /// Manifest path inside a report directory
    #[must_use]
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Write the manifest into `dir`, creating it if missing
    pub fn save(&self, dir: &Path) -> PlspecResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    /// Read a manifest file
    pub fn load(path: &Path) -> PlspecResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CoverageError::manifest(format!("cannot read {}: {e}", path.display()))
        })?;
        let manifest: Self = serde_json::from_str(&json)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(CoverageError::manifest(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// Keep only the listed objects
    pub fn retain(&mut self, ids: &[ObjectId]) {
        self.entries.retain(|e| ids.contains(&e.id));
    }

    /// Whether no object is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of replaying a manifest
#[derive(Debug, Default)]
pub struct ReplayOutcome {
    /// Objects redeployed with their original
    pub restored: Vec<ObjectId>,
    /// Objects left alone, with the reason
    pub skipped: Vec<(ObjectId, String)>,
    /// Objects that could not be restored
    pub failures: Vec<CoverageError>,
}

/// Redeploys original definitions through a [`Catalog`]
#[derive(Clone, Copy)]
pub struct Restorer<'a> {
    catalog: &'a dyn Catalog,
}

impl std::fmt::Debug for Restorer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restorer").finish_non_exhaustive()
    }
}

impl<'a> Restorer<'a> {
    /// Create a restorer over a catalog
    #[must_use]
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    /// Redeploy one object's original
    pub fn restore_object(&self, object: &ProceduralObject) -> PlspecResult<()> {
        self.redeploy(&object.id, &object.original)
    }

    /// The original counts as restored once it is the live text, compiled or not
    fn redeploy(&self, id: &ObjectId, original: &Source) -> PlspecResult<()> {
        let status = self
            .catalog
            .deploy(id, original)
            .map_err(|e| CoverageError::Restoration {
                object: id.clone(),
                message: e.to_string(),
            })?;
        if let DeployStatus::Invalid { message } = status {
            tracing::warn!(object = %id, error = %message, "original restored but does not compile");
        }
        Ok(())
    }

    /// Restore every object in the arena
    ///
    /// Every object is attempted. Restored objects leave the arena; failed
    /// ones stay and their errors are returned together.
    pub fn restore_all(&self, arena: &mut InstrumentationArena) -> Vec<CoverageError> {
        let mut failures = Vec::new();
        for id in arena.ids() {
            let result = match arena.get(&id) {
                Some(object) => self.restore_object(object),
                None => continue,
            };
            match result {
                Ok(()) => {
                    tracing::debug!(object = %id, "restored");
                    arena.remove(&id);
                }
                Err(e) => {
                    tracing::warn!(object = %id, error = %e, "restoration failed");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Replay a manifest left behind by an interrupted run
    ///
    /// An object is redeployed only while its live source is still the
    /// instrumented text; anything else is skipped and listed.
    pub fn replay(&self, manifest: &RestoreManifest) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::default();

        for entry in &manifest.entries {
            let live = match self.catalog.fetch_source(&entry.id) {
                Ok(live) => live,
                Err(CoverageError::ObjectNotFound { .. }) => {
                    outcome
                        .skipped
                        .push((entry.id.clone(), "object no longer exists".to_string()));
                    continue;
                }
                Err(e) => {
                    outcome.failures.push(CoverageError::Restoration {
                        object: entry.id.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if live == entry.original {
                outcome
                    .skipped
                    .push((entry.id.clone(), "already original".to_string()));
            } else if live.sha256_hex() != entry.instrumented_sha256 {
                outcome
                    .skipped
                    .push((entry.id.clone(), "changed since instrumentation".to_string()));
            } else {
                match self.redeploy(&entry.id, &entry.original) {
                    Ok(()) => outcome.restored.push(entry.id.clone()),
                    Err(e) => outcome.failures.push(e),
                }
            }
        }

        outcome
    }
}
