//! Source instrumentation.
//!
//! Each selected object goes through two steps:
//!
//! 1. [`Instrumenter::prepare`] fetches the live source, classifies its lines
//!    and builds the instrumented text. Nothing is mutated. A source the
//!    classifier cannot follow is excluded here.
//! 2. [`Instrumenter::deploy`] replaces the live definition. A definition
//!    that does not compile is reverted on the spot and the object drops out
//!    of the run.
//!
//! Injected calls never contain a line terminator, so the instrumented text
//! has exactly the line numbering of the original.

pub mod lexer;
mod line_map;

pub use line_map::{LineInfo, LineMap, SlotId};

use crate::db::{Catalog, DeployStatus};
use crate::object::{ObjectId, ProceduralObject, Source};
use crate::result::{CoverageError, PlspecResult};
use crate::tracker::hit_call;
use chrono::Utc;
use std::collections::BTreeMap;

/// Classify the lines of a source and assign slots
#[must_use]
pub fn build_line_map(source: &Source) -> LineMap {
    let classification = lexer::classify(&source.lines());
    LineMap::from_points(&classification.points)
}

/// Inject one tracker call per executable line
#[must_use]
pub fn instrument_source(id: &ObjectId, source: &Source, line_map: &LineMap) -> Source {
    let lines = source.lines();
    let mut text = String::with_capacity(source.as_str().len() + line_map.executable_count() * 64);

    for (index, line) in lines.iter().enumerate() {
        match line_map.get(index + 1).and_then(|info| info.slot) {
            Some((slot, offset)) if line.is_char_boundary(offset) => {
                text.push_str(&line[..offset]);
                text.push_str(&hit_call(id, slot));
                text.push_str(&line[offset..]);
            }
            _ => text.push_str(line),
        }
    }

    Source::new(text)
}

/// An object whose instrumented text is ready but not yet deployed
#[derive(Debug, Clone)]
pub struct PreparedObject {
    /// Identity
    pub id: ObjectId,
    /// Live source at preparation time
    pub original: Source,
    /// Source with tracker calls
    pub instrumented: Source,
    /// Line map built from `original`
    pub line_map: LineMap,
}

/// Why deploying one object failed
#[derive(Debug)]
pub struct DeployFailure {
    /// The instrumentation failure
    pub error: CoverageError,
    /// Set when the original could not be put back
    pub restore_error: Option<CoverageError>,
}

/// Rewrites and deploys objects through a [`Catalog`]
#[derive(Clone, Copy)]
pub struct Instrumenter<'a> {
    catalog: &'a dyn Catalog,
}

impl std::fmt::Debug for Instrumenter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumenter").finish_non_exhaustive()
    }
}

impl<'a> Instrumenter<'a> {
    /// Create an instrumenter over a catalog
    #[must_use]
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    /// Fetch and rewrite one object without touching the database
    pub fn prepare(&self, id: &ObjectId) -> PlspecResult<PreparedObject> {
        let original = self
            .catalog
            .fetch_source(id)
            .map_err(|e| CoverageError::Instrumentation {
                object: id.clone(),
                message: e.to_string(),
            })?;

        let classification = lexer::classify(&original.lines());
        if let Some(message) = classification.structure_error {
            return Err(CoverageError::Instrumentation {
                object: id.clone(),
                message: format!("source not understood: {message}"),
            });
        }
        let line_map = LineMap::from_points(&classification.points);
        let instrumented = instrument_source(id, &original, &line_map);

        tracing::debug!(
            object = %id,
            lines = line_map.line_count(),
            executable = line_map.executable_count(),
            "prepared instrumentation"
        );

        Ok(PreparedObject {
            id: id.clone(),
            original,
            instrumented,
            line_map,
        })
    }

    /// Deploy a prepared object, reverting it if the database rejects it
    ///
    /// A refused deploy left the original in place and needs no revert. An
    /// instrumented definition stored invalid is replaced by the original.
    pub fn deploy(&self, prepared: PreparedObject) -> Result<ProceduralObject, DeployFailure> {
        let PreparedObject {
            id,
            original,
            instrumented,
            line_map,
        } = prepared;

        match self.catalog.deploy(&id, &instrumented) {
            Ok(DeployStatus::Valid) => {}
            Ok(DeployStatus::Invalid { message }) => {
                tracing::warn!(object = %id, error = %message, "instrumented source invalid, reverting");
                let restore_error = self.revert(&id, &original);
                return Err(DeployFailure {
                    error: CoverageError::Instrumentation {
                        object: id,
                        message,
                    },
                    restore_error,
                });
            }
            Err(e) => {
                tracing::warn!(object = %id, error = %e, "instrumented source rejected");
                return Err(DeployFailure {
                    error: CoverageError::Instrumentation {
                        object: id,
                        message: e.to_string(),
                    },
                    restore_error: None,
                });
            }
        }

        Ok(ProceduralObject {
            id,
            original,
            instrumented,
            line_map,
            deployed_at: Utc::now(),
        })
    }

    /// Put the original back; only a deploy that did not replace counts as failed
    fn revert(&self, id: &ObjectId, original: &Source) -> Option<CoverageError> {
        match self.catalog.deploy(id, original) {
            Ok(DeployStatus::Valid) => None,
            Ok(DeployStatus::Invalid { message }) => {
                tracing::warn!(object = %id, error = %message, "original restored but does not compile");
                None
            }
            Err(e) => Some(CoverageError::Restoration {
                object: id.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Every object currently deployed in instrumented form
#[derive(Debug, Clone, Default)]
pub struct InstrumentationArena {
    objects: BTreeMap<ObjectId, ProceduralObject>,
}

impl InstrumentationArena {
    /// Create an empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployed object
    pub fn insert(&mut self, object: ProceduralObject) {
        self.objects.insert(object.id.clone(), object);
    }

    /// Look up an object
    #[must_use]
    pub fn get(&self, id: &ObjectId) -> Option<&ProceduralObject> {
        self.objects.get(id)
    }

    /// Remove an object once it has been restored
    pub fn remove(&mut self, id: &ObjectId) -> Option<ProceduralObject> {
        self.objects.remove(id)
    }

    /// Objects in identity order
    pub fn iter(&self) -> impl Iterator<Item = &ProceduralObject> {
        self.objects.values()
    }

    /// Identities in identity order
    #[must_use]
    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().cloned().collect()
    }

    /// Number of objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the arena is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::SqliteDatabase;
    use crate::object::ObjectType;
    use crate::result::PlspecResult;
    use proptest::prelude::*;

    const FUNC: &str = "FUNCTION test_profiler RETURN VARCHAR2 IS
BEGIN
  RETURN 'test_profiler';
EXCEPTION
  WHEN OTHERS THEN
    RETURN 'others';
END;
";

    fn func_id() -> ObjectId {
        ObjectId::new("HR", "TEST_PROFILER", ObjectType::Function)
    }

    #[test]
    fn test_instrument_source_injects_at_statement_start() {
        let source = Source::new(FUNC);
        let map = build_line_map(&source);
        let out = instrument_source(&func_id(), &source, &map);
        let lines = out.lines();
        assert_eq!(
            lines[2],
            "  plspec_coverage.hit('HR', 'TEST_PROFILER', 'FUNCTION', 1); RETURN 'test_profiler';\n"
        );
        assert_eq!(
            lines[5],
            "    plspec_coverage.hit('HR', 'TEST_PROFILER', 'FUNCTION', 2); RETURN 'others';\n"
        );
        assert_eq!(lines[0], source.lines()[0]);
    }

    #[test]
    fn test_instrumented_source_passes_structure_check() {
        let source = Source::new(FUNC);
        let map = build_line_map(&source);
        let out = instrument_source(&func_id(), &source, &map);
        assert!(lexer::check_structure(&out.lines()).is_ok());
    }

    #[test]
    fn test_deploy_failure_reverts_original() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let id = func_id();
        db.create_or_replace(&id, &Source::new(FUNC)).unwrap();
        let instrumenter = Instrumenter::new(&db);

        let mut prepared = instrumenter.prepare(&id).unwrap();
        prepared.instrumented = Source::new("FUNCTION test_profiler RETURN VARCHAR2 IS\nBEGIN\n");
        let failure = instrumenter.deploy(prepared).unwrap_err();

        assert!(matches!(failure.error, CoverageError::Instrumentation { .. }));
        assert!(failure.restore_error.is_none());
        assert_eq!(db.fetch_source(&id).unwrap(), Source::new(FUNC));
    }

    #[test]
    fn test_prepare_rejects_source_the_classifier_cannot_follow() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let id = func_id();
        let broken = Source::new("FUNCTION f RETURN NUMBER IS\nBEGIN\n  RETURN 1;\nEND;\nEND;\n");
        db.create_or_replace(&id, &broken).unwrap();

        let err = Instrumenter::new(&db).prepare(&id).unwrap_err();
        assert!(matches!(err, CoverageError::Instrumentation { .. }));
        assert!(err.to_string().contains("END without matching block"));
        assert_eq!(db.fetch_source(&id).unwrap(), broken);
        assert_eq!(db.object_status(&id).unwrap().as_deref(), Some("VALID"));
    }

    #[test]
    fn test_invalid_original_after_revert_is_not_a_restoration_failure() {
        struct BrokenOriginal<'a>(&'a SqliteDatabase);

        impl Catalog for BrokenOriginal<'_> {
            fn current_schema(&self) -> PlspecResult<String> {
                self.0.current_schema()
            }
            fn list_objects(&self) -> PlspecResult<Vec<ObjectId>> {
                self.0.list_objects()
            }
            fn fetch_source(&self, id: &ObjectId) -> PlspecResult<Source> {
                self.0.fetch_source(id)
            }
            fn deploy(&self, id: &ObjectId, source: &Source) -> PlspecResult<DeployStatus> {
                self.0.create_or_replace(id, source)?;
                Ok(DeployStatus::Invalid {
                    message: "PLS-00103: encountered the symbol".to_string(),
                })
            }
        }

        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let id = func_id();
        db.create_or_replace(&id, &Source::new(FUNC)).unwrap();
        let catalog = BrokenOriginal(&db);
        let instrumenter = Instrumenter::new(&catalog);

        let failure = instrumenter
            .deploy(instrumenter.prepare(&id).unwrap())
            .unwrap_err();
        assert!(matches!(failure.error, CoverageError::Instrumentation { .. }));
        assert!(failure.restore_error.is_none());
        assert_eq!(db.fetch_source(&id).unwrap(), Source::new(FUNC));
    }

    #[test]
    fn test_refused_deploy_needs_no_revert() {
        struct Refusing;

        impl Catalog for Refusing {
            fn current_schema(&self) -> PlspecResult<String> {
                Ok("HR".to_string())
            }
            fn list_objects(&self) -> PlspecResult<Vec<ObjectId>> {
                Ok(Vec::new())
            }
            fn fetch_source(&self, _id: &ObjectId) -> PlspecResult<Source> {
                Ok(Source::new(FUNC))
            }
            fn deploy(&self, id: &ObjectId, _source: &Source) -> PlspecResult<DeployStatus> {
                Err(CoverageError::Deploy {
                    object: id.clone(),
                    message: "ORA-01031: insufficient privileges".to_string(),
                })
            }
        }

        let instrumenter = Instrumenter::new(&Refusing);
        let failure = instrumenter
            .deploy(instrumenter.prepare(&func_id()).unwrap())
            .unwrap_err();
        assert!(failure.error.to_string().contains("ORA-01031"));
        assert!(failure.restore_error.is_none());
    }

    #[test]
    fn test_prepare_missing_object_is_instrumentation_failure() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let err = Instrumenter::new(&db).prepare(&func_id()).unwrap_err();
        assert!(matches!(err, CoverageError::Instrumentation { .. }));
    }

    #[test]
    fn test_arena_orders_by_identity() {
        let db = SqliteDatabase::open_in_memory("HR").unwrap();
        let a = ObjectId::new("HR", "B_FUNC", ObjectType::Function);
        let b = ObjectId::new("HR", "A_FUNC", ObjectType::Function);
        for id in [&a, &b] {
            db.create_or_replace(id, &Source::new(FUNC)).unwrap();
        }
        let instrumenter = Instrumenter::new(&db);
        let mut arena = InstrumentationArena::new();
        for id in [&a, &b] {
            let prepared = instrumenter.prepare(id).unwrap();
            arena.insert(instrumenter.deploy(prepared).unwrap());
        }
        assert_eq!(arena.ids(), vec![b, a]);
        assert_eq!(arena.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_instrumentation_preserves_line_count(
            body in proptest::collection::vec(
                prop_oneof![
                    Just("  x := x + 1;"),
                    Just("  -- comment"),
                    Just(""),
                    Just("  IF x > 1 THEN"),
                    Just("    NULL;"),
                    Just("  END IF;"),
                    Just("  v := 'a''b';"),
                ],
                0..20,
            )
        ) {
            let mut text = String::from("PROCEDURE p IS\n  x NUMBER := 0;\nBEGIN\n");
            for line in &body {
                text.push_str(line);
                text.push('\n');
            }
            text.push_str("  NULL;\nEND;\n");
            let source = Source::new(text);
            let map = build_line_map(&source);
            let out = instrument_source(&func_id(), &source, &map);
            prop_assert_eq!(out.line_count(), source.line_count());
            prop_assert_eq!(map.line_count(), source.line_count());
            for (original, instrumented) in source.lines().iter().zip(out.lines()) {
                prop_assert!(instrumented.ends_with(original.trim_start()));
            }
        }

        #[test]
        fn prop_nested_constructs_stay_compilable(
            units in proptest::collection::vec(0..UNITS.len(), 0..12)
        ) {
            let mut text = String::from("PROCEDURE p IS\n  x NUMBER := 0;\nBEGIN\n");
            let mut expected = 1;
            for &unit in &units {
                let (body, statements) = UNITS[unit];
                text.push_str(body);
                expected += statements;
            }
            text.push_str("  NULL;\nEND;\n");

            let source = Source::new(text);
            let classification = lexer::classify(&source.lines());
            prop_assert_eq!(classification.structure_error.as_ref(), None);
            prop_assert_eq!(classification.executable_count(), expected);

            let map = LineMap::from_points(&classification.points);
            let out = instrument_source(&func_id(), &source, &map);
            prop_assert!(lexer::check_structure(&out.lines()).is_ok());
            prop_assert_eq!(lexer::classify(&out.lines()).executable_count(), expected);
        }
    }

    /// Statement groups and the number of lines in each that start a statement
    const UNITS: &[(&str, usize)] = &[
        ("  x := x + 1;\n", 1),
        ("  IF x > 1 THEN\n    x := 0;\n  ELSE\n    x := 1;\n  END IF;\n", 3),
        ("  FOR i IN 1..3 LOOP\n    NULL;\n  END LOOP;\n", 2),
        ("  CASE x WHEN 1 THEN NULL; ELSE NULL; END CASE;\n", 1),
        (
            "  MERGE INTO t USING s ON (t.id = s.id)\n  WHEN MATCHED THEN UPDATE SET t.v = s.v\n  WHEN NOT MATCHED THEN INSERT (id) VALUES (s.id);\n",
            1,
        ),
        (
            "  INSERT ALL\n    WHEN x > 0 THEN INTO a VALUES (x)\n    ELSE INTO b VALUES (x)\n  SELECT x FROM dual;\n",
            1,
        ),
        ("  $IF $$debug $THEN\n    x := 2;\n  $END\n", 1),
        (
            "  BEGIN\n    x := 1;\n  EXCEPTION WHEN OTHERS THEN NULL;\n  END;\n",
            2,
        ),
        ("  v := CASE WHEN x > 0 THEN 'p'\n            ELSE 'n' END;\n", 1),
    ];
}
