//! SQLite-backed data dictionary and counter table.
//!
//! `plspec_objects` plays the role of the procedural-object dictionary and
//! `plspec_coverage_counters` holds the execution counts. Deploying a
//! definition runs a structural compile check; a definition that fails it is
//! still stored, with status `INVALID`, the way a database keeps an invalid
//! object after `CREATE OR REPLACE`.

use super::{Catalog, CounterStore, DeployStatus};
use crate::instrument::{lexer, SlotId};
use crate::object::{ObjectId, ObjectType, Source};
use crate::result::{CoverageError, PlspecResult};
use crate::tracker::TRACKER_PACKAGE;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;

const DICTIONARY_DDL: &str = "
CREATE TABLE IF NOT EXISTS plspec_objects (
    owner         TEXT NOT NULL,
    object_name   TEXT NOT NULL,
    object_type   TEXT NOT NULL,
    source        TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'VALID',
    last_ddl_time TEXT NOT NULL,
    PRIMARY KEY (owner, object_name, object_type)
);
";

const COUNTERS_DDL: &str = "
CREATE TABLE IF NOT EXISTS plspec_coverage_counters (
    owner       TEXT NOT NULL,
    object_name TEXT NOT NULL,
    object_type TEXT NOT NULL,
    slot        INTEGER NOT NULL,
    hits        INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (owner, object_name, object_type, slot)
);
";

const TRACKER_SPEC: &str = "PACKAGE plspec_coverage IS
  PROCEDURE hit(p_owner VARCHAR2, p_name VARCHAR2, p_type VARCHAR2, p_slot PLS_INTEGER);
END plspec_coverage;
";

const TRACKER_BODY: &str = "PACKAGE BODY plspec_coverage IS
  PROCEDURE hit(p_owner VARCHAR2, p_name VARCHAR2, p_type VARCHAR2, p_slot PLS_INTEGER) IS
    PRAGMA AUTONOMOUS_TRANSACTION;
  BEGIN
    MERGE INTO plspec_coverage_counters c
    USING (SELECT p_owner o, p_name n, p_type t, p_slot s FROM dual) x
    ON (c.owner = x.o AND c.object_name = x.n AND c.object_type = x.t AND c.slot = x.s)
    WHEN MATCHED THEN UPDATE SET c.hits = c.hits + 1
    WHEN NOT MATCHED THEN INSERT (owner, object_name, object_type, slot, hits)
      VALUES (x.o, x.n, x.t, x.s, 1);
    COMMIT;
  END hit;
END plspec_coverage;
";

/// Which objects the catalog lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogScope {
    /// Objects owned by the connected schema
    #[default]
    CurrentSchema,
    /// Objects of every schema (dictionary access)
    AllSchemas,
}

/// One connection to a SQLite file emulating the data dictionary
#[derive(Debug)]
pub struct SqliteDatabase {
    conn: Connection,
    schema: String,
    scope: CatalogScope,
}

/// Apply WAL and busy-timeout pragmas; several sessions share one file
fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )
}

impl SqliteDatabase {
    /// Open (or create) a database file as the given schema
    pub fn open(path: &Path, schema: &str) -> PlspecResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, schema)
    }

    /// Open a private in-memory database (for tests)
    pub fn open_in_memory(schema: &str) -> PlspecResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, schema)
    }

    fn from_connection(conn: Connection, schema: &str) -> PlspecResult<Self> {
        apply_pragmas(&conn)?;
        conn.execute_batch(DICTIONARY_DDL)?;
        Ok(Self {
            conn,
            schema: schema.trim().to_uppercase(),
            scope: CatalogScope::default(),
        })
    }

    /// Set the catalog scope
    #[must_use]
    pub fn with_scope(mut self, scope: CatalogScope) -> Self {
        self.scope = scope;
        self
    }

    /// Connected schema, uppercased
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Catalog scope
    #[must_use]
    pub const fn scope(&self) -> CatalogScope {
        self.scope
    }

    /// The underlying connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Store a definition without compile checking, status `VALID`
    pub fn create_or_replace(&self, id: &ObjectId, source: &Source) -> PlspecResult<()> {
        self.store(id, source, "VALID")
    }

    /// Remove an object from the dictionary
    pub fn drop_object(&self, id: &ObjectId) -> PlspecResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM plspec_objects WHERE owner = ?1 AND object_name = ?2 AND object_type = ?3",
            params![id.schema, id.name, id.object_type.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Compile status of an object (`VALID` / `INVALID`)
    pub fn object_status(&self, id: &ObjectId) -> PlspecResult<Option<String>> {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM plspec_objects
                 WHERE owner = ?1 AND object_name = ?2 AND object_type = ?3",
                params![id.schema, id.name, id.object_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    fn store(&self, id: &ObjectId, source: &Source, status: &str) -> PlspecResult<()> {
        self.conn.execute(
            "INSERT INTO plspec_objects (owner, object_name, object_type, source, status, last_ddl_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (owner, object_name, object_type)
             DO UPDATE SET source = excluded.source,
                           status = excluded.status,
                           last_ddl_time = excluded.last_ddl_time",
            params![
                id.schema,
                id.name,
                id.object_type.as_str(),
                source.as_str(),
                status,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn query_ids<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> rusqlite::Result<Vec<(String, String, String)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
        rows.collect()
    }

    fn tracker_ids(&self) -> [ObjectId; 2] {
        [
            ObjectId::new(self.schema.clone(), TRACKER_PACKAGE, ObjectType::Package),
            ObjectId::new(self.schema.clone(), TRACKER_PACKAGE, ObjectType::PackageBody),
        ]
    }
}

impl Catalog for SqliteDatabase {
    fn current_schema(&self) -> PlspecResult<String> {
        Ok(self.schema.clone())
    }

    fn list_objects(&self) -> PlspecResult<Vec<ObjectId>> {
        let rows = match self.scope {
            CatalogScope::CurrentSchema => self.query_ids(
                "SELECT owner, object_name, object_type FROM plspec_objects WHERE owner = ?1",
                params![self.schema],
            ),
            CatalogScope::AllSchemas => self.query_ids(
                "SELECT owner, object_name, object_type FROM plspec_objects",
                [],
            ),
        }
        .map_err(|e| CoverageError::catalog(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for (owner, name, object_type) in rows {
            match object_type.parse::<ObjectType>() {
                Ok(object_type) => ids.push(ObjectId::new(owner, name, object_type)),
                Err(e) => tracing::debug!(owner = %owner, name = %name, error = %e, "skipping"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn fetch_source(&self, id: &ObjectId) -> PlspecResult<Source> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT source FROM plspec_objects
                 WHERE owner = ?1 AND object_name = ?2 AND object_type = ?3",
                params![id.schema, id.name, id.object_type.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        text.map(Source::new)
            .ok_or_else(|| CoverageError::ObjectNotFound { object: id.clone() })
    }

    fn deploy(&self, id: &ObjectId, source: &Source) -> PlspecResult<DeployStatus> {
        match lexer::check_structure(&source.lines()) {
            Ok(()) => {
                self.store(id, source, "VALID")?;
                Ok(DeployStatus::Valid)
            }
            Err(message) => {
                self.store(id, source, "INVALID")?;
                Ok(DeployStatus::Invalid {
                    message: format!("compilation error: {message}"),
                })
            }
        }
    }
}

impl CounterStore for SqliteDatabase {
    fn install(&self) -> PlspecResult<()> {
        self.conn.execute_batch(COUNTERS_DDL)?;
        let [spec, body] = self.tracker_ids();
        self.store(&spec, &Source::new(TRACKER_SPEC), "VALID")?;
        self.store(&body, &Source::new(TRACKER_BODY), "VALID")?;
        Ok(())
    }

    fn clear(&self) -> PlspecResult<()> {
        self.conn.execute("DELETE FROM plspec_coverage_counters", [])?;
        Ok(())
    }

    fn increment(&self, id: &ObjectId, slot: SlotId) -> PlspecResult<()> {
        self.conn.execute(
            "INSERT INTO plspec_coverage_counters (owner, object_name, object_type, slot, hits)
             VALUES (?1, ?2, ?3, ?4, 1)
             ON CONFLICT (owner, object_name, object_type, slot)
             DO UPDATE SET hits = hits + 1",
            params![id.schema, id.name, id.object_type.as_str(), slot.as_u32()],
        )?;
        Ok(())
    }

    fn counts_for(&self, id: &ObjectId) -> PlspecResult<BTreeMap<SlotId, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT slot, hits FROM plspec_coverage_counters
             WHERE owner = ?1 AND object_name = ?2 AND object_type = ?3",
        )?;
        let rows = stmt.query_map(
            params![id.schema, id.name, id.object_type.as_str()],
            |row| Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (slot, hits) = row?;
            counts.insert(SlotId::new(slot), u64::try_from(hits).unwrap_or(0));
        }
        Ok(counts)
    }

    fn is_tracker_object(&self, id: &ObjectId) -> bool {
        // a tracker installed by another schema's run is listed too
        id.name == TRACKER_PACKAGE
            && matches!(id.object_type, ObjectType::Package | ObjectType::PackageBody)
    }
}
