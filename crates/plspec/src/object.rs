//! Procedural object identity and source text.

use crate::instrument::LineMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Kind of database-resident procedural object
///
/// Declaration order is the identity order used for sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// Standalone procedure
    Procedure,
    /// Standalone function
    Function,
    /// Package specification
    Package,
    /// Package body
    PackageBody,
    /// Trigger
    Trigger,
    /// Object type body
    TypeBody,
}

impl ObjectType {
    /// All instrumentable object types
    pub const ALL: [Self; 6] = [
        Self::Procedure,
        Self::Function,
        Self::Package,
        Self::PackageBody,
        Self::Trigger,
        Self::TypeBody,
    ];

    /// Data dictionary spelling (`PACKAGE BODY`, ...)
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Procedure => "PROCEDURE",
            Self::Function => "FUNCTION",
            Self::Package => "PACKAGE",
            Self::PackageBody => "PACKAGE BODY",
            Self::Trigger => "TRIGGER",
            Self::TypeBody => "TYPE BODY",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown object type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownObjectType(pub String);

impl fmt::Display for UnknownObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown object type '{}'", self.0)
    }
}

impl std::error::Error for UnknownObjectType {}

impl FromStr for ObjectType {
    type Err = UnknownObjectType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| UnknownObjectType(s.to_string()))
    }
}

/// Identity of a procedural object: (schema, name, type)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Owning schema
    pub schema: String,
    /// Object name
    pub name: String,
    /// Object type
    pub object_type: ObjectType,
}

impl ObjectId {
    /// Create a new object identity
    #[must_use]
    pub fn new(schema: impl Into<String>, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            object_type,
        }
    }

    /// `schema.name`, the string name patterns are matched against
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.schema, self.name, self.object_type)
    }
}

/// Source text of an object, kept with its line terminators
///
/// Joining [`Source::lines`] reproduces the text byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source {
    text: String,
}

impl Source {
    /// Wrap source text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Full text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Physical lines, terminators included
    #[must_use]
    pub fn lines(&self) -> Vec<&str> {
        self.text.split_inclusive('\n').collect()
    }

    /// Number of physical lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.text.split_inclusive('\n').count()
    }

    /// Hex SHA-256 of the text
    #[must_use]
    pub fn sha256_hex(&self) -> String {
        format!("{:x}", Sha256::digest(self.text.as_bytes()))
    }
}

/// Strip `\n` / `\r\n` from a physical line
#[must_use]
pub fn line_content(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// An object under instrumentation for the current run
#[derive(Debug, Clone)]
pub struct ProceduralObject {
    /// Identity
    pub id: ObjectId,
    /// Source as found before instrumentation
    pub original: Source,
    /// Source currently deployed
    pub instrumented: Source,
    /// Executable-line map built from `original`
    pub line_map: LineMap,
    /// When the instrumented version was deployed
    pub deployed_at: DateTime<Utc>,
}
