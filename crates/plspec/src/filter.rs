//! Run filter: which objects a coverage run instruments, and where it reports.

use crate::object::ObjectId;
use crate::result::{CoverageError, PlspecResult};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Default report directory, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "coverage";

/// Case-insensitive whole-string glob over `schema.object`
///
/// `%` and `*` match zero or more characters, `_` and `?` match exactly one.
/// Every other character is literal.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    /// Compile a pattern
    pub fn new(pattern: &str) -> PlspecResult<Self> {
        let mut expr = String::from("(?is)^");
        let mut literal = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '%' | '*' => expr.push_str(".*"),
                '_' | '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut literal))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| CoverageError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match against a qualified name
    #[must_use]
    pub fn matches(&self, qualified_name: &str) -> bool {
        self.regex.is_match(qualified_name)
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Configuration for one coverage run
#[derive(Debug, Clone, PartialEq)]
pub struct RunFilter {
    ignored_schemas: BTreeSet<String>,
    patterns: Vec<NamePattern>,
    output_dir: PathBuf,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            ignored_schemas: BTreeSet::new(),
            patterns: Vec::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl RunFilter {
    /// Create a filter that admits every object
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder
    #[must_use]
    pub fn builder() -> RunFilterBuilder {
        RunFilterBuilder::default()
    }

    /// Ignored schemas, uppercased
    #[must_use]
    pub fn ignored_schemas(&self) -> &BTreeSet<String> {
        &self.ignored_schemas
    }

    /// Inclusion patterns
    #[must_use]
    pub fn patterns(&self) -> &[NamePattern] {
        &self.patterns
    }

    /// Report directory
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Whether the schema is on the ignore list
    #[must_use]
    pub fn is_ignored_schema(&self, schema: &str) -> bool {
        self.ignored_schemas.contains(&schema.to_uppercase())
    }

    /// Whether an object passes both the schema and the name rules
    #[must_use]
    pub fn admits(&self, id: &ObjectId) -> bool {
        if self.is_ignored_schema(&id.schema) {
            return false;
        }
        if self.patterns.is_empty() {
            return true;
        }
        let qualified = id.qualified_name();
        self.patterns.iter().any(|p| p.matches(&qualified))
    }
}

/// Builder for [`RunFilter`]
#[derive(Debug, Default)]
pub struct RunFilterBuilder {
    ignored_schemas: Vec<String>,
    patterns: Vec<String>,
    output_dir: Option<PathBuf>,
}

impl RunFilterBuilder {
    /// Ignore a schema
    #[must_use]
    pub fn ignore_schema(mut self, schema: impl Into<String>) -> Self {
        self.ignored_schemas.push(schema.into());
        self
    }

    /// Ignore several schemas
    #[must_use]
    pub fn ignore_schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_schemas
            .extend(schemas.into_iter().map(Into::into));
        self
    }

    /// Add an inclusion pattern
    #[must_use]
    pub fn like(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add several inclusion patterns
    #[must_use]
    pub fn like_any<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Set the report directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Build the filter, compiling patterns
    ///
    /// Blank schema names and blank patterns are dropped.
    pub fn build(self) -> PlspecResult<RunFilter> {
        let ignored_schemas = self
            .ignored_schemas
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let patterns = self
            .patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(NamePattern::new)
            .collect::<PlspecResult<Vec<_>>>()?;

        Ok(RunFilter {
            ignored_schemas,
            patterns,
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
        })
    }
}
