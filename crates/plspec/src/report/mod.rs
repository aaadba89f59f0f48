//! Report rendering: HTML index and detail pages, LCOV and Cobertura XML.
//!
//! Rendering is pure. Given the same [`CoverageSet`] every writer produces
//! byte-identical files: no timestamps, stable ordering.

mod cobertura;
mod html;
mod lcov;

pub use cobertura::CoberturaFormatter;
pub use html::HtmlFormatter;
pub use lcov::LcovFormatter;

use crate::aggregate::CoverageSet;
use crate::object::ObjectId;
use crate::result::PlspecResult;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the HTML index page
pub const INDEX_FILE: &str = "index.html";

/// Name of the LCOV trace file
pub const LCOV_FILE: &str = "lcov.info";

/// Name of the Cobertura XML file
pub const COBERTURA_FILE: &str = "cobertura.xml";

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReportFormat {
    /// Index page plus one detail page per object
    Html,
    /// LCOV trace file
    Lcov,
    /// Cobertura XML
    Cobertura,
}

impl ReportFormat {
    /// Lowercase name used on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Lcov => "lcov",
            Self::Cobertura => "cobertura",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "lcov" => Ok(Self::Lcov),
            "cobertura" | "xml" => Ok(Self::Cobertura),
            other => Err(format!("unknown report format '{other}'")),
        }
    }
}

fn sanitize(part: &str) -> String {
    part.to_uppercase()
        .chars()
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '_' | '$' | '#') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File stems for detail pages, unique within one report
///
/// The stem is `SCHEMA-NAME`. Objects sharing a stem get `-TYPE` appended,
/// and any clash left after that gets `-2`, `-3`, ... in identity order.
#[must_use]
pub fn detail_stems<'a, I>(ids: I) -> BTreeMap<ObjectId, String>
where
    I: IntoIterator<Item = &'a ObjectId>,
{
    let ids: BTreeSet<&ObjectId> = ids.into_iter().collect();

    let mut bases: BTreeMap<String, usize> = BTreeMap::new();
    let base_of = |id: &ObjectId| format!("{}-{}", sanitize(&id.schema), sanitize(&id.name));
    for id in &ids {
        *bases.entry(base_of(id)).or_insert(0) += 1;
    }

    let mut used = BTreeSet::new();
    let mut stems = BTreeMap::new();
    for id in ids {
        let base = base_of(id);
        let mut stem = if bases.get(&base).copied().unwrap_or(0) > 1 {
            format!("{base}-{}", sanitize(id.object_type.as_str()))
        } else {
            base
        };
        if used.contains(&stem) {
            let mut n = 2;
            while used.contains(&format!("{stem}-{n}")) {
                n += 1;
            }
            stem = format!("{stem}-{n}");
        }
        used.insert(stem.clone());
        stems.insert(id.clone(), stem);
    }
    stems
}

/// Writes the selected report formats into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    formats: BTreeSet<ReportFormat>,
}

impl ReportWriter {
    /// Create a writer producing HTML only
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            formats: BTreeSet::from([ReportFormat::Html]),
        }
    }

    /// Replace the set of formats; an empty set falls back to HTML
    #[must_use]
    pub fn with_formats<I: IntoIterator<Item = ReportFormat>>(mut self, formats: I) -> Self {
        self.formats = formats.into_iter().collect();
        if self.formats.is_empty() {
            self.formats.insert(ReportFormat::Html);
        }
        self
    }

    /// Output directory
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Selected formats
    #[must_use]
    pub fn formats(&self) -> &BTreeSet<ReportFormat> {
        &self.formats
    }

    /// Write every selected format, creating the directory if missing
    ///
    /// Returns the written paths in a stable order.
    pub fn write(&self, set: &CoverageSet) -> PlspecResult<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir)?;
        let stems = detail_stems(set.objects.iter().map(|o| &o.id));
        let mut written = Vec::new();

        for format in &self.formats {
            match format {
                ReportFormat::Html => {
                    let html = HtmlFormatter::new(set, &stems);
                    let index = self.output_dir.join(INDEX_FILE);
                    html.save_index(&index)?;
                    written.push(index);
                    for object in &set.objects {
                        if let Some(stem) = stems.get(&object.id) {
                            let path = self.output_dir.join(format!("{stem}.html"));
                            html.save_detail(object, &path)?;
                            written.push(path);
                        }
                    }
                }
                ReportFormat::Lcov => {
                    let path = self.output_dir.join(LCOV_FILE);
                    LcovFormatter::new(set, &stems).save(&path)?;
                    written.push(path);
                }
                ReportFormat::Cobertura => {
                    let path = self.output_dir.join(COBERTURA_FILE);
                    CoberturaFormatter::new(set, &stems).save(&path)?;
                    written.push(path);
                }
            }
        }

        tracing::info!(
            dir = %self.output_dir.display(),
            files = written.len(),
            "coverage reports written"
        );
        Ok(written)
    }
}

/// Escape text for HTML and XML
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    fn stems_of(ids: &[ObjectId]) -> Vec<String> {
        let stems = detail_stems(ids);
        ids.iter().map(|id| stems[id].clone()).collect()
    }

    #[test]
    fn test_plain_stem() {
        let ids = [ObjectId::new("HR", "TEST_PROFILER", ObjectType::Function)];
        assert_eq!(stems_of(&ids), vec!["HR-TEST_PROFILER"]);
    }

    #[test]
    fn test_stem_sanitizes_and_uppercases() {
        let ids = [ObjectId::new("hr", "my pkg/v2$", ObjectType::Package)];
        assert_eq!(stems_of(&ids), vec!["HR-MY_PKG_V2$"]);
    }

    #[test]
    fn test_package_and_body_get_type_suffix() {
        let ids = [
            ObjectId::new("HR", "PAY", ObjectType::Package),
            ObjectId::new("HR", "PAY", ObjectType::PackageBody),
            ObjectId::new("HR", "AUDIT", ObjectType::Trigger),
        ];
        assert_eq!(
            stems_of(&ids),
            vec!["HR-PAY-PACKAGE", "HR-PAY-PACKAGE_BODY", "HR-AUDIT"]
        );
    }

    #[test]
    fn test_remaining_clash_gets_counter() {
        let ids = [
            ObjectId::new("HR", "A B", ObjectType::Function),
            ObjectId::new("HR", "A_B", ObjectType::Function),
        ];
        assert_eq!(stems_of(&ids), vec!["HR-A_B-FUNCTION", "HR-A_B-FUNCTION-2"]);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("HTML".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert_eq!(" lcov ".parse::<ReportFormat>().unwrap(), ReportFormat::Lcov);
        assert_eq!("cobertura".parse::<ReportFormat>().unwrap(), ReportFormat::Cobertura);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_empty_format_set_falls_back_to_html() {
        let writer = ReportWriter::new("out").with_formats([]);
        assert!(writer.formats().contains(&ReportFormat::Html));
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("coverage");
        let files = ReportWriter::new(&out)
            .with_formats([ReportFormat::Html, ReportFormat::Lcov, ReportFormat::Cobertura])
            .write(&CoverageSet::default())
            .unwrap();
        assert_eq!(
            files,
            vec![out.join(INDEX_FILE), out.join(LCOV_FILE), out.join(COBERTURA_FILE)]
        );
        assert!(out.join(INDEX_FILE).exists());
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape_xml("a < b && 'c' > \"d\""), "a &lt; b &amp;&amp; &#39;c&#39; &gt; &quot;d&quot;");
    }
}
