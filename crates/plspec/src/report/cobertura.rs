//! Cobertura XML
//!
//! One `<package>` per schema and one `<class>` per object. Only executable
//! lines are listed.

use super::escape_xml;
use crate::aggregate::{coverage_percent, CoverageSet, ObjectCoverage};
use crate::object::ObjectId;
use crate::result::PlspecResult;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Cobertura XML format report generator
#[derive(Debug)]
pub struct CoberturaFormatter<'a> {
    set: &'a CoverageSet,
    stems: &'a BTreeMap<ObjectId, String>,
}

impl<'a> CoberturaFormatter<'a> {
    /// Create a new Cobertura formatter
    #[must_use]
    pub fn new(set: &'a CoverageSet, stems: &'a BTreeMap<ObjectId, String>) -> Self {
        Self { set, stems }
    }

    fn rate(covered: usize, total: usize) -> f64 {
        coverage_percent(covered, total) / 100.0
    }

    /// Generate the XML document
    #[must_use]
    pub fn generate(&self) -> String {
        let summary = self.set.summary();

        let mut schemas: BTreeMap<&str, Vec<&ObjectCoverage>> = BTreeMap::new();
        for object in &self.set.objects {
            schemas.entry(object.id.schema.as_str()).or_default().push(object);
        }

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#,
        );
        xml.push('\n');
        let _ = writeln!(
            xml,
            r#"<coverage line-rate="{:.4}" branch-rate="0" lines-covered="{}" lines-valid="{}" version="{}">"#,
            Self::rate(summary.covered_lines, summary.executable_lines),
            summary.covered_lines,
            summary.executable_lines,
            escape_xml(env!("CARGO_PKG_VERSION")),
        );
        xml.push_str("  <packages>\n");

        for (schema, objects) in &schemas {
            let covered: usize = objects.iter().map(|o| o.covered_lines()).sum();
            let total: usize = objects.iter().map(|o| o.executable_lines()).sum();
            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
                escape_xml(schema),
                Self::rate(covered, total)
            );
            xml.push_str("      <classes>\n");

            for object in objects {
                let filename = self
                    .stems
                    .get(&object.id)
                    .map_or_else(|| object.id.qualified_name(), Clone::clone);
                let _ = writeln!(
                    xml,
                    r#"        <class name="{}" filename="{}.sql" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
                    escape_xml(&format!("{}.{}", object.id.name, object.id.object_type)),
                    escape_xml(&filename),
                    Self::rate(object.covered_lines(), object.executable_lines())
                );
                xml.push_str("          <lines>\n");
                for line in &object.lines {
                    if let Some(hits) = line.hits {
                        let _ = writeln!(
                            xml,
                            r#"            <line number="{}" hits="{}"/>"#,
                            line.number, hits
                        );
                    }
                }
                xml.push_str("          </lines>\n");
                xml.push_str("        </class>\n");
            }

            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }

        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");
        xml
    }

    /// Save the XML report to a file
    pub fn save(&self, path: &Path) -> PlspecResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }
}
