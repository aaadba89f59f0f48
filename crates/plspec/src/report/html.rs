//! HTML index and per-object detail pages

use super::{escape_xml, INDEX_FILE};
use crate::aggregate::{CoverageSet, ObjectCoverage};
use crate::object::ObjectId;
use crate::result::PlspecResult;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

const STYLE: &str = r#"    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }
        table { border-collapse: collapse; }
        th, td { padding: 4px 10px; text-align: left; }
        table.index tbody tr:nth-child(odd) { background: #f5f5f5; }
        table.index tfoot td { font-weight: bold; border-top: 2px solid #999; }
        td.number, td.percent { text-align: right; }
        tr.unavailable td { color: #888; font-style: italic; }
        table.source { font-family: monospace; width: 100%; }
        table.source td { padding: 0 8px; }
        table.source td.line, table.source td.hits { text-align: right; color: #666; }
        table.source pre { margin: 0; }
        tr.covered { background: #e8f5e9; }
        tr.uncovered { background: #ffebee; }
        tr.non-executable { background: #fff; }
    </style>
"#;

fn head(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{}</title>
{}</head>
<body>
"#,
        escape_xml(title),
        STYLE
    )
}

const FOOT: &str = "</body>\n</html>\n";

enum IndexRow<'a> {
    Available(&'a ObjectCoverage),
    Unavailable,
}

/// Renders HTML pages for a [`CoverageSet`]
#[derive(Debug)]
pub struct HtmlFormatter<'a> {
    set: &'a CoverageSet,
    stems: &'a BTreeMap<ObjectId, String>,
    title: String,
}

impl<'a> HtmlFormatter<'a> {
    /// Create a formatter; `stems` maps objects to detail file stems
    #[must_use]
    pub fn new(set: &'a CoverageSet, stems: &'a BTreeMap<ObjectId, String>) -> Self {
        Self {
            set,
            stems,
            title: "PL/SQL Coverage".to_string(),
        }
    }

    /// Render the index page
    #[must_use]
    pub fn render_index(&self) -> String {
        let mut rows: BTreeMap<&ObjectId, IndexRow<'_>> = BTreeMap::new();
        for object in &self.set.objects {
            rows.insert(&object.id, IndexRow::Available(object));
        }
        for unavailable in &self.set.unavailable {
            rows.insert(&unavailable.id, IndexRow::Unavailable);
        }

        let mut html = head(&self.title);
        let _ = writeln!(html, "<h1>{}</h1>", escape_xml(&self.title));
        html.push_str("<table class=\"index\">\n");
        html.push_str(
            "<thead><tr><th>Object</th><th>Type</th><th>Lines</th><th>Covered</th><th>Coverage</th></tr></thead>\n",
        );
        html.push_str("<tbody>\n");

        for (id, row) in rows {
            let name = escape_xml(&id.qualified_name());
            match row {
                IndexRow::Available(object) => {
                    let link = self.stems.get(id).map_or_else(
                        || name.clone(),
                        |stem| format!("<a href=\"{}.html\">{}</a>", escape_xml(stem), name),
                    );
                    let _ = writeln!(
                        html,
                        "<tr><td>{}</td><td>{}</td><td class=\"number\">{}</td><td class=\"number\">{}</td><td class=\"percent\">{:.2}%</td></tr>",
                        link,
                        id.object_type,
                        object.executable_lines(),
                        object.covered_lines(),
                        object.percentage()
                    );
                }
                IndexRow::Unavailable => {
                    let _ = writeln!(
                        html,
                        "<tr class=\"unavailable\"><td>{}</td><td>{}</td><td colspan=\"3\">unavailable</td></tr>",
                        name, id.object_type
                    );
                }
            }
        }
        html.push_str("</tbody>\n");

        let summary = self.set.summary();
        let _ = writeln!(
            html,
            "<tfoot><tr><td>Total</td><td>{} objects</td><td class=\"number\">{}</td><td class=\"number\">{}</td><td class=\"percent\">{:.2}%</td></tr></tfoot>",
            summary.objects, summary.executable_lines, summary.covered_lines, summary.coverage_percent
        );
        html.push_str("</table>\n");
        html.push_str(FOOT);
        html
    }

    /// Render the detail page of one object
    #[must_use]
    pub fn render_detail(&self, object: &ObjectCoverage) -> String {
        let title = object.id.to_string();
        let mut html = head(&title);
        let _ = writeln!(html, "<h1>{}</h1>", escape_xml(&title));
        let _ = writeln!(
            html,
            "<p>{} of {} lines covered ({:.2}%)</p>",
            object.covered_lines(),
            object.executable_lines(),
            object.percentage()
        );
        html.push_str("<table class=\"source\">\n");

        for line in &object.lines {
            let hits = line.hits.map(|h| h.to_string()).unwrap_or_default();
            let _ = writeln!(
                html,
                "<tr class=\"{}\"><td class=\"line\">{}</td><td class=\"hits\">{}</td><td class=\"code\"><pre>{}</pre></td></tr>",
                line.class.as_str(),
                line.number,
                hits,
                escape_xml(&line.text)
            );
        }

        html.push_str("</table>\n");
        let _ = writeln!(html, "<p><a href=\"{INDEX_FILE}\">Back to index</a></p>");
        html.push_str(FOOT);
        html
    }

    /// Write the index page
    pub fn save_index(&self, path: &Path) -> PlspecResult<()> {
        std::fs::write(path, self.render_index())?;
        Ok(())
    }

    /// Write the detail page of one object
    pub fn save_detail(&self, object: &ObjectCoverage, path: &Path) -> PlspecResult<()> {
        std::fs::write(path, self.render_detail(object))?;
        Ok(())
    }
}
