//! LCOV trace file
//!
//! ```text
//! TN:<test name>
//! SF:<SCHEMA-NAME>.sql
//! DA:<line>,<execution count>
//! LF:<lines found>
//! LH:<lines hit>
//! end_of_record
//! ```
//!
//! Only executable lines get a `DA` record.

use crate::aggregate::CoverageSet;
use crate::object::ObjectId;
use crate::result::PlspecResult;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Value of the `TN` record
const TEST_NAME: &str = "plspec";

/// LCOV format report generator
#[derive(Debug)]
pub struct LcovFormatter<'a> {
    set: &'a CoverageSet,
    stems: &'a BTreeMap<ObjectId, String>,
}

impl<'a> LcovFormatter<'a> {
    /// Create a new LCOV formatter
    #[must_use]
    pub fn new(set: &'a CoverageSet, stems: &'a BTreeMap<ObjectId, String>) -> Self {
        Self { set, stems }
    }

    /// Generate the LCOV text
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "TN:{TEST_NAME}");

        for object in &self.set.objects {
            let file = self
                .stems
                .get(&object.id)
                .cloned()
                .unwrap_or_else(|| object.id.qualified_name());
            let _ = writeln!(output, "SF:{file}.sql");

            let mut found = 0;
            let mut hit = 0;
            for line in &object.lines {
                if let Some(count) = line.hits {
                    let _ = writeln!(output, "DA:{},{}", line.number, count);
                    found += 1;
                    if count > 0 {
                        hit += 1;
                    }
                }
            }

            let _ = writeln!(output, "LF:{found}");
            let _ = writeln!(output, "LH:{hit}");
            output.push_str("end_of_record\n");
        }

        output
    }

    /// Save the LCOV report to a file
    pub fn save(&self, path: &Path) -> PlspecResult<()> {
        std::fs::write(path, self.generate())?;
        Ok(())
    }
}
