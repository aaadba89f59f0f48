//! Objects command handler

use super::{build_filter, load_profile};
use crate::commands::ObjectsArgs;
use crate::config::CliConfig;
use crate::error::{CliResult, ExitStatus};
use plspec::{CoverageConfig, CoverageEngine, ObjectId};
use std::io::Write;

/// Execute the objects command
pub fn execute_objects(_config: &CliConfig, args: &ObjectsArgs) -> CliResult<ExitStatus> {
    let db = load_profile(&args.connection)?.connect()?;
    let filter = build_filter(&args.selection, None)?;
    let engine = CoverageEngine::new(&db, &db, CoverageConfig::new(filter));
    let objects = engine.resolve()?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(render_objects(&objects, args.json)?.as_bytes())?;
    Ok(ExitStatus::Success)
}

/// One `SCHEMA.NAME TYPE` line per object, or a JSON array
pub fn render_objects(objects: &[ObjectId], json: bool) -> CliResult<String> {
    if json {
        let mut out = serde_json::to_string_pretty(objects)?;
        out.push('\n');
        return Ok(out);
    }
    Ok(objects
        .iter()
        .map(|id| format!("{}\t{}\n", id.qualified_name(), id.object_type))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use plspec::ObjectType;

    fn objects() -> Vec<ObjectId> {
        vec![
            ObjectId::new("HR", "PAYROLL", ObjectType::Package),
            ObjectId::new("HR", "PAYROLL", ObjectType::PackageBody),
        ]
    }

    #[test]
    fn test_text_listing() {
        let text = render_objects(&objects(), false).unwrap();
        assert_eq!(text, "HR.PAYROLL\tPACKAGE\nHR.PAYROLL\tPACKAGE BODY\n");
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(render_objects(&[], false).unwrap(), "");
    }

    #[test]
    fn test_json_listing_round_trips() {
        let json = render_objects(&objects(), true).unwrap();
        let parsed: Vec<ObjectId> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, objects());
    }
}
