use crate::dump::DumpDocument;

/// Statement emitted by `pg_dump` for the `public` schema, which the target already has.
const PUBLIC_SCHEMA_CREATE: &str = "CREATE SCHEMA public;";

/// Removes `CREATE SCHEMA public;` from a pre-data dump.
pub fn strip_schema_create(document: &DumpDocument) -> DumpDocument {
    let lines = document
        .lines()
        .iter()
        .map(|line| line.replace(PUBLIC_SCHEMA_CREATE, ""))
        .collect();

    DumpDocument::from_lines(lines)
}

/// Removes the `\restrict` and `\unrestrict` psql meta-commands recent `pg_dump` versions emit.
///
/// Anything before the marker on the same line is kept.
pub fn strip_restrict_markers(document: &DumpDocument) -> DumpDocument {
    let lines = document
        .lines()
        .iter()
        .filter_map(|line| match find_marker(line) {
            Some(0) => None,
            Some(index) => Some(line[..index].to_string()),
            None => Some(line.clone()),
        })
        .collect();

    DumpDocument::from_lines(lines)
}

fn find_marker(line: &str) -> Option<usize> {
    [r"\restrict", r"\unrestrict"]
        .iter()
        .filter_map(|marker| line.find(marker))
        .min()
}
