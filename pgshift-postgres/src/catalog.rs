//! Catalog probes issued against the source database.

use pg_escape::{quote_identifier, quote_literal};

/// Renders an exclusion list as a comma separated list of SQL literals.
///
/// Returns an empty string when there is nothing to exclude, so callers can test the clause for
/// emptiness before appending a `NOT IN (...)` predicate.
pub fn excluded_schema_clause(excluded_schemas: Option<&[String]>) -> String {
    match excluded_schemas {
        Some(schemas) => literal_list(schemas),
        None => String::new(),
    }
}

fn literal_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|value| quote_literal(value.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Lists every non-system schema, minus the ones named in `excluded_clause`.
///
/// The exclusion variant keeps its trailing semicolon, the probe has always been issued that way.
pub fn schema_listing_query(excluded_clause: &str) -> String {
    let base = "SELECT schema_name FROM information_schema.schemata WHERE schema_name NOT ILIKE 'pg_%'";
    if excluded_clause.is_empty() {
        base.to_string()
    } else {
        format!("{base} AND schema_name NOT IN ({excluded_clause});")
    }
}

pub fn database_size_query(database: &str) -> String {
    format!(
        "SELECT pg_size_pretty(pg_database_size({}))",
        quote_literal(database)
    )
}

pub fn user_table_count_query() -> &'static str {
    "SELECT count(*) from pg_stat_user_tables"
}

/// Lists `(schemaname, tablename)` pairs that belong in the publication.
pub fn eligible_tables_query(
    excluded_clause: &str,
    metadata_schemas: &[String],
    excluded_table_names: &[String],
) -> String {
    let mut query = String::from(
        "SELECT schemaname, tablename FROM pg_tables WHERE schemaname NOT ILIKE 'pg_%'",
    );

    if !metadata_schemas.is_empty() {
        query.push_str(&format!(
            " AND schemaname NOT IN ({})",
            literal_list(metadata_schemas)
        ));
    }
    if !excluded_table_names.is_empty() {
        query.push_str(&format!(
            " AND tablename NOT IN ({})",
            literal_list(excluded_table_names)
        ));
    }
    if !excluded_clause.is_empty() {
        query.push_str(&format!(" AND schemaname NOT IN ({excluded_clause})"));
    }

    query.push_str(" ORDER BY schemaname, tablename");
    query
}

/// Renders `schema` as a `pg_dump --schema` pattern that matches exactly that schema.
///
/// `pg_dump` folds unquoted patterns to lower case and treats `*`, `?` and `.` as pattern
/// syntax, so anything that is not a plain lower-case identifier is double-quoted.
pub fn dump_schema_pattern(schema: &str) -> String {
    quote_identifier(schema).into_owned()
}
