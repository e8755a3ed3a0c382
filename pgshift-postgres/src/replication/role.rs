use pg_escape::{quote_identifier, quote_literal};

/// Creates a `LOGIN REPLICATION` role unless one with the same name exists.
///
/// The body runs in a `DO` block so that repeating it after a crashed bootstrap is a no-op.
pub fn create_replication_role_sql(role: &str, password: Option<&str>) -> String {
    let password_clause = match password {
        Some(password) => format!(" PASSWORD {}", quote_literal(password)),
        None => String::new(),
    };

    format!(
        "DO $pgshift$\nBEGIN\n  IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = {}) THEN\n    CREATE ROLE {} WITH LOGIN REPLICATION{password_clause};\n  END IF;\nEND\n$pgshift$;",
        quote_literal(role),
        quote_identifier(role)
    )
}

/// Read grants for one schema. `GRANT` is idempotent in Postgres.
pub fn grant_schema_read_sql(schema: &str, role: &str) -> Vec<String> {
    let schema = quote_identifier(schema);
    let role = quote_identifier(role);

    vec![
        format!("GRANT USAGE ON SCHEMA {schema} TO {role}"),
        format!("GRANT SELECT ON ALL TABLES IN SCHEMA {schema} TO {role}"),
    ]
}
