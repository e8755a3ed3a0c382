use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Tables never dumped nor published: PostGIS reference data maintained by the extension.
pub const DEFAULT_EXCLUDED_TABLES: &[&str] = &["public.spatial_ref_sys"];

/// Schemas that the dump never scopes to even when the catalog lists them.
pub const DEFAULT_METADATA_SCHEMAS: &[&str] = &["information_schema"];

/// Settings of the external `pg_dump` invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Path or name of the `pg_dump` executable.
    #[serde(default = "default_pg_dump_path")]
    pub pg_dump_path: String,
    /// Qualified table names passed as `--exclude-table`.
    #[serde(default = "default_excluded_tables")]
    pub excluded_tables: Vec<String>,
    #[serde(default = "default_metadata_schemas")]
    pub metadata_schemas: Vec<String>,
    /// Adds `--no-owner` so restored objects belong to the target's administrative role.
    #[serde(default)]
    pub no_owner: bool,
}

fn default_pg_dump_path() -> String {
    "pg_dump".to_string()
}

fn default_excluded_tables() -> Vec<String> {
    DEFAULT_EXCLUDED_TABLES.iter().map(|t| t.to_string()).collect()
}

fn default_metadata_schemas() -> Vec<String> {
    DEFAULT_METADATA_SCHEMAS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            pg_dump_path: default_pg_dump_path(),
            excluded_tables: default_excluded_tables(),
            metadata_schemas: default_metadata_schemas(),
            no_owner: false,
        }
    }
}

impl DumpConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pg_dump_path.trim().is_empty() {
            return Err(ValidationError::EmptyPgDumpPath);
        }

        Ok(())
    }

    /// Bare table names of [`DumpConfig::excluded_tables`], as they appear in catalog views.
    pub fn excluded_table_names(&self) -> Vec<&str> {
        self.excluded_tables
            .iter()
            .map(|qualified| {
                qualified
                    .rsplit_once('.')
                    .map(|(_, table)| table)
                    .unwrap_or(qualified.as_str())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_table_names_drop_the_schema() {
        let config = DumpConfig {
            excluded_tables: vec!["public.spatial_ref_sys".into(), "audit_log".into()],
            ..DumpConfig::default()
        };

        assert_eq!(config.excluded_table_names(), vec!["spatial_ref_sys", "audit_log"]);
    }
}
