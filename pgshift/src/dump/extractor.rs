use std::process::Stdio;

use pgshift_config::shared::{ConnectionTarget, DumpConfig};
use pgshift_postgres::catalog::dump_schema_pattern;
use tokio::process::Command;
use tracing::{info, warn};

use crate::catalog::SchemaSet;
use crate::dump::document::{DumpDocument, DumpSection};
use crate::error::{ErrorKind, MigrateResult};
use crate::{bail, migrate_error};

/// Produces a plain SQL dump of one section of the source, scoped to a schema set.
#[async_trait::async_trait]
pub trait DumpExtractor: Send + Sync {
    async fn dump(
        &self,
        source: &ConnectionTarget,
        schemas: &SchemaSet,
        section: DumpSection,
    ) -> MigrateResult<DumpDocument>;
}

/// [`DumpExtractor`] running the `pg_dump` binary and reading its output to the end.
#[derive(Debug, Clone)]
pub struct PgDumpExtractor {
    config: DumpConfig,
}

impl PgDumpExtractor {
    pub fn new(config: DumpConfig) -> Self {
        Self { config }
    }

    /// Command line passed to `pg_dump`, connection string included.
    ///
    /// Fails when `schemas` holds no user schema: without a `-n` flag `pg_dump` would dump
    /// every schema of the database.
    pub fn arguments(
        &self,
        source: &ConnectionTarget,
        schemas: &SchemaSet,
        section: DumpSection,
    ) -> MigrateResult<Vec<String>> {
        let patterns = schemas
            .user_schemas(&self.config.metadata_schemas)
            .map(|schema| dump_schema_pattern(schema))
            .collect::<Vec<_>>();
        if patterns.is_empty() {
            bail!(
                ErrorKind::NoEligibleSchemas,
                "No schema left to dump",
                format!("section {section}, schemas: {:?}", schemas.names())
            );
        }

        let mut args = vec![
            "-d".to_string(),
            source.connection_string().to_string(),
            "--format=p".to_string(),
            "--no-acl".to_string(),
        ];

        if self.config.no_owner {
            args.push("--no-owner".to_string());
        }

        for table in &self.config.excluded_tables {
            args.push(format!("--exclude-table={table}"));
        }

        for pattern in patterns {
            args.push("-n".to_string());
            args.push(pattern);
        }

        args.push(format!("--section={section}"));

        Ok(args)
    }
}

#[async_trait::async_trait]
impl DumpExtractor for PgDumpExtractor {
    async fn dump(
        &self,
        source: &ConnectionTarget,
        schemas: &SchemaSet,
        section: DumpSection,
    ) -> MigrateResult<DumpDocument> {
        let args = self.arguments(source, schemas, section)?;
        info!(%section, endpoint = %source, schemas = ?schemas.names(), "running pg_dump");

        let output = Command::new(&self.config.pg_dump_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                migrate_error!(
                    ErrorKind::DumpFailed,
                    "Failed to start pg_dump",
                    format!("{}: {err}", self.config.pg_dump_path),
                    source: err
                )
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(
                ErrorKind::DumpFailed,
                "pg_dump exited with an error",
                format!("section {section}, {}: {}", output.status, stderr.trim())
            );
        }
        if !stderr.trim().is_empty() {
            warn!(%section, stderr = %stderr.trim(), "pg_dump reported warnings");
        }

        let text = String::from_utf8(output.stdout)?;
        let document = DumpDocument::from_text(&text);

        info!(%section, lines = document.len(), "pg_dump finished");

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use pgshift_config::shared::DumpConfig;

    use super::*;

    fn schemas() -> SchemaSet {
        SchemaSet::new(
            vec![
                "information_schema".to_string(),
                "included".to_string(),
                "public".to_string(),
            ],
            None,
        )
    }

    #[test]
    fn arguments_scope_the_dump_to_eligible_schemas() {
        let extractor = PgDumpExtractor::new(DumpConfig::default());
        let source = ConnectionTarget::new("host=source dbname=db_primary", "db_primary");

        let args = extractor
            .arguments(&source, &schemas(), DumpSection::PreData)
            .unwrap();

        assert_eq!(
            args,
            vec![
                "-d",
                "host=source dbname=db_primary",
                "--format=p",
                "--no-acl",
                "--exclude-table=public.spatial_ref_sys",
                "-n",
                "included",
                "-n",
                "public",
                "--section=pre-data",
            ]
        );
    }

    #[test]
    fn no_owner_is_opt_in() {
        let config = DumpConfig {
            no_owner: true,
            excluded_tables: vec![],
            ..DumpConfig::default()
        };
        let extractor = PgDumpExtractor::new(config);
        let source = ConnectionTarget::new("host=source", "db_primary");

        let args = extractor
            .arguments(&source, &schemas(), DumpSection::PostData)
            .unwrap();

        assert!(args.contains(&"--no-owner".to_string()));
        assert!(!args.iter().any(|arg| arg.starts_with("--exclude-table")));
        assert_eq!(args.last().map(String::as_str), Some("--section=post-data"));
    }

    #[test]
    fn schema_patterns_are_quoted_when_case_matters() {
        let extractor = PgDumpExtractor::new(DumpConfig::default());
        let source = ConnectionTarget::new("host=source", "db_primary");
        let schemas = SchemaSet::new(vec!["Sales".to_string(), "public".to_string()], None);

        let args = extractor
            .arguments(&source, &schemas, DumpSection::PreData)
            .unwrap();

        let patterns = args
            .windows(2)
            .filter(|pair| pair[0] == "-n")
            .map(|pair| pair[1].as_str())
            .collect::<Vec<_>>();
        assert_eq!(patterns, vec!["\"Sales\"", "public"]);
    }

    #[tokio::test]
    async fn only_metadata_schemas_are_never_dumped() {
        let extractor = PgDumpExtractor::new(DumpConfig::default());
        let source = ConnectionTarget::new("host=source", "db_primary");
        let excluded = vec![
            "public".to_string(),
            "included".to_string(),
            "excluded".to_string(),
        ];
        let schemas = SchemaSet::new(
            vec![
                "information_schema".to_string(),
                "public".to_string(),
                "included".to_string(),
                "excluded".to_string(),
            ],
            Some(&excluded),
        );

        let err = extractor
            .arguments(&source, &schemas, DumpSection::PreData)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEligibleSchemas);

        let err = extractor
            .dump(&source, &schemas, DumpSection::PreData)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoEligibleSchemas);
    }

    #[tokio::test]
    async fn missing_binary_is_a_dump_failure() {
        let config = DumpConfig {
            pg_dump_path: "/nonexistent/pg_dump".to_string(),
            ..DumpConfig::default()
        };
        let extractor = PgDumpExtractor::new(config);
        let source = ConnectionTarget::new("host=source", "db_primary");

        let err = extractor
            .dump(&source, &schemas(), DumpSection::PreData)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DumpFailed);
    }
}
