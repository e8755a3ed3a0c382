//! Inspection of the source database before a migration starts.

use pgshift_postgres::catalog::{
    database_size_query, excluded_schema_clause, schema_listing_query, user_table_count_query,
};
use tracing::{info, warn};

use crate::error::MigrateResult;
use crate::gateway::{QueryRows, SqlGateway};

/// Facts about the source database gathered at startup.
///
/// Every field is `None` when its probe failed or returned no row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbInfos {
    pub schemas: Option<Vec<String>>,
    /// Human readable size, as rendered by `pg_size_pretty`.
    pub size: Option<String>,
    pub tables: Option<i64>,
    /// Exclusion list rendered as SQL literals, empty when nothing is excluded.
    pub excluded_clause: String,
}

/// Schemas taking part in a migration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaSet {
    schemas: Vec<String>,
    excluded_clause: String,
}

impl SchemaSet {
    /// Keeps the `candidates` not named in `excluded_schemas`, in their original order.
    pub fn new(candidates: Vec<String>, excluded_schemas: Option<&[String]>) -> Self {
        let excluded = excluded_schemas.unwrap_or_default();
        let mut schemas: Vec<String> = Vec::with_capacity(candidates.len());
        for schema in candidates {
            if excluded.contains(&schema) || schemas.contains(&schema) {
                continue;
            }
            schemas.push(schema);
        }

        Self {
            schemas,
            excluded_clause: excluded_schema_clause(excluded_schemas),
        }
    }

    pub fn from_db_infos(infos: &DbInfos, excluded_schemas: Option<&[String]>) -> Self {
        Self::new(infos.schemas.clone().unwrap_or_default(), excluded_schemas)
    }

    pub fn names(&self) -> &[String] {
        &self.schemas
    }

    /// Schemas that hold user data, i.e. everything but `metadata_schemas`.
    pub fn user_schemas<'a>(
        &'a self,
        metadata_schemas: &'a [String],
    ) -> impl Iterator<Item = &'a String> + 'a {
        self.schemas
            .iter()
            .filter(move |schema| !metadata_schemas.contains(schema))
    }

    pub fn excluded_clause(&self) -> &str {
        &self.excluded_clause
    }

    pub fn contains(&self, schema: &str) -> bool {
        self.schemas.iter().any(|s| s == schema)
    }
}

/// Read-only probes against the source catalog.
#[derive(Debug)]
pub struct SourceCatalog<'a, G> {
    gateway: &'a G,
}

impl<'a, G> SourceCatalog<'a, G>
where
    G: SqlGateway,
{
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Lists eligible schemas and measures the database.
    pub async fn retrieve_db_infos(
        &self,
        excluded_schemas: Option<&[String]>,
    ) -> MigrateResult<DbInfos> {
        let excluded_clause = excluded_schema_clause(excluded_schemas);
        let database = &self.gateway.target().database;

        let rows = self
            .gateway
            .execute_query(&schema_listing_query(&excluded_clause), true)
            .await?;
        let schemas = first_value(&rows).map(|_| {
            rows.iter()
                .flatten()
                .filter_map(|row| row.get(0).map(str::to_owned))
                .collect::<Vec<_>>()
        });

        let rows = self
            .gateway
            .execute_query(&database_size_query(database), true)
            .await?;
        let size = first_value(&rows).map(str::to_owned);

        let rows = self
            .gateway
            .execute_query(user_table_count_query(), true)
            .await?;
        let tables = first_value(&rows).and_then(|count| match count.parse::<i64>() {
            Ok(count) => Some(count),
            Err(err) => {
                warn!(value = count, error = %err, "unexpected table count");
                None
            }
        });

        info!(
            database = %database,
            size = size.as_deref().unwrap_or("unknown"),
            tables = ?tables,
            schemas = ?schemas,
            "source database inspected"
        );

        Ok(DbInfos {
            schemas,
            size,
            tables,
            excluded_clause,
        })
    }
}

/// First column of the first row, if the query succeeded and returned one.
fn first_value(rows: &Option<QueryRows>) -> Option<&str> {
    rows.as_ref()?.first()?.get(0)
}

#[cfg(test)]
mod tests {
    use pgshift_config::shared::ConnectionTarget;

    use super::*;
    use crate::test_utils::gateway::StubGateway;

    fn source() -> StubGateway {
        StubGateway::new(ConnectionTarget::new("host=source", "db_primary"))
    }

    #[tokio::test]
    async fn infos_without_exclusions() {
        let gateway = source();
        gateway.respond(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name NOT ILIKE 'pg_%'",
            vec![vec!["public"], vec!["included"], vec!["excluded"]],
        );
        gateway.respond(
            "SELECT pg_size_pretty(pg_database_size('db_primary'))",
            vec![vec!["7937 kB"]],
        );
        gateway.respond("SELECT count(*) from pg_stat_user_tables", vec![vec!["3"]]);

        let infos = SourceCatalog::new(&gateway)
            .retrieve_db_infos(None)
            .await
            .unwrap();

        assert_eq!(
            infos,
            DbInfos {
                schemas: Some(vec![
                    "public".to_string(),
                    "included".to_string(),
                    "excluded".to_string()
                ]),
                size: Some("7937 kB".to_string()),
                tables: Some(3),
                excluded_clause: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn exclusions_reach_the_schema_query() {
        let gateway = source();
        gateway.respond(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name NOT ILIKE 'pg_%' AND schema_name NOT IN ('a','b');",
            vec![vec!["public"]],
        );
        gateway.respond(
            "SELECT pg_size_pretty(pg_database_size('db_primary'))",
            vec![],
        );
        gateway.fail("SELECT count(*) from pg_stat_user_tables");

        let excluded = vec!["a".to_string(), "b".to_string()];
        let infos = SourceCatalog::new(&gateway)
            .retrieve_db_infos(Some(&excluded))
            .await
            .unwrap();

        assert_eq!(infos.excluded_clause, "'a','b'");
        assert_eq!(infos.schemas, Some(vec!["public".to_string()]));
        assert_eq!(infos.size, None);
        assert_eq!(infos.tables, None);
    }

    #[test]
    fn schema_set_never_contains_excluded_schemas() {
        let excluded = vec!["excluded".to_string()];
        let set = SchemaSet::new(
            vec![
                "public".to_string(),
                "excluded".to_string(),
                "included".to_string(),
                "public".to_string(),
            ],
            Some(&excluded),
        );

        assert_eq!(set.names(), &["public".to_string(), "included".to_string()]);
        assert!(!set.contains("excluded"));
        assert_eq!(set.excluded_clause(), "'excluded'");
    }

    #[test]
    fn user_schemas_skip_metadata() {
        let set = SchemaSet::new(
            vec!["information_schema".to_string(), "public".to_string()],
            None,
        );
        let metadata = vec!["information_schema".to_string()];

        assert_eq!(set.user_schemas(&metadata).collect::<Vec<_>>(), vec!["public"]);

        let only_metadata = SchemaSet::new(vec!["information_schema".to_string()], None);
        assert_eq!(only_metadata.user_schemas(&metadata).next(), None);
    }
}
