use pgshift_postgres::catalog::eligible_tables_query;
use pgshift_postgres::replication::publication::{add_table_sql, create_publication_sql};
use pgshift_postgres::types::TableName;
use tracing::{error, info, warn};

use crate::error::MigrateResult;
use crate::gateway::SqlGateway;

/// Tables attached to a publication, and the ones the server refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachSummary {
    pub attached: Vec<TableName>,
    pub failed: Vec<TableName>,
}

/// Manages the publication on the source.
#[derive(Debug)]
pub struct PublicationManager<'a, G> {
    gateway: &'a G,
}

impl<'a, G> PublicationManager<'a, G>
where
    G: SqlGateway,
{
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Creates an empty publication. Returns whether the server accepted it.
    pub async fn create_publication(&self, publication: &str) -> MigrateResult<bool> {
        info!(%publication, endpoint = %self.gateway.target(), "creating publication");

        let created = self
            .gateway
            .execute_query(&create_publication_sql(publication), false)
            .await?
            .is_some();

        if !created {
            warn!(%publication, "publication was not created");
        }

        Ok(created)
    }

    /// Attaches every user table outside the excluded schemas and denylisted tables.
    ///
    /// Tables are attached one statement at a time so that a refused table is reported on its
    /// own without affecting the others.
    pub async fn attach_all_eligible_tables(
        &self,
        publication: &str,
        excluded_clause: &str,
        metadata_schemas: &[String],
        excluded_table_names: &[String],
    ) -> MigrateResult<AttachSummary> {
        let query = eligible_tables_query(excluded_clause, metadata_schemas, excluded_table_names);

        let mut summary = AttachSummary::default();
        let Some(rows) = self.gateway.execute_query(&query, true).await? else {
            error!(%publication, "could not list tables to publish");
            return Ok(summary);
        };

        for row in rows {
            let (Some(schema), Some(table)) = (row.get(0), row.get(1)) else {
                continue;
            };
            let table = TableName::new(schema, table);

            let attached = self
                .gateway
                .execute_query(&add_table_sql(publication, &table), false)
                .await?
                .is_some();

            if attached {
                info!(%publication, %table, "table added to publication");
                summary.attached.push(table);
            } else {
                summary.failed.push(table);
            }
        }

        if !summary.failed.is_empty() {
            warn!(
                %publication,
                failed = summary.failed.len(),
                "some tables could not be added to the publication"
            );
        }

        Ok(summary)
    }
}
