//! Provisioning of the role the subscription replicates as.
//!
//! Every statement issued here is safe to repeat: the role is only created when missing and
//! `GRANT` of an already granted privilege is a no-op. A run that crashed mid-bootstrap can
//! therefore start over from scratch.

use pgshift_config::shared::ReplicationRoleConfig;
use pgshift_postgres::replication::role::{create_replication_role_sql, grant_schema_read_sql};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::catalog::SchemaSet;
use crate::error::MigrateResult;
use crate::gateway::SqlGateway;

/// Statements of a bootstrap that the server rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub failed_statements: usize,
}

/// Creates the replication role on the source and lets it read every user schema.
pub async fn provision_replication_role<G>(
    gateway: &G,
    role: &ReplicationRoleConfig,
    schemas: &SchemaSet,
    metadata_schemas: &[String],
) -> MigrateResult<BootstrapReport>
where
    G: SqlGateway,
{
    info!(role = %role.name, endpoint = %gateway.target(), "provisioning replication role");

    let mut report = BootstrapReport::default();
    let password = role.password.as_ref().map(|p| p.expose_secret().as_str());

    let statement = create_replication_role_sql(&role.name, password);
    if gateway.execute_query(&statement, false).await?.is_none() {
        report.failed_statements += 1;
    }

    for schema in schemas.user_schemas(metadata_schemas) {
        for grant in grant_schema_read_sql(schema, &role.name) {
            if gateway.execute_query(&grant, false).await?.is_none() {
                report.failed_statements += 1;
            }
        }
    }

    if report.failed_statements > 0 {
        warn!(
            role = %role.name,
            failed = report.failed_statements,
            "replication role provisioning was incomplete"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use pgshift_config::shared::ConnectionTarget;
    use secrecy::SecretString;

    use super::*;
    use crate::test_utils::gateway::StubGateway;

    fn role() -> ReplicationRoleConfig {
        ReplicationRoleConfig {
            name: "pgshift_replicator".to_string(),
            password: Some(SecretString::new("secret".to_string())),
        }
    }

    #[tokio::test]
    async fn grants_cover_every_user_schema() {
        let gateway = StubGateway::new(ConnectionTarget::new("host=source", "db_primary"));
        let schemas = SchemaSet::new(
            vec![
                "information_schema".to_string(),
                "included".to_string(),
                "public".to_string(),
            ],
            None,
        );

        let report = provision_replication_role(
            &gateway,
            &role(),
            &schemas,
            &["information_schema".to_string()],
        )
        .await
        .unwrap();

        assert_eq!(report.failed_statements, 0);
        let statements = gateway.statements();
        assert!(statements[0].starts_with("DO $pgshift$"));
        assert_eq!(
            &statements[1..],
            &[
                "GRANT USAGE ON SCHEMA included TO pgshift_replicator".to_string(),
                "GRANT SELECT ON ALL TABLES IN SCHEMA included TO pgshift_replicator".to_string(),
                "GRANT USAGE ON SCHEMA public TO pgshift_replicator".to_string(),
                "GRANT SELECT ON ALL TABLES IN SCHEMA public TO pgshift_replicator".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn rejected_grants_are_counted_not_fatal() {
        let gateway = StubGateway::new(ConnectionTarget::new("host=source", "db_primary"));
        gateway.fail("GRANT USAGE ON SCHEMA public TO pgshift_replicator");
        let schemas = SchemaSet::new(vec!["public".to_string()], None);

        let report = provision_replication_role(&gateway, &role(), &schemas, &[])
            .await
            .unwrap();

        assert_eq!(report.failed_statements, 1);
        assert_eq!(gateway.statements().len(), 3);
    }
}
