use pgshift::dump::PgDumpExtractor;
use pgshift::gateway::PgGateway;
use pgshift::orchestrator::{MigrationOrchestrator, MigrationOutcome, MigrationReport};
use pgshift_config::shared::MigratorConfig;
use tracing::info;

use crate::error::MigratorResult;

/// Runs one migration against real databases and `pg_dump`.
pub async fn start_migration_with_config(
    config: MigratorConfig,
) -> MigratorResult<MigrationReport> {
    info!("starting migrator");

    log_config(&config);

    let source = PgGateway::new(config.source.clone());
    let target = PgGateway::new(config.target.clone());
    let dump = PgDumpExtractor::new(config.dump.clone());

    let mut orchestrator = MigrationOrchestrator::new(config, source, target, dump);
    let report = orchestrator.run().await?;

    match report.outcome {
        MigrationOutcome::Completed => info!(
            subscription = report.subscription_name.as_deref().unwrap_or_default(),
            phases = ?report.phases,
            "migration finished"
        ),
        MigrationOutcome::NoReplicationRunning => {
            info!(phases = ?report.phases, "migration ended without replication")
        }
    }

    Ok(report)
}

fn log_config(config: &MigratorConfig) {
    info!(
        source = %config.source,
        destination = %config.target,
        excluded_schemas = ?config.excluded_schemas,
        rewrite = ?config.rewrite,
        replication_role = config.replication_role.as_ref().map(|role| role.name.as_str()),
        "migration config"
    );
    info!(
        poll_interval_ms = config.sync.poll_interval_ms,
        max_probe_attempts = config.sync.max_probe_attempts,
        on_probe_failure = ?config.sync.on_probe_failure,
        "sync config"
    );
    info!(
        pg_dump_path = %config.dump.pg_dump_path,
        excluded_tables = ?config.dump.excluded_tables,
        no_owner = config.dump.no_owner,
        "dump config"
    );
}
