use clap::Parser;
use pgshift_config::load_config;
use pgshift_config::shared::{ConnectionTarget, MigratorConfig};
use secrecy::SecretString;
use thiserror::Error;

use crate::error::{MigratorError, MigratorResult};

/// Environment variable holding the connection string the target uses to reach the source.
const REPLICATION_SOURCE_URL_ENV_NAME: &str = "CONN_DB_PRIMARY_FULL";

/// Migrates a Postgres database to another instance with minimal downtime.
///
/// Without positional arguments the whole configuration is read from `configuration/` and
/// `APP_` environment variables.
#[derive(Parser, Debug)]
#[command(name = "pgshift-migrator", version)]
pub struct Cli {
    /// Administrative connection string of the source database.
    pub source_connection: Option<String>,

    /// Name of the source database.
    pub source_database: Option<String>,

    /// Administrative connection string of the target database.
    pub target_connection: Option<String>,

    /// Name of the target database, the source database name when omitted.
    pub target_database: Option<String>,

    /// Comma separated schemas to leave out of the migration.
    #[arg(value_delimiter = ',')]
    pub excluded_schemas: Option<Vec<String>>,

    /// Connection string the target uses to subscribe to the source.
    #[arg(long, env = REPLICATION_SOURCE_URL_ENV_NAME, hide_env_values = true)]
    pub replication_source_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("missing argument `{0}`")]
    MissingArgument(&'static str),
    #[error(
        "no replication source url, pass `--replication-source-url` or set `{REPLICATION_SOURCE_URL_ENV_NAME}`"
    )]
    MissingReplicationSourceUrl,
}

/// Resolves and validates the configuration of this run.
pub fn load_migrator_config(cli: Cli) -> MigratorResult<MigratorConfig> {
    let config = match cli.source_connection.is_some() {
        true => config_from_arguments(cli).map_err(MigratorError::config)?,
        false => {
            let mut config =
                load_config::<MigratorConfig>().map_err(MigratorError::config)?;
            if let Some(url) = cli.replication_source_url {
                config.replication_source_url = SecretString::new(url);
            }
            config
        }
    };

    config.validate().map_err(MigratorError::config)?;

    Ok(config)
}

fn config_from_arguments(cli: Cli) -> Result<MigratorConfig, CliError> {
    let source_connection = cli
        .source_connection
        .ok_or(CliError::MissingArgument("source_connection"))?;
    let source_database = cli
        .source_database
        .ok_or(CliError::MissingArgument("source_database"))?;
    let target_connection = cli
        .target_connection
        .ok_or(CliError::MissingArgument("target_connection"))?;
    let target_database = cli
        .target_database
        .unwrap_or_else(|| source_database.clone());
    let replication_source_url = cli
        .replication_source_url
        .ok_or(CliError::MissingReplicationSourceUrl)?;

    let excluded_schemas = cli
        .excluded_schemas
        .map(|schemas| {
            schemas
                .into_iter()
                .map(|schema| schema.trim().to_string())
                .filter(|schema| !schema.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|schemas| !schemas.is_empty());

    Ok(MigratorConfig::new(
        ConnectionTarget::new(source_connection, source_database),
        ConnectionTarget::new(target_connection, target_database),
        replication_source_url,
    )
    .with_excluded_schemas(excluded_schemas))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("pgshift-migrator").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn positional_invocation() {
        let cli = parse(&[
            "host=pgfoo dbname=foo_db",
            "foo_db",
            "host=pgbar dbname=bar_db",
            "bar_db",
            "excluded,audit",
            "--replication-source-url",
            "postgresql://foo@pgfoo/foo_db",
        ]);

        let config = config_from_arguments(cli).unwrap();

        assert_eq!(config.source.database, "foo_db");
        assert_eq!(config.target.database, "bar_db");
        assert_eq!(
            config.excluded_schemas,
            Some(vec!["excluded".to_string(), "audit".to_string()])
        );
    }

    #[test]
    fn target_database_defaults_to_the_source_one() {
        let cli = parse(&[
            "host=pgfoo dbname=foo_db",
            "foo_db",
            "host=pgbar dbname=foo_db",
            "--replication-source-url",
            "postgresql://foo@pgfoo/foo_db",
        ]);

        let config = config_from_arguments(cli).unwrap();

        assert_eq!(config.target.database, "foo_db");
        assert_eq!(config.excluded_schemas, None);
    }

    #[test]
    fn incomplete_invocation_is_rejected() {
        let cli = parse(&[
            "host=pgfoo dbname=foo_db",
            "foo_db",
            "--replication-source-url",
            "postgresql://foo@pgfoo/foo_db",
        ]);

        assert!(matches!(
            config_from_arguments(cli),
            Err(CliError::MissingArgument("target_connection"))
        ));
    }
}
