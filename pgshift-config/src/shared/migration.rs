use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ConnectionTarget, DumpConfig, SyncConfig, ValidationError};

/// How post-data dumps are split into primary-key and non-primary-key statements.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStrategy {
    /// Groups lines into statements by their terminating `;` and classifies whole statements.
    #[default]
    Statement,
    /// Pairs each primary-key line with the physical line before it.
    LineWindow,
}

/// Low-privilege role the target's subscription uses to read from the source.
#[derive(Clone, Debug, Deserialize)]
pub struct ReplicationRoleConfig {
    pub name: String,
    pub password: Option<SecretString>,
}

/// Complete configuration of one migration run.
///
/// This intentionally does not implement [`Serialize`] to avoid leaking the connection
/// strings it carries.
#[derive(Clone, Debug, Deserialize)]
pub struct MigratorConfig {
    /// Administrative connection to the source (publisher) database.
    pub source: ConnectionTarget,
    /// Administrative connection to the target (subscriber) database.
    pub target: ConnectionTarget,
    /// Connection string the target uses to reach the source for the subscription.
    ///
    /// Distinct from [`MigratorConfig::source`] since the replication-facing address may
    /// differ, e.g. an internal host name.
    pub replication_source_url: SecretString,
    /// Schemas left out of the dump, the role grants and the publication.
    #[serde(default)]
    pub excluded_schemas: Option<Vec<String>>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub dump: DumpConfig,
    #[serde(default)]
    pub rewrite: RewriteStrategy,
    /// When `None` no replication role is provisioned.
    #[serde(default)]
    pub replication_role: Option<ReplicationRoleConfig>,
}

impl MigratorConfig {
    /// Builds a configuration with default sync, dump and rewrite settings.
    pub fn new(
        source: ConnectionTarget,
        target: ConnectionTarget,
        replication_source_url: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            replication_source_url: SecretString::new(replication_source_url.into()),
            excluded_schemas: None,
            sync: SyncConfig::default(),
            dump: DumpConfig::default(),
            rewrite: RewriteStrategy::default(),
            replication_role: None,
        }
    }

    pub fn with_excluded_schemas(mut self, excluded_schemas: Option<Vec<String>>) -> Self {
        self.excluded_schemas = excluded_schemas;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate("source")?;
        self.target.validate("target")?;

        if self.replication_source_url.expose_secret().trim().is_empty() {
            return Err(ValidationError::EmptyReplicationSourceUrl);
        }

        if let Some(role) = &self.replication_role {
            if role.name.trim().is_empty() {
                return Err(ValidationError::EmptyReplicationRoleName);
            }
        }

        self.sync.validate()?;
        self.dump.validate()
    }
}

impl Config for MigratorConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["excluded_schemas"];
}
