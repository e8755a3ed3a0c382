use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("`sync.poll_interval_ms` cannot be zero")]
    PollIntervalZero,
    #[error("`sync.max_probe_attempts` cannot be zero")]
    MaxProbeAttemptsZero,
    #[error("`sync.probe_retry_max_delay_ms` must be greater than or equal to `sync.probe_retry_initial_delay_ms`")]
    ProbeRetryDelayRange,
    #[error("database name of the {0} connection cannot be empty")]
    EmptyDatabaseName(&'static str),
    #[error("`replication_source_url` cannot be empty")]
    EmptyReplicationSourceUrl,
    #[error("`dump.pg_dump_path` cannot be empty")]
    EmptyPgDumpPath,
    #[error("replication role name cannot be empty")]
    EmptyReplicationRoleName,
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    #[error("invalid connection string for database `{target}`: {reason}")]
    InvalidConnectionString { target: String, reason: String },
}
