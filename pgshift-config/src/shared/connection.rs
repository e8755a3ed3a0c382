use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_postgres::Config as TokioPgConnectOptions;
use tokio_postgres::config::Host;

use crate::shared::ValidationError;

/// `application_name` reported by administrative connections.
const APP_NAME_MIGRATOR: &str = "pgshift_migrator";

/// Session settings applied to administrative connections whose connection string does not
/// carry its own `options`.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns a space-separated list of `-c key=value` pairs.
    ///
    /// `statement_timeout=0` keeps long restores and index builds from being cancelled.
    pub fn to_options_string() -> String {
        "-c datestyle=ISO -c client_encoding=UTF8 -c statement_timeout=0".to_string()
    }
}

/// One endpoint of a migration: where to connect and which database it holds.
///
/// Immutable once built. The connection string accepts both the libpq `key=value` form and
/// the `postgresql://` URL form, and is redacted in debug output.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionTarget {
    pub connection_string: SecretString,
    /// Database name used for naming conventions and catalog probes.
    pub database: String,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl ConnectionTarget {
    pub fn new(connection_string: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            connection_string: SecretString::new(connection_string.into()),
            database: database.into(),
            tls: TlsConfig::disabled(),
        }
    }

    /// Exposes the raw connection string, e.g. to hand it to `pg_dump`.
    pub fn connection_string(&self) -> &str {
        self.connection_string.expose_secret()
    }

    /// Validates the target; `role` names it in error messages (`source` or `target`).
    pub fn validate(&self, role: &'static str) -> Result<(), ValidationError> {
        if self.database.trim().is_empty() {
            return Err(ValidationError::EmptyDatabaseName(role));
        }
        self.tls.validate()?;
        self.to_connect_options().map(|_| ())
    }

    /// Builds tokio-postgres connect options from the connection string.
    pub fn to_connect_options(&self) -> Result<TokioPgConnectOptions, ValidationError> {
        let mut options = TokioPgConnectOptions::from_str(self.connection_string()).map_err(
            |err| ValidationError::InvalidConnectionString {
                target: self.database.clone(),
                reason: err.to_string(),
            },
        )?;

        if options.get_application_name().is_none() {
            options.application_name(APP_NAME_MIGRATOR);
        }
        if options.get_options().is_none() {
            options.options(DefaultPgConnectionOptions::to_options_string());
        }

        Ok(options)
    }

    /// Describes the endpoint without credentials, for log and error messages.
    pub fn redacted(&self) -> String {
        match TokioPgConnectOptions::from_str(self.connection_string()) {
            Ok(options) => {
                let hosts = options
                    .get_hosts()
                    .iter()
                    .map(|host| match host {
                        Host::Tcp(name) => name.clone(),
                        #[cfg(unix)]
                        Host::Unix(path) => path.display().to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                let ports = options
                    .get_ports()
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(",");

                format!("host={hosts} port={ports} database={}", self.database)
            }
            Err(_) => format!("<unparseable connection string> database={}", self.database),
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// TLS settings for administrative connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}
