//! Shared configuration types for migration runs.

mod base;
mod connection;
mod dump;
mod migration;
mod sync;

pub use base::ValidationError;
pub use connection::{ConnectionTarget, DefaultPgConnectionOptions, TlsConfig};
pub use dump::{DEFAULT_EXCLUDED_TABLES, DEFAULT_METADATA_SCHEMAS, DumpConfig};
pub use migration::{MigratorConfig, ReplicationRoleConfig, RewriteStrategy};
pub use sync::{ProbeFailureAction, SyncConfig};
