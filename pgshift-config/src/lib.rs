//! Configuration for pgshift migrations.
//!
//! Holds the layered loader used by the migrator binary and the shared configuration
//! types consumed by the engine.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
