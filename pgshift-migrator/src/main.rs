//! Migrator binary.
//!
//! Resolves the configuration from the command line or the configuration files, then runs a
//! single migration to completion. Any error ends the process with a non-zero status.

use std::process::ExitCode;

use clap::Parser;
use pgshift_config::Environment;
use pgshift_config::shared::MigratorConfig;
use pgshift_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::{Cli, load_migrator_config};
use crate::core::start_migration_with_config;
use crate::error::{MigratorError, MigratorResult};

mod config;
mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> MigratorResult<()> {
    let cli = Cli::parse();

    let environment = Environment::load()?;
    init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(MigratorError::config)?;

    // Both rustls backends can end up enabled through feature unification.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = load_migrator_config(cli)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config))
}

async fn async_main(config: MigratorConfig) -> MigratorResult<()> {
    if let Err(err) = start_migration_with_config(config).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
