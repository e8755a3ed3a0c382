use std::sync::Once;

use pgshift_config::Environment;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Builds the log filter from `RUST_LOG`, falling back to [`DEFAULT_LOG_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber.
///
/// Development builds get human readable output, production builds emit one JSON object per
/// event. In both cases `WARN` and `ERROR` events go to stderr and everything else to stdout, so
/// failures stay visible when stdout is redirected.
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<(), TracingError> {
    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    let registry = tracing_subscriber::registry().with(env_filter());

    if environment.is_prod() {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(writer),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer))
            .try_init()?;
    }

    tracing::info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(())
}

static TEST_TRACING: Once = Once::new();

/// Installs a subscriber writing through the test harness' capture, once per process.
///
/// Honors `RUST_LOG` and stays silent by default so that passing tests produce no output.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
