use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use pgshift::error::MigrateError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type MigratorResult<T> = Result<T, MigratorError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the migrator binary.
///
/// Wraps [`MigrateError`] for failures of the run itself and adds the ones that happen before
/// a run can start.
#[derive(Debug)]
pub enum MigratorError {
    Migrate(MigrateError),
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl MigratorError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            MigratorError::Migrate(err) if err.is_connectivity() => "connection error",
            MigratorError::Migrate(_) => "migration error",
            MigratorError::Config(_, _) => "configuration error",
            MigratorError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            MigratorError::Migrate(err) => err.backtrace(),
            MigratorError::Config(_, cb) => Some(&cb.0),
            MigratorError::Io(_, cb) => Some(&cb.0),
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        MigratorError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("migrator failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {}\n", self));

        if !matches!(self, MigratorError::Migrate(err) if err.errors().is_some()) {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for MigratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigratorError::Migrate(err) => write!(f, "{err}"),
            MigratorError::Config(source, _) => write!(f, "configuration error: {source}"),
            MigratorError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for MigratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MigratorError::Migrate(err) => err.source(),
            MigratorError::Config(source, _) => Some(source.as_ref()),
            MigratorError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for MigratorError {
    fn from(err: std::io::Error) -> Self {
        MigratorError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<MigrateError> for MigratorError {
    fn from(err: MigrateError) -> Self {
        MigratorError::Migrate(err)
    }
}
