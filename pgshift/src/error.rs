//! Error types for migration runs.
//!
//! [`MigrateError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, the originating error and the callsite that created it. Several errors can
//! be aggregated into one when a phase reports more than one failure.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use pgshift_config::shared::ValidationError;
use pgshift_postgres::replication::NamingError;

/// Result type of fallible migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the migration engine.
#[derive(Debug, Clone)]
pub struct MigrateError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<MigrateError>,
        location: &'static Location<'static>,
    },
}

/// Classification of migration failures.
///
/// Connectivity kinds end a run. Statement failures never reach this type: the gateway logs
/// them and reports the statement as not applied.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection Errors
    ConnectionFailed,
    AuthenticationError,

    // Query & Probe Errors
    QueryFailed,
    SubscriptionProbeFailed,
    SyncProbeFailed,

    // Dump Errors
    DumpFailed,
    NoEligibleSchemas,

    // State & Data Errors
    InvalidState,
    ConversionError,

    // Configuration & Security Errors
    ConfigError,
    EncryptionError,

    // IO Errors
    IoError,

    Unknown,
}

impl MigrateError {
    /// Returns the [`ErrorKind`] of this error, the first one for aggregates.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the aggregated errors, `None` for a single error.
    pub fn errors(&self) -> Option<&[MigrateError]> {
        match self.repr {
            ErrorRepr::Single(_) => None,
            ErrorRepr::Many { ref errors, .. } => Some(errors),
        }
    }

    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { .. } => "Multiple errors occurred",
        }
    }

    /// Returns the dynamic detail, the first available one for aggregates.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Whether this error means an endpoint could not be reached or authenticated against.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionFailed | ErrorKind::AuthenticationError
        )
    }

    /// Attaches an originating error. No effect on aggregates, which forward their first error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        MigrateError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        MigrateError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for MigrateError {
    fn eq(&self, other: &MigrateError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for MigrateError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let indent_str = "  ".repeat(indent);

    let rendered = format!("{backtrace}");
    if !rendered.trim().is_empty() {
        write!(f, "\n{indent_str}Backtrace:")?;
        for line in rendered.lines() {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        write!(f, "\n{indent_str}  {line}")?;
    }

    Ok(())
}

impl From<(ErrorKind, &'static str)> for MigrateError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> MigrateError {
        MigrateError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for MigrateError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> MigrateError {
        MigrateError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for MigrateError
where
    E: Into<MigrateError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> MigrateError {
        let location = Location::caller();

        let mut errors: Vec<MigrateError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        MigrateError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for MigrateError {
    #[track_caller]
    fn from(err: std::io::Error) -> MigrateError {
        MigrateError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<std::string::FromUtf8Error> for MigrateError {
    #[track_caller]
    fn from(err: std::string::FromUtf8Error) -> MigrateError {
        MigrateError::from_source(
            ErrorKind::ConversionError,
            "UTF-8 string conversion failed",
            err,
        )
    }
}

/// Maps Postgres errors by SQLSTATE class. An error without SQLSTATE never reached the server
/// and counts as a connection failure.
impl From<tokio_postgres::Error> for MigrateError {
    #[track_caller]
    fn from(err: tokio_postgres::Error) -> MigrateError {
        let (kind, description) = match err.code() {
            Some(sqlstate) => {
                use tokio_postgres::error::SqlState;

                match *sqlstate {
                    // Connection errors (08xxx)
                    SqlState::CONNECTION_EXCEPTION
                    | SqlState::CONNECTION_DOES_NOT_EXIST
                    | SqlState::CONNECTION_FAILURE
                    | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
                    | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION => (
                        ErrorKind::ConnectionFailed,
                        "PostgreSQL connection failed",
                    ),

                    // Authentication errors (28xxx)
                    SqlState::INVALID_AUTHORIZATION_SPECIFICATION | SqlState::INVALID_PASSWORD => (
                        ErrorKind::AuthenticationError,
                        "PostgreSQL authentication failed",
                    ),

                    // Server unavailable (53xxx, 57xxx)
                    SqlState::TOO_MANY_CONNECTIONS
                    | SqlState::CANNOT_CONNECT_NOW
                    | SqlState::ADMIN_SHUTDOWN
                    | SqlState::CRASH_SHUTDOWN
                    | SqlState::IDLE_SESSION_TIMEOUT => (
                        ErrorKind::ConnectionFailed,
                        "PostgreSQL server unavailable",
                    ),

                    // Unknown database (3D000)
                    SqlState::INVALID_CATALOG_NAME => (
                        ErrorKind::ConnectionFailed,
                        "PostgreSQL database does not exist",
                    ),

                    // Data conversion errors (22xxx)
                    SqlState::DATA_EXCEPTION | SqlState::INVALID_TEXT_REPRESENTATION => (
                        ErrorKind::ConversionError,
                        "PostgreSQL data conversion failed",
                    ),

                    // Transaction state errors (25xxx, 40xxx)
                    SqlState::ACTIVE_SQL_TRANSACTION
                    | SqlState::NO_ACTIVE_SQL_TRANSACTION
                    | SqlState::IN_FAILED_SQL_TRANSACTION
                    | SqlState::TRANSACTION_ROLLBACK
                    | SqlState::T_R_DEADLOCK_DETECTED => {
                        (ErrorKind::InvalidState, "PostgreSQL transaction failed")
                    }

                    // Object state errors (55xxx)
                    SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE | SqlState::OBJECT_IN_USE => (
                        ErrorKind::InvalidState,
                        "PostgreSQL object not in prerequisite state",
                    ),

                    _ => (ErrorKind::QueryFailed, "PostgreSQL query failed"),
                }
            }
            None => (ErrorKind::ConnectionFailed, "PostgreSQL connection failed"),
        };

        MigrateError::from_source(kind, description, err)
    }
}

impl From<rustls::Error> for MigrateError {
    #[track_caller]
    fn from(err: rustls::Error) -> MigrateError {
        MigrateError::from_source(ErrorKind::EncryptionError, "TLS configuration failed", err)
    }
}

impl From<ValidationError> for MigrateError {
    #[track_caller]
    fn from(err: ValidationError) -> MigrateError {
        MigrateError::from_source(ErrorKind::ConfigError, "Invalid migration configuration", err)
    }
}

impl From<NamingError> for MigrateError {
    #[track_caller]
    fn from(err: NamingError) -> MigrateError {
        MigrateError::from_source(
            ErrorKind::ConfigError,
            "Replication object name is invalid",
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate_error;

    #[test]
    fn macro_attaches_detail_and_location() {
        let err = migrate_error!(
            ErrorKind::DumpFailed,
            "pg_dump exited with an error",
            detail = "exit status: 1".to_string()
        );

        assert_eq!(err.kind(), ErrorKind::DumpFailed);
        assert_eq!(err.detail(), Some("exit status: 1"));
        assert!(err.location().file().ends_with("error.rs"));
        assert!(format!("{err}").starts_with("[DumpFailed] pg_dump exited with an error @"));
    }

    #[test]
    fn aggregate_of_one_is_the_error_itself() {
        let err = MigrateError::from(vec![migrate_error!(
            ErrorKind::QueryFailed,
            "Attaching table failed"
        )]);

        assert_eq!(err.kinds(), vec![ErrorKind::QueryFailed]);
        assert!(err.backtrace().is_some());
    }

    #[test]
    fn aggregates_report_every_kind() {
        let err = MigrateError::from(vec![
            migrate_error!(ErrorKind::QueryFailed, "first"),
            migrate_error!(ErrorKind::ConnectionFailed, "second"),
        ]);

        assert_eq!(err.kind(), ErrorKind::QueryFailed);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::QueryFailed, ErrorKind::ConnectionFailed]
        );
        assert_eq!(err.errors().map(<[MigrateError]>::len), Some(2));
        assert!(format!("{err}").starts_with("[Many] 2 errors aggregated"));
    }

    #[test]
    fn connectivity_kinds() {
        assert!(migrate_error!(ErrorKind::ConnectionFailed, "down").is_connectivity());
        assert!(migrate_error!(ErrorKind::AuthenticationError, "denied").is_connectivity());
        assert!(!migrate_error!(ErrorKind::SyncProbeFailed, "probe").is_connectivity());
    }

    #[test]
    fn validation_errors_are_config_errors() {
        let err = MigrateError::from(ValidationError::PollIntervalZero);
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }
}
