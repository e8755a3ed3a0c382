use chrono::NaiveDateTime;
use thiserror::Error;

/// Maximum length in bytes of a Postgres identifier, replication slots included.
pub const MAX_OBJECT_NAME_LENGTH: usize = 63;

pub const PUBLICATION_PREFIX: &str = "publication";
pub const SUBSCRIPTION_PREFIX: &str = "subscription";

/// Timestamp layout embedded in session names.
const SESSION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("Replication object name `{0}` exceeds {MAX_OBJECT_NAME_LENGTH} bytes")]
    NameTooLong(String),

    #[error("Database name cannot be empty")]
    EmptyDatabaseName,
}

/// Builds `<database>_<YYYYmmdd_HHMMSS>`, the name shared by a publication and its subscription.
pub fn unique_session_name(database: &str, started_at: NaiveDateTime) -> String {
    format!("{database}_{}", started_at.format(SESSION_TIMESTAMP_FORMAT))
}

pub fn publication_name(unique_name: &str) -> Result<String, NamingError> {
    checked(format!("{PUBLICATION_PREFIX}_{unique_name}"))
}

/// The subscription name doubles as its replication slot name.
pub fn subscription_name(unique_name: &str) -> Result<String, NamingError> {
    checked(format!("{SUBSCRIPTION_PREFIX}_{unique_name}"))
}

/// `LIKE` pattern matching every subscription created for `database`, whatever its session.
///
/// `_` and `%` in the database name are escaped so they only match themselves.
pub fn subscription_lookup_pattern(database: &str) -> Result<String, NamingError> {
    if database.is_empty() {
        return Err(NamingError::EmptyDatabaseName);
    }

    Ok(format!(
        "{}\\_{}\\_%",
        escape_like(SUBSCRIPTION_PREFIX),
        escape_like(database)
    ))
}

/// Start time of the session `subscription` belongs to, if it is a session subscription of
/// `database`.
///
/// `subscription_app_v2_20240309_070501` is not a session of `app`, even though the lookup
/// pattern of `app` matches it.
pub fn session_started_at(database: &str, subscription: &str) -> Option<NaiveDateTime> {
    let timestamp = subscription
        .strip_prefix(SUBSCRIPTION_PREFIX)?
        .strip_prefix('_')?
        .strip_prefix(database)?
        .strip_prefix('_')?;

    NaiveDateTime::parse_from_str(timestamp, SESSION_TIMESTAMP_FORMAT).ok()
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '_' | '%') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

fn checked(name: String) -> Result<String, NamingError> {
    if name.len() > MAX_OBJECT_NAME_LENGTH {
        return Err(NamingError::NameTooLong(name));
    }

    Ok(name)
}
