use std::fmt;
use std::str::FromStr;

use pg_escape::quote_identifier;
use thiserror::Error;

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Renders `schema.table`, quoting each part only when Postgres requires it.
    pub fn as_quoted_identifier(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.name)
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Debug, Error)]
#[error("unknown subscription relation state `{0}`")]
pub struct UnknownRelStateError(pub String);

/// Per-table state of a subscription, as stored in `pg_subscription_rel.srsubstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionRelState {
    /// `i`: initialization requested.
    Init,
    /// `d`: initial data copy in progress.
    DataSync,
    /// `f`: copy finished, waiting for the final sync.
    FinishedCopy,
    /// `s`: synchronized with the apply worker.
    SyncDone,
    /// `r`: normal streaming replication.
    Ready,
}

impl SubscriptionRelState {
    pub fn as_code(&self) -> &'static str {
        match self {
            SubscriptionRelState::Init => "i",
            SubscriptionRelState::DataSync => "d",
            SubscriptionRelState::FinishedCopy => "f",
            SubscriptionRelState::SyncDone => "s",
            SubscriptionRelState::Ready => "r",
        }
    }
}

impl FromStr for SubscriptionRelState {
    type Err = UnknownRelStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "i" => Ok(SubscriptionRelState::Init),
            "d" => Ok(SubscriptionRelState::DataSync),
            "f" => Ok(SubscriptionRelState::FinishedCopy),
            "s" => Ok(SubscriptionRelState::SyncDone),
            "r" => Ok(SubscriptionRelState::Ready),
            other => Err(UnknownRelStateError(other.to_string())),
        }
    }
}

impl fmt::Display for SubscriptionRelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionRelState::Init => "init",
            SubscriptionRelState::DataSync => "data_sync",
            SubscriptionRelState::FinishedCopy => "finished_copy",
            SubscriptionRelState::SyncDone => "sync_done",
            SubscriptionRelState::Ready => "ready",
        };
        f.write_str(name)
    }
}
