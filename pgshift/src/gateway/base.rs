use pgshift_config::shared::ConnectionTarget;

use crate::error::MigrateResult;

/// One result row, every column in its text representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    columns: Vec<Option<String>>,
}

impl Row {
    pub fn new(columns: Vec<Option<String>>) -> Self {
        Self { columns }
    }

    /// Returns the value at `index`, `None` for SQL `NULL` or a missing column.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|column| column.as_deref())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Row {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        Row::new(iter.into_iter().map(|column| column.map(Into::into)).collect())
    }
}

pub type QueryRows = Vec<Row>;

/// How a transactional batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    /// A statement failed; nothing from the batch was applied.
    RolledBack,
}

/// Executes SQL against a single endpoint.
///
/// Failing to reach the endpoint is returned as an error and ends the run. A statement that
/// the server rejects is logged with its text and the endpoint, then reported as `Ok(None)` or
/// [`TransactionOutcome::RolledBack`] so the caller can carry on.
#[async_trait::async_trait]
pub trait SqlGateway: Send + Sync {
    /// The endpoint this gateway talks to.
    fn target(&self) -> &ConnectionTarget;

    /// Runs `sql` on a fresh connection.
    ///
    /// With `fetch` the returned rows are collected, otherwise a successful statement yields
    /// `Some` with no rows.
    async fn execute_query(&self, sql: &str, fetch: bool) -> MigrateResult<Option<QueryRows>>;

    /// Runs `batch` inside one transaction, committing on success and rolling back on the first
    /// failing statement.
    async fn execute_transactional(&self, batch: &str) -> MigrateResult<TransactionOutcome>;
}
