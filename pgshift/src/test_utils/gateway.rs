use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use pgshift_config::shared::ConnectionTarget;

use crate::error::{ErrorKind, MigrateResult};
use crate::gateway::{QueryRows, Row, SqlGateway, TransactionOutcome};
use crate::{bail, migrate_error};

/// Canned answer to one query.
#[derive(Debug, Clone)]
pub enum StubResponse {
    Rows(Vec<Vec<Option<String>>>),
    /// The server rejected the statement.
    Fail,
    /// The endpoint could not be reached.
    Disconnect,
}

impl StubResponse {
    pub fn rows(rows: Vec<Vec<&str>>) -> Self {
        StubResponse::Rows(
            rows.into_iter()
                .map(|row| row.into_iter().map(|value| Some(value.to_string())).collect())
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Responses per exact query text; the last one is repeated once the others are consumed.
    responses: HashMap<String, VecDeque<StubResponse>>,
    statements: Vec<String>,
    transactions: Vec<String>,
    rejected_batch_needles: Vec<String>,
    unreachable: bool,
}

/// In-memory [`SqlGateway`] answering from canned responses and recording every statement.
///
/// A fetching query without a registered response panics, so tests fail loudly on queries they
/// did not anticipate. Non-fetching statements succeed unless told otherwise.
#[derive(Debug, Clone)]
pub struct StubGateway {
    target: ConnectionTarget,
    inner: Arc<Mutex<Inner>>,
}

impl StubGateway {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Answers `query` with `rows` every time.
    pub fn respond(&self, query: &str, rows: Vec<Vec<&str>>) {
        self.respond_sequence(query, vec![StubResponse::rows(rows)]);
    }

    /// Answers successive executions of `query` in order, repeating the last response.
    pub fn respond_sequence(&self, query: &str, responses: Vec<StubResponse>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .responses
            .insert(query.to_string(), responses.into_iter().collect());
    }

    /// Makes the server reject `query`.
    pub fn fail(&self, query: &str) {
        self.respond_sequence(query, vec![StubResponse::Fail]);
    }

    /// Rolls back every transactional batch containing `needle`.
    pub fn reject_batches_containing(&self, needle: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.rejected_batch_needles.push(needle.to_string());
    }

    /// Makes every subsequent call fail to connect.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }

    /// Statements run through [`SqlGateway::execute_query`], in order.
    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().unwrap().statements.clone()
    }

    /// Batches run through [`SqlGateway::execute_transactional`], in order.
    pub fn transactions(&self) -> Vec<String> {
        self.inner.lock().unwrap().transactions.clone()
    }

    pub fn executed(&self, statement: &str) -> bool {
        self.times_executed(statement) > 0
    }

    pub fn times_executed(&self, statement: &str) -> usize {
        self.statements()
            .iter()
            .filter(|executed| executed.as_str() == statement)
            .count()
    }

    /// Statements starting with `prefix`, in order.
    pub fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|statement| statement.starts_with(prefix))
            .collect()
    }
}

#[async_trait::async_trait]
impl SqlGateway for StubGateway {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn execute_query(&self, sql: &str, fetch: bool) -> MigrateResult<Option<QueryRows>> {
        let response = {
            let mut inner = self.inner.lock().unwrap();
            if inner.unreachable {
                bail!(
                    ErrorKind::ConnectionFailed,
                    "PostgreSQL connection failed",
                    self.target.redacted()
                );
            }

            inner.statements.push(sql.to_string());
            match inner.responses.get_mut(sql) {
                Some(responses) if responses.len() > 1 => responses.pop_front(),
                Some(responses) => responses.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(StubResponse::Rows(rows)) => Ok(Some(
                rows.into_iter().map(Row::new).collect::<QueryRows>(),
            )),
            Some(StubResponse::Fail) => Ok(None),
            Some(StubResponse::Disconnect) => Err(migrate_error!(
                ErrorKind::ConnectionFailed,
                "PostgreSQL connection failed",
                self.target.redacted()
            )),
            None if fetch => panic!("unexpected query on {}: {sql}", self.target),
            None => Ok(Some(QueryRows::new())),
        }
    }

    async fn execute_transactional(&self, batch: &str) -> MigrateResult<TransactionOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unreachable {
            bail!(
                ErrorKind::ConnectionFailed,
                "PostgreSQL connection failed",
                self.target.redacted()
            );
        }

        inner.transactions.push(batch.to_string());
        let rejected = inner
            .rejected_batch_needles
            .iter()
            .any(|needle| batch.contains(needle.as_str()));

        match rejected {
            true => Ok(TransactionOutcome::RolledBack),
            false => Ok(TransactionOutcome::Committed),
        }
    }
}
