use pgshift_config::shared::SyncConfig;
use pgshift_postgres::replication::subscription::{pending_tables_query, sync_progress_query};
use pgshift_postgres::types::{SubscriptionRelState, TableName};
use tracing::{debug, info, warn};

use crate::gateway::SqlGateway;

/// How the wait for the initial copy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every table of the subscription reached the ready state.
    Converged,
    /// The sync state could not be read `attempts` times in a row.
    ProbeFailed { attempts: u32, last_error: String },
}

/// A table whose initial copy is still running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTable {
    pub table: TableName,
    pub state: Option<SubscriptionRelState>,
}

/// Samples a subscription's per-table state until the initial copy is done.
#[derive(Debug)]
pub struct SyncPoller<'a, G> {
    gateway: &'a G,
    config: &'a SyncConfig,
    excluded_table_names: Vec<String>,
}

impl<'a, G> SyncPoller<'a, G>
where
    G: SqlGateway,
{
    pub fn new(gateway: &'a G, config: &'a SyncConfig, excluded_table_names: Vec<String>) -> Self {
        Self {
            gateway,
            config,
            excluded_table_names,
        }
    }

    /// Waits until no table of `subscription` is pending.
    ///
    /// Sleeps `poll_interval` between samples while work remains. A failed probe is retried
    /// with exponential backoff until `max_probe_attempts` consecutive failures, at which point
    /// the failure is returned for the caller to act on.
    pub async fn await_initial_sync(&self, subscription: &str) -> SyncOutcome {
        let mut failures = 0;

        loop {
            match self.pending_tables(subscription).await {
                Ok(pending) if pending.is_empty() => {
                    info!(%subscription, "initial sync complete");
                    return SyncOutcome::Converged;
                }
                Ok(pending) => {
                    failures = 0;
                    debug!(%subscription, pending = ?pending, "tables still copying");
                    self.log_progress(subscription, pending.len()).await;

                    tokio::time::sleep(self.config.poll_interval()).await;
                }
                Err(last_error) => {
                    failures += 1;
                    if failures >= self.config.max_probe_attempts {
                        warn!(
                            %subscription,
                            attempts = failures,
                            error = %last_error,
                            "sync probe failed"
                        );
                        return SyncOutcome::ProbeFailed {
                            attempts: failures,
                            last_error,
                        };
                    }

                    let delay = self.config.probe_retry_delay(failures);
                    warn!(
                        %subscription,
                        attempt = failures,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "sync probe failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Tables not yet ready. Unreachable endpoints count as a failed probe.
    async fn pending_tables(&self, subscription: &str) -> Result<Vec<PendingTable>, String> {
        let query = pending_tables_query(subscription, &self.excluded_table_names);

        let rows = match self.gateway.execute_query(&query, true).await {
            Ok(Some(rows)) => rows,
            Ok(None) => return Err(format!("query failed on {}", self.gateway.target())),
            Err(err) => return Err(err.to_string()),
        };

        Ok(rows
            .iter()
            .filter_map(|row| {
                let table = TableName::new(row.get(0)?, row.get(1)?);
                let state = row.get(2).and_then(|code| code.parse().ok());
                Some(PendingTable { table, state })
            })
            .collect())
    }

    /// Logs the ready/total counters. Failures here never affect the wait.
    async fn log_progress(&self, subscription: &str, pending: usize) {
        let query = sync_progress_query(subscription, &self.excluded_table_names);

        let progress = match self.gateway.execute_query(&query, true).await {
            Ok(Some(rows)) => rows.first().and_then(|row| {
                let ready = row.get(0)?.parse::<i64>().ok()?;
                let total = row.get(1)?.parse::<i64>().ok()?;
                Some((ready, total))
            }),
            _ => None,
        };

        match progress {
            Some((ready, total)) => {
                info!(%subscription, pending, ready, total, "waiting for initial sync")
            }
            None => info!(%subscription, pending, "waiting for initial sync"),
        }
    }
}
