use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// What the orchestrator does when the initial-sync probe keeps failing.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailureAction {
    /// Treat the failed probe as "nothing left to synchronize" and finalize constraints.
    #[default]
    Proceed,
    /// Stop the run; the subscription stays in place so the next run resumes the wait.
    Abort,
}

/// Cadence and failure handling of the initial-sync wait.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between two samples of the per-table sync state.
    ///
    /// Default: 10000ms
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive failed probes tolerated before the wait reports a probe failure.
    ///
    /// Default: 1, a single failed probe ends the wait.
    #[serde(default = "default_max_probe_attempts")]
    pub max_probe_attempts: u32,

    /// Delay before re-probing after the first failure, doubled on each further failure.
    ///
    /// Default: 1000ms
    #[serde(default = "default_probe_retry_initial_delay_ms")]
    pub probe_retry_initial_delay_ms: u64,

    /// Upper bound of the re-probe delay.
    ///
    /// Default: 30000ms
    #[serde(default = "default_probe_retry_max_delay_ms")]
    pub probe_retry_max_delay_ms: u64,

    #[serde(default)]
    pub on_probe_failure: ProbeFailureAction,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_max_probe_attempts() -> u32 {
    1
}

fn default_probe_retry_initial_delay_ms() -> u64 {
    1_000
}

fn default_probe_retry_max_delay_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_probe_attempts: default_max_probe_attempts(),
            probe_retry_initial_delay_ms: default_probe_retry_initial_delay_ms(),
            probe_retry_max_delay_ms: default_probe_retry_max_delay_ms(),
            on_probe_failure: ProbeFailureAction::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        if self.max_probe_attempts == 0 {
            return Err(ValidationError::MaxProbeAttemptsZero);
        }

        if self.probe_retry_max_delay_ms < self.probe_retry_initial_delay_ms {
            return Err(ValidationError::ProbeRetryDelayRange);
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay before the re-probe following the `failures`-th consecutive failure (1-indexed).
    pub fn probe_retry_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self
            .probe_retry_initial_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.probe_retry_max_delay_ms);

        Duration::from_millis(delay)
    }
}
