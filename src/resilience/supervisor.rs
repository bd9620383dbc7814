//! Supervised retry loop for long-running tasks.
//!
//! # Responsibilities
//! - Run a task until it returns successfully
//! - Restart it after any failure, sleeping with `Backoff`
//! - Stop cleanly, without error, when shutdown is signalled
//!
//! # Design Decisions
//! - This is the only retry policy; supervised loops never retry on their own
//! - Shutdown is observed both while the task runs and while sleeping
//! - A failed attempt never ends the loop, only shutdown or success does

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::SupervisorConfig;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Restarts failing tasks with bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct Supervisor {
    min: Duration,
    max: Duration,
}

impl Supervisor {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min: Duration::from_secs(min_secs),
            max: Duration::from_secs(max_secs),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.min_secs, config.max_secs)
    }

    /// Run `task` until it succeeds or shutdown is signalled.
    ///
    /// Returns `Some(value)` on success and `None` on shutdown.
    pub async fn supervise<T, E, F, Fut>(
        &self,
        name: &str,
        mut shutdown: broadcast::Receiver<()>,
        mut task: F,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut backoff = Backoff::new(self.min, self.max);

        loop {
            tokio::select! {
                result = task() => match result {
                    Ok(value) => return Some(value),
                    Err(e) => {
                        tracing::error!(task = %name, error = %e, "Supervised task failed");
                    }
                },
                _ = shutdown.recv() => {
                    tracing::warn!(task = %name, "Shutdown received, stopping supervision");
                    return None;
                }
            }

            metrics::record_supervisor_restart(name);
            let delay = backoff.next_delay();
            tracing::warn!(task = %name, delay_secs = delay.as_secs(), "Sleeping before retry");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    tracing::warn!(task = %name, "Shutdown received during backoff, stopping supervision");
                    return None;
                }
            }
        }
    }
}
