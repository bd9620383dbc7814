//! Workload reconciliation loop.
//!
//! # Responsibilities
//! - Keep the registry in line with what the workload source reports
//! - React to lifecycle events, or poll on a heartbeat with expiring entries
//! - Withdraw endpoints of workloads that disappeared entirely
//!
//! # Design Decisions
//! - Every pass is a full resync; events only trigger passes
//! - All unregisters of a pass run before any register
//! - Per-workload problems are logged and skipped, store failures end the pass
//! - `run` only ever returns an error; the supervisor restarts it

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{ReconcileConfig, ReconcileMode};
use crate::observability::metrics;
use crate::registry::{Backend, Endpoint, RegistryError};
use crate::workload::extract::{extract, Action};
use crate::workload::source::{WorkloadError, WorkloadSource};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("workload source error: {0}")]
    Workload(#[from] WorkloadError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub registered: usize,
    pub unregistered: usize,
    /// Workloads whose metadata could not be turned into an endpoint.
    pub rejected: usize,
}

/// Mirrors workloads into the registry.
///
/// Cheap to clone; clones share the record of which endpoints this agent
/// registered.
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn WorkloadSource>,
    backend: Arc<dyn Backend>,
    config: ReconcileConfig,
    /// Workload id to the name it was registered under.
    owned: Arc<Mutex<HashMap<String, String>>>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn WorkloadSource>,
        backend: Arc<dyn Backend>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            source,
            backend,
            config,
            owned: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run the configured strategy until it fails.
    pub async fn run(&self) -> Result<(), ReconcileError> {
        match self.config.mode {
            ReconcileMode::Events => self.run_events().await,
            ReconcileMode::Heartbeat => self.run_heartbeat().await,
        }
    }

    /// Subscribe first, then resync once and again after every event.
    pub async fn run_events(&self) -> Result<(), ReconcileError> {
        let mut events = self.source.events().await?;
        self.reconcile(None).await?;

        while let Some(event) = events.next().await {
            let event = event?;
            tracing::info!(action = %event.action, id = %event.id, "Workload event received");
            self.reconcile(None).await?;
        }

        Err(WorkloadError::StreamClosed.into())
    }

    /// Resync on a fixed interval, registering with a TTL.
    pub async fn run_heartbeat(&self) -> Result<(), ReconcileError> {
        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = tokio::time::interval(interval);
        tracing::info!(
            interval_secs = interval.as_secs(),
            ttl_secs = self.config.ttl_secs,
            "Heartbeat reconciliation starting"
        );

        loop {
            ticker.tick().await;
            self.reconcile(Some(self.config.ttl_secs)).await?;
        }
    }

    /// One full pass over every workload.
    pub async fn reconcile(&self, ttl: Option<u64>) -> Result<PassSummary, ReconcileError> {
        let workloads = self.source.list().await?;
        let mut summary = PassSummary::default();

        let mut seen = HashSet::new();
        let mut unregisters: Vec<(String, String)> = Vec::new();
        let mut registers: Vec<(String, Endpoint)> = Vec::new();

        for workload in &workloads {
            seen.insert(workload.id.clone());
            match extract(workload) {
                Ok(Some(Action::Register { name, endpoint })) => registers.push((name, endpoint)),
                Ok(Some(Action::Unregister { name, id })) => unregisters.push((name, id)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(id = %workload.id, error = %e, "Skipping workload with invalid metadata");
                    summary.rejected += 1;
                }
            }
        }

        {
            let owned = self.owned.lock().await;
            for (id, name) in owned.iter() {
                if !seen.contains(id) {
                    tracing::info!(name = %name, id = %id, "Workload vanished, withdrawing endpoint");
                    unregisters.push((name.clone(), id.clone()));
                    continue;
                }
                let renamed = registers
                    .iter()
                    .any(|(new_name, endpoint)| endpoint.id == *id && new_name != name);
                if renamed {
                    unregisters.push((name.clone(), id.clone()));
                }
            }
        }

        for (name, id) in &unregisters {
            tracing::info!(name = %name, id = %id, "Unregistering endpoint");
            match self.backend.unregister(name, id).await {
                Ok(()) => {
                    summary.unregistered += 1;
                    let mut owned = self.owned.lock().await;
                    if owned.get(id) == Some(name) {
                        owned.remove(id);
                    }
                }
                Err(e) if e.is_validation() => {
                    tracing::warn!(name = %name, id = %id, error = %e, "Rejected unregister");
                }
                Err(e) => return Err(e.into()),
            }
        }

        for (name, endpoint) in &registers {
            tracing::info!(
                name = %name,
                id = %endpoint.id,
                address = %endpoint.address,
                port = endpoint.port,
                "Registering endpoint"
            );
            match self.backend.register(name, endpoint, ttl).await {
                Ok(()) => {
                    summary.registered += 1;
                    self.owned.lock().await.insert(endpoint.id.clone(), name.clone());
                }
                Err(e) if e.is_validation() => {
                    tracing::warn!(name = %name, id = %endpoint.id, error = %e, "Rejected register");
                }
                Err(e) => return Err(e.into()),
            }
        }

        metrics::record_reconcile_pass(summary.registered);
        tracing::debug!(
            workloads = workloads.len(),
            registered = summary.registered,
            unregistered = summary.unregistered,
            rejected = summary.rejected,
            "Reconciliation pass complete"
        );
        Ok(summary)
    }
}
