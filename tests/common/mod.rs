//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use proxywall::registry::{KeyCodec, MemoryBackend, MemoryStore, NetworkScope, ReadFilter, SnapshotStream};
use proxywall::workload::{
    Workload, WorkloadError, WorkloadEvent, WorkloadEventStream, WorkloadResult, WorkloadSource,
    WorkloadStatus,
};

/// Workload source whose listing and events are driven by the test.
#[derive(Default)]
pub struct FakeWorkloadSource {
    workloads: Mutex<Vec<Workload>>,
    events: Mutex<Option<mpsc::UnboundedSender<WorkloadResult<WorkloadEvent>>>>,
    failing: AtomicBool,
}

impl FakeWorkloadSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_workloads(&self, workloads: Vec<Workload>) {
        *self.workloads.lock().unwrap() = workloads;
    }

    /// Make `list` fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Deliver an event to the current subscriber. Returns false if none.
    pub fn send_event(&self, action: &str, id: &str) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx
                .send(Ok(WorkloadEvent {
                    action: action.to_string(),
                    id: id.to_string(),
                }))
                .is_ok(),
            None => false,
        }
    }

    /// End the current event stream.
    pub fn close_events(&self) {
        self.events.lock().unwrap().take();
    }

    pub fn subscribed(&self) -> bool {
        self.events.lock().unwrap().is_some()
    }
}

#[async_trait]
impl WorkloadSource for FakeWorkloadSource {
    async fn list(&self) -> WorkloadResult<Vec<Workload>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WorkloadError::Transport("engine unreachable".into()));
        }
        Ok(self.workloads.lock().unwrap().clone())
    }

    async fn events(&self) -> WorkloadResult<WorkloadEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        let events = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(events.boxed())
    }
}

/// A running container advertising `host:port` on `network` at `ip`.
pub fn workload(id: &str, host: &str, port: u16, network: &str, ip: &str) -> Workload {
    Workload {
        id: id.to_string(),
        env: vec![
            format!("VHOST={}", host),
            format!("VPORT={}", port),
            format!("VNETWORK={}", network),
        ],
        tty: false,
        status: WorkloadStatus::Running,
        networks: HashMap::from([(network.to_string(), ip.to_string())]),
    }
}

pub fn with_status(mut workload: Workload, status: &str) -> Workload {
    workload.status = WorkloadStatus::parse(status);
    workload
}

pub fn with_env(mut workload: Workload, entry: &str) -> Workload {
    workload.env.push(entry.to_string());
    workload
}

/// A memory backend over `store` seeing `networks`.
pub fn memory_backend(store: &Arc<MemoryStore>, networks: NetworkScope) -> MemoryBackend {
    MemoryBackend::with_store(store.clone(), KeyCodec::default(), ReadFilter::new(networks, Vec::new()))
}

/// Next snapshot from `stream`, failing the test after a second.
pub async fn next_snapshot(
    stream: &mut SnapshotStream,
) -> proxywall::registry::RegistryResult<Vec<proxywall::ServiceRecord>> {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot stream ended")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    eventually_within(Duration::from_secs(2), check).await
}

pub async fn eventually_within<F, Fut>(limit: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
