//! Workload source abstraction.
//!
//! A workload is anything that runs a service and can advertise routing
//! metadata through its environment. The reconciler only needs two things
//! from a source: a full listing and a stream of lifecycle events.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("invalid workload source URL '{0}'")]
    InvalidUrl(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request to {path} failed with status {status}: {body}")]
    Status { path: String, status: u16, body: String },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("event stream closed")]
    StreamClosed,
}

pub type WorkloadResult<T> = Result<T, WorkloadError>;

/// Runtime state of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other(String),
}

impl WorkloadStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "created" => WorkloadStatus::Created,
            "running" => WorkloadStatus::Running,
            "paused" => WorkloadStatus::Paused,
            "restarting" => WorkloadStatus::Restarting,
            "removing" => WorkloadStatus::Removing,
            "exited" => WorkloadStatus::Exited,
            "dead" => WorkloadStatus::Dead,
            other => WorkloadStatus::Other(other.to_string()),
        }
    }

    /// Whether the workload cannot serve traffic and should be withdrawn.
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            WorkloadStatus::Paused | WorkloadStatus::Exited | WorkloadStatus::Dead
        )
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadStatus::Created => "created",
            WorkloadStatus::Running => "running",
            WorkloadStatus::Paused => "paused",
            WorkloadStatus::Restarting => "restarting",
            WorkloadStatus::Removing => "removing",
            WorkloadStatus::Exited => "exited",
            WorkloadStatus::Dead => "dead",
            WorkloadStatus::Other(s) => s,
        };
        write!(f, "{}", s)
    }
}

/// Metadata of one workload as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub id: String,
    /// Raw `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    pub tty: bool,
    pub status: WorkloadStatus,
    /// Network name to IP address.
    pub networks: HashMap<String, String>,
}

/// A lifecycle event for one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadEvent {
    pub action: String,
    pub id: String,
}

/// Events the reconciler reacts to.
pub const WATCHED_ACTIONS: &[&str] = &["start", "stop", "pause", "unpause", "die", "destroy"];

pub type WorkloadEventStream = BoxStream<'static, WorkloadResult<WorkloadEvent>>;

/// Where workloads come from.
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// Every known workload, running or not.
    async fn list(&self) -> WorkloadResult<Vec<Workload>>;

    /// Subscribe to lifecycle events. The subscription is live when this returns.
    async fn events(&self) -> WorkloadResult<WorkloadEventStream>;
}
