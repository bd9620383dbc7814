//! Workload reconciliation subsystem.
//!
//! # Data Flow
//! ```text
//! WorkloadSource (docker.rs)
//!     → list / events
//!     → extract.rs (environment → Register / Unregister)
//!     → reconciler.rs (unregisters first, then registers)
//!     → registry Backend
//! ```
//!
//! # Design Decisions
//! - The source is a trait so the reconciler runs against fakes in tests
//! - Extraction is pure; the reconciler owns all I/O and logging

pub mod docker;
pub mod extract;
pub mod reconciler;
pub mod source;

pub use docker::DockerSource;
pub use extract::{extract, Action, ExtractError};
pub use reconciler::{PassSummary, ReconcileError, Reconciler};
pub use source::{
    Workload, WorkloadError, WorkloadEvent, WorkloadEventStream, WorkloadResult, WorkloadSource,
    WorkloadStatus,
};
