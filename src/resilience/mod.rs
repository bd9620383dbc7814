//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Long-running loop (reconciler, config monitor):
//!     → supervisor.rs (run the loop, catch its error)
//!     → backoff.rs (pick the next sleep: doubling, wrapping back to min)
//!     → sleep, then restart the whole loop from scratch
//!     → shutdown signal ends supervision without error
//! ```
//!
//! # Design Decisions
//! - Loops propagate every non-validation failure instead of retrying locally
//! - Restarting the whole loop re-subscribes watches and event streams
//! - Backoff is deterministic (no jitter) so restarts are predictable in logs

pub mod backoff;
pub mod supervisor;

pub use backoff::Backoff;
pub use supervisor::Supervisor;
