//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Init logging/metrics → Connect registry → Start loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Supervisor stops its loop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Fail fast at startup: configuration problems exit non-zero
//! - After startup nothing transient terminates the process
//! - No rollback on shutdown: every registry write is independently idempotent

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
