//! Config monitor subsystem.
//!
//! # Data Flow
//! ```text
//! registry watch / template change
//!     → pre-hook (optional, must succeed)
//!     → lookall
//!     → template.rs (render records)
//!     → writer.rs (atomic replace of the destination)
//!     → post-hook (reload the consumer)
//! ```

pub mod config_monitor;
pub mod template;
pub mod template_watch;
pub mod writer;

pub use config_monitor::{ConfigMonitor, MonitorError, MonitorSettings};
pub use template::render;
pub use writer::write_atomic;
