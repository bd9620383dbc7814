//! Dynamic service registration and reverse-proxy configuration.

pub mod command;
pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod workload;

pub use config::ProxywallConfig;
pub use lifecycle::Shutdown;
pub use registry::{Backend, Endpoint, ServiceRecord};
