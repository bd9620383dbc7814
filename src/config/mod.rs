//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → Overrides (CLI flags / PROXYWALL_* environment)
//!     → validation.rs (semantic checks for the running role)
//!     → ProxywallConfig (validated, immutable)
//!     → passed by reference to the subsystems that need it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, resolve_config, ConfigError, Overrides};
pub use schema::{
    DockerConfig, HooksConfig, LogFormat, ObservabilityConfig, ProxywallConfig, ReconcileConfig,
    ReconcileMode, RegistryConfig, SupervisorConfig, TemplateConfig,
};
pub use validation::{validate_config, Role, ValidationError};
