//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for proxywall.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::command::HookCommand;
use crate::workload::docker::DEFAULT_DOCKER_URL;

/// Root configuration shared by the agent and the daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxywallConfig {
    /// Registry backend location and read filter.
    pub registry: RegistryConfig,

    /// Workload source (agent only).
    pub docker: DockerConfig,

    /// Reconciliation strategy (agent only).
    pub reconcile: ReconcileConfig,

    /// Template input and rendered output (daemon only).
    pub template: TemplateConfig,

    /// Commands run around each render (daemon only).
    pub hooks: HooksConfig,

    /// Restart backoff for the main loop.
    pub supervisor: SupervisorConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Backend URL, e.g. `etcd://127.0.0.1:2379/proxywall`.
    pub url: Option<String>,

    /// Networks whose endpoints are visible when the URL names none.
    /// `*` makes every network visible.
    pub networks: Vec<String>,
}

/// Docker engine connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// `unix:///path/to/socket`, `tcp://host:port` or `http://host:port`.
    pub url: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DOCKER_URL.to_string(),
        }
    }
}

/// How the agent keeps the registry current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileMode {
    /// Resync on container lifecycle events; persistent registrations.
    #[default]
    Events,
    /// Resync on a timer; registrations expire unless refreshed.
    Heartbeat,
}

/// Reconciliation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub mode: ReconcileMode,

    /// Seconds between heartbeat passes.
    pub interval_secs: u64,

    /// Lifetime of heartbeat registrations in seconds.
    pub ttl_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            mode: ReconcileMode::Events,
            interval_secs: 30,
            ttl_secs: 60,
        }
    }
}

/// Template settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template file path.
    pub source: Option<PathBuf>,

    /// Rendered output path.
    pub destination: Option<PathBuf>,

    /// Re-render when the template file changes.
    pub watch_source: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            source: None,
            destination: None,
            watch_source: true,
        }
    }
}

/// Render hooks.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HooksConfig {
    /// Run before each render; a failure skips the render.
    pub pre: Option<HookCommand>,

    /// Run after each render, typically a reload command.
    pub post: Option<HookCommand>,
}

/// Supervisor backoff bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            min_secs: 2,
            max_secs: 64,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ProxywallConfig = toml::from_str("").unwrap();
        assert!(config.registry.url.is_none());
        assert_eq!(config.docker.url, DEFAULT_DOCKER_URL);
        assert_eq!(config.reconcile.mode, ReconcileMode::Events);
        assert_eq!(config.reconcile.interval_secs, 30);
        assert_eq!(config.reconcile.ttl_secs, 60);
        assert_eq!(config.supervisor.min_secs, 2);
        assert_eq!(config.supervisor.max_secs, 64);
        assert!(config.template.watch_source);
    }

    #[test]
    fn test_full_config() {
        let raw = r#"
            [registry]
            url = "etcd://10.0.0.1:2379,10.0.0.2:2379/proxywall"
            networks = ["front"]

            [reconcile]
            mode = "heartbeat"
            interval_secs = 10
            ttl_secs = 30

            [template]
            source = "/etc/proxywall/nginx.conf.j2"
            destination = "/etc/nginx/conf.d/proxywall.conf"

            [hooks]
            pre = ["nginx", "-t"]
            post = "nginx -s reload"

            [observability]
            log_format = "json"
        "#;
        let config: ProxywallConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.reconcile.mode, ReconcileMode::Heartbeat);
        assert_eq!(config.registry.networks, vec!["front"]);
        assert_eq!(
            config.hooks.pre,
            Some(HookCommand::Argv(vec!["nginx".into(), "-t".into()]))
        );
        assert_eq!(config.hooks.post, Some(HookCommand::Shell("nginx -s reload".into())));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
