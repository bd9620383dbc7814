//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that each role has the settings it needs
//! - Validate value ranges (backoff bounds, heartbeat TTL, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: (ProxywallConfig, Role) → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxywallConfig, ReconcileMode};
use crate::registry::{BackendUrl, SUPPORTED_SCHEMES};

/// Which binary mode the configuration is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Agent,
    Daemon,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("registry.url is required")]
    MissingRegistryUrl,

    #[error("registry.url is invalid: {0}")]
    InvalidRegistryUrl(String),

    #[error("{0} is required for the daemon")]
    MissingDaemonSetting(&'static str),

    #[error("supervisor.min_secs must be greater than zero")]
    ZeroBackoff,

    #[error("supervisor.min_secs ({min}) must not exceed supervisor.max_secs ({max})")]
    InvertedBackoff { min: u64, max: u64 },

    #[error("reconcile.interval_secs must be greater than zero")]
    ZeroInterval,

    #[error("reconcile.ttl_secs ({ttl}) must be greater than reconcile.interval_secs ({interval})")]
    TtlNotAboveInterval { ttl: u64, interval: u64 },

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check `config` for `role`, collecting every problem found.
pub fn validate_config(config: &ProxywallConfig, role: Role) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut url_names_networks = false;

    match config.registry.url.as_deref().map(str::trim) {
        None | Some("") => errors.push(ValidationError::MissingRegistryUrl),
        Some(url) => {
            match BackendUrl::parse(url) {
                Ok(parsed) if !SUPPORTED_SCHEMES.contains(&parsed.scheme.as_str()) => {
                    errors.push(ValidationError::InvalidRegistryUrl(format!(
                        "unsupported scheme '{}'",
                        parsed.scheme
                    )));
                }
                Ok(parsed) => url_names_networks = parsed.networks.is_some(),
                Err(e) => errors.push(ValidationError::InvalidRegistryUrl(e.to_string())),
            }
        }
    }

    let supervisor = &config.supervisor;
    if supervisor.min_secs == 0 {
        errors.push(ValidationError::ZeroBackoff);
    } else if supervisor.min_secs > supervisor.max_secs {
        errors.push(ValidationError::InvertedBackoff {
            min: supervisor.min_secs,
            max: supervisor.max_secs,
        });
    }

    match role {
        Role::Agent => {
            let reconcile = &config.reconcile;
            if reconcile.mode == ReconcileMode::Heartbeat {
                if reconcile.interval_secs == 0 {
                    errors.push(ValidationError::ZeroInterval);
                } else if reconcile.ttl_secs <= reconcile.interval_secs {
                    errors.push(ValidationError::TtlNotAboveInterval {
                        ttl: reconcile.ttl_secs,
                        interval: reconcile.interval_secs,
                    });
                }
            }
        }
        Role::Daemon => {
            if config.registry.networks.is_empty() && !url_names_networks {
                errors.push(ValidationError::MissingDaemonSetting("registry.networks"));
            }
            if config.template.source.is_none() {
                errors.push(ValidationError::MissingDaemonSetting("template.source"));
            }
            if config.template.destination.is_none() {
                errors.push(ValidationError::MissingDaemonSetting("template.destination"));
            }
            if config.hooks.post.as_ref().map_or(true, |h| h.is_empty()) {
                errors.push(ValidationError::MissingDaemonSetting("hooks.post"));
            }
        }
        Role::Client => {}
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::HookCommand;

    fn base() -> ProxywallConfig {
        let mut config = ProxywallConfig::default();
        config.registry.url = Some("memory:///proxywall".into());
        config
    }

    #[test]
    fn test_valid_agent() {
        assert_eq!(validate_config(&base(), Role::Agent), Ok(()));
    }

    #[test]
    fn test_missing_registry_url() {
        let errors = validate_config(&ProxywallConfig::default(), Role::Client).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingRegistryUrl]);
    }

    #[test]
    fn test_daemon_collects_all_errors() {
        let errors = validate_config(&base(), Role::Daemon).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingDaemonSetting("registry.networks"),
                ValidationError::MissingDaemonSetting("template.source"),
                ValidationError::MissingDaemonSetting("template.destination"),
                ValidationError::MissingDaemonSetting("hooks.post"),
            ]
        );

        let mut config = base();
        config.registry.networks = vec!["front".into()];
        config.template.source = Some("in.j2".into());
        config.template.destination = Some("out.conf".into());
        config.hooks.post = Some(HookCommand::Shell("true".into()));
        assert_eq!(validate_config(&config, Role::Daemon), Ok(()));

        config.registry.networks.clear();
        config.registry.url = Some("memory:///?networks=*".into());
        assert_eq!(validate_config(&config, Role::Daemon), Ok(()));
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = base();
        config.supervisor.min_secs = 0;
        assert_eq!(
            validate_config(&config, Role::Client).unwrap_err(),
            vec![ValidationError::ZeroBackoff]
        );

        config.supervisor.min_secs = 10;
        config.supervisor.max_secs = 5;
        assert_eq!(
            validate_config(&config, Role::Client).unwrap_err(),
            vec![ValidationError::InvertedBackoff { min: 10, max: 5 }]
        );
    }

    #[test]
    fn test_heartbeat_ttl_must_exceed_interval() {
        let mut config = base();
        config.reconcile.mode = ReconcileMode::Heartbeat;
        config.reconcile.interval_secs = 30;
        config.reconcile.ttl_secs = 30;
        assert_eq!(
            validate_config(&config, Role::Agent).unwrap_err(),
            vec![ValidationError::TtlNotAboveInterval { ttl: 30, interval: 30 }]
        );
        // Only checked for the agent.
        assert_eq!(validate_config(&config, Role::Client), Ok(()));
    }

    #[test]
    fn test_bad_url_and_metrics_address() {
        let mut config = base();
        config.registry.url = Some("zookeeper://x".into());
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();
        let errors = validate_config(&config, Role::Client).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::InvalidRegistryUrl(_)));
        assert_eq!(errors[1], ValidationError::InvalidMetricsAddress("nowhere".into()));
    }
}
