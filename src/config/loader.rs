//! Configuration loading from disk and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use crate::command::HookCommand;
use crate::config::schema::ProxywallConfig;
use crate::config::validation::{validate_config, Role, ValidationError};
use crate::registry::backend_url::split_list;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse configuration from a TOML file. Validation happens separately,
/// once overrides are applied.
pub fn load_config(path: &Path) -> Result<ProxywallConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<ProxywallConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Load from `path` when given, else start from defaults, then apply
/// `overrides` and validate for `role`.
pub fn resolve_config(
    path: Option<&Path>,
    overrides: &Overrides,
    role: Role,
) -> Result<ProxywallConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ProxywallConfig::default(),
    };
    overrides.apply(&mut config);
    validate_config(&config, role).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Values supplied on the command line or through the environment.
/// Each one set replaces the corresponding file setting.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<String>,
    pub networks: Option<String>,
    pub docker_url: Option<String>,
    pub template_source: Option<PathBuf>,
    pub template_destination: Option<PathBuf>,
    pub pre_hook: Option<String>,
    pub post_hook: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ProxywallConfig) {
        if let Some(backend) = &self.backend {
            config.registry.url = Some(backend.clone());
        }
        if let Some(networks) = &self.networks {
            config.registry.networks = split_list(networks);
        }
        if let Some(url) = &self.docker_url {
            config.docker.url = url.clone();
        }
        if let Some(source) = &self.template_source {
            config.template.source = Some(source.clone());
        }
        if let Some(destination) = &self.template_destination {
            config.template.destination = Some(destination.clone());
        }
        if let Some(pre) = &self.pre_hook {
            config.hooks.pre = Some(HookCommand::Shell(pre.clone()));
        }
        if let Some(post) = &self.post_hook {
            config.hooks.post = Some(HookCommand::Shell(post.clone()));
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
