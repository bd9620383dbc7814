//! proxywall: dynamic service registration and reverse-proxy configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   list / events   ┌──────────────────┐
//!   │ docker engine│──────────────────▶│  proxywall agent │
//!   └──────────────┘                   │  (reconciler)    │
//!                                      └────────┬─────────┘
//!                                               │ register / unregister
//!                                               ▼
//!                                      ┌──────────────────┐
//!                                      │  registry (etcd) │
//!                                      └────────┬─────────┘
//!                                               │ watch
//!                                               ▼
//!   ┌──────────────┐   render + hooks  ┌──────────────────┐
//!   │ proxy config │◀──────────────────│ proxywall daemon │
//!   │ + reload     │                   │ (config monitor) │
//!   └──────────────┘                   └──────────────────┘
//!
//!   Cross-cutting: config, lifecycle (shutdown, signals),
//!   resilience (supervisor), observability (logs, metrics)
//! ```
//!
//! Both loops run under the supervisor: transient failures are retried with
//! backoff and only a signal stops the process once startup succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use proxywall::config::{resolve_config, Overrides, Role};
use proxywall::lifecycle::signals::spawn_signal_handler;
use proxywall::lifecycle::Shutdown;
use proxywall::monitor::{ConfigMonitor, MonitorSettings};
use proxywall::observability::{logging, metrics};
use proxywall::registry::{self, BackendUrl, NetworkScope};
use proxywall::resilience::Supervisor;
use proxywall::workload::{DockerSource, Reconciler};

#[derive(Parser)]
#[command(name = "proxywall", version)]
#[command(about = "Register containers in a service registry and render proxy configs from it", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "PROXYWALL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Registry backend URL, e.g. etcd://127.0.0.1:2379/proxywall
    #[arg(short, long, env = "PROXYWALL_BACKEND", global = true)]
    backend: Option<String>,

    /// Visible networks, separated by ',', ';' or whitespace.
    #[arg(short, long, env = "PROXYWALL_NETWORKS", global = true)]
    networks: Option<String>,

    /// Log level for proxywall's own events.
    #[arg(long, env = "PROXYWALL_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror local containers into the registry
    Agent {
        /// Docker engine URL (unix:///var/run/docker.sock, tcp://host:port)
        #[arg(long, env = "PROXYWALL_DOCKER_URL")]
        docker_url: Option<String>,
    },
    /// Render the proxy config from the registry and reload the proxy
    Daemon {
        /// Template file.
        #[arg(long, env = "PROXYWALL_TEMPLATE_SRC")]
        template_src: Option<PathBuf>,

        /// Rendered config destination.
        #[arg(long, env = "PROXYWALL_TEMPLATE_DEST")]
        template_dest: Option<PathBuf>,

        /// Command run before each render; a failure skips the render.
        #[arg(long, env = "PROXYWALL_PREV_CMD")]
        pre_cmd: Option<String>,

        /// Command run after each render, typically a reload.
        #[arg(long, env = "PROXYWALL_POST_CMD")]
        post_cmd: Option<String>,
    },
}

impl Cli {
    fn role_and_overrides(&self) -> (Role, Overrides) {
        let mut overrides = Overrides {
            backend: self.backend.clone(),
            networks: self.networks.clone(),
            log_level: self.log_level.clone(),
            ..Default::default()
        };
        let role = match &self.command {
            Command::Agent { docker_url } => {
                overrides.docker_url = docker_url.clone();
                Role::Agent
            }
            Command::Daemon {
                template_src,
                template_dest,
                pre_cmd,
                post_cmd,
            } => {
                overrides.template_source = template_src.clone();
                overrides.template_destination = template_dest.clone();
                overrides.pre_hook = pre_cmd.clone();
                overrides.post_hook = post_cmd.clone();
                Role::Daemon
            }
        };
        (role, overrides)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (role, overrides) = cli.role_and_overrides();

    let config = resolve_config(cli.config.as_deref(), &overrides, role)?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), role = ?role, "proxywall starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry_url = config.registry.url.as_deref().ok_or("registry.url is required")?;
    let url = BackendUrl::parse(registry_url)?;
    let networks = NetworkScope::from_tokens(&config.registry.networks);

    let shutdown = Shutdown::new();
    let _signals = spawn_signal_handler(shutdown.clone());
    let supervisor = Supervisor::from_config(&config.supervisor);

    let backend = match supervisor
        .supervise("registry-connect", shutdown.subscribe(), || {
            registry::connect(&url, networks.clone())
        })
        .await
    {
        Some(backend) => backend,
        None => {
            tracing::info!("Shutdown before registry connection was established");
            return Ok(());
        }
    };
    tracing::info!(scheme = %url.scheme, root = %url.root, "Registry connected");

    match &cli.command {
        Command::Agent { .. } => {
            let source = Arc::new(DockerSource::new(&config.docker.url)?);
            let reconciler = Reconciler::new(source, backend, config.reconcile.clone());
            supervisor
                .supervise("reconciler", shutdown.subscribe(), move || {
                    let reconciler = reconciler.clone();
                    async move { reconciler.run().await }
                })
                .await;
        }
        Command::Daemon { .. } => {
            let settings = MonitorSettings::from_config(&config)?;
            let monitor = ConfigMonitor::new(backend, settings);
            supervisor
                .supervise("config-monitor", shutdown.subscribe(), move || {
                    let monitor = monitor.clone();
                    async move { monitor.run().await }
                })
                .await;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
