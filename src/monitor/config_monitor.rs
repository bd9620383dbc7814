//! Watch-driven render loop.
//!
//! # Responsibilities
//! - Run one render cycle at startup, then one per registry change
//! - Re-render when the template file itself changes
//! - Drive the pre and post hooks around each render
//!
//! # Design Decisions
//! - Each cycle re-reads the full listing instead of trusting the snapshot
//! - A failing pre-hook aborts the cycle; a failing post-hook only warns
//! - Any error ends `run` and the supervisor re-subscribes after backoff

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::command::{self, CommandError, HookCommand};
use crate::config::ProxywallConfig;
use crate::monitor::template;
use crate::monitor::template_watch::TemplateWatcher;
use crate::monitor::writer::write_atomic;
use crate::observability::metrics;
use crate::registry::{Backend, RegistryError};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("missing setting: {0}")]
    NotConfigured(&'static str),

    #[error("failed to read template {path:?}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render template: {0}")]
    Render(#[from] minijinja::Error),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pre-hook '{command}' exited with {status:?}: {stderr}")]
    PreHookFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("hook error: {0}")]
    Hook(#[from] CommandError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("template watch error: {0}")]
    TemplateWatch(#[from] notify::Error),

    #[error("registry watch closed")]
    WatchClosed,
}

/// Resolved monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub template: PathBuf,
    pub destination: PathBuf,
    pub pre_hook: Option<HookCommand>,
    pub post_hook: HookCommand,
    pub watch_template: bool,
}

impl MonitorSettings {
    pub fn from_config(config: &ProxywallConfig) -> Result<Self, MonitorError> {
        Ok(Self {
            template: config
                .template
                .source
                .clone()
                .ok_or(MonitorError::NotConfigured("template.source"))?,
            destination: config
                .template
                .destination
                .clone()
                .ok_or(MonitorError::NotConfigured("template.destination"))?,
            pre_hook: config.hooks.pre.clone().filter(|h| !h.is_empty()),
            post_hook: config
                .hooks
                .post
                .clone()
                .filter(|h| !h.is_empty())
                .ok_or(MonitorError::NotConfigured("hooks.post"))?,
            watch_template: config.template.watch_source,
        })
    }
}

/// Renders the registry listing into a config file and reloads its consumer.
#[derive(Clone)]
pub struct ConfigMonitor {
    backend: Arc<dyn Backend>,
    settings: MonitorSettings,
}

impl ConfigMonitor {
    pub fn new(backend: Arc<dyn Backend>, settings: MonitorSettings) -> Self {
        Self { backend, settings }
    }

    /// Subscribe, render once, then render on every change until an error.
    pub async fn run(&self) -> Result<(), MonitorError> {
        let mut snapshots = self.backend.watches(None, true).await?;

        let (_watcher, mut template_changes) = if self.settings.watch_template {
            let (watcher, rx) = TemplateWatcher::new(&self.settings.template).run()?;
            (Some(watcher), Some(rx))
        } else {
            (None, None)
        };

        tracing::info!(
            template = ?self.settings.template,
            destination = ?self.settings.destination,
            "Config monitor starting"
        );
        self.cycle().await?;

        loop {
            tokio::select! {
                snapshot = snapshots.next() => match snapshot {
                    Some(Ok(records)) => {
                        tracing::debug!(records = records.len(), "Registry change observed");
                        self.cycle().await?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(MonitorError::WatchClosed),
                },
                Some(()) = next_change(&mut template_changes) => {
                    self.cycle().await?;
                }
            }
        }
    }

    /// One pass: pre-hook, listing, render, write, post-hook.
    pub async fn cycle(&self) -> Result<(), MonitorError> {
        let result = self.cycle_inner().await;
        metrics::record_render_cycle(result.is_ok());
        result
    }

    async fn cycle_inner(&self) -> Result<(), MonitorError> {
        if let Some(pre) = &self.settings.pre_hook {
            let output = command::run(pre, None).await?;
            metrics::record_hook_exit("pre", output.success());
            if !output.success() {
                return Err(MonitorError::PreHookFailed {
                    command: pre.to_string(),
                    status: output.status,
                    stderr: output.stderr_lossy().trim().to_string(),
                });
            }
        }

        let records = self.backend.lookall(None).await?;

        let source = tokio::fs::read_to_string(&self.settings.template)
            .await
            .map_err(|source| MonitorError::TemplateRead {
                path: self.settings.template.clone(),
                source,
            })?;
        let rendered = template::render(&source, &records)?;

        write_atomic(&self.settings.destination, rendered.as_bytes())
            .await
            .map_err(|source| MonitorError::Write {
                path: self.settings.destination.clone(),
                source,
            })?;
        tracing::info!(
            destination = ?self.settings.destination,
            records = records.len(),
            "Config rendered"
        );

        let post = &self.settings.post_hook;
        let output = command::run(post, None).await?;
        metrics::record_hook_exit("post", output.success());
        if !output.success() {
            tracing::warn!(
                command = %post,
                status = ?output.status,
                stderr = %output.stderr_lossy().trim(),
                "Post-hook exited unsuccessfully"
            );
        }

        Ok(())
    }
}

async fn next_change(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
