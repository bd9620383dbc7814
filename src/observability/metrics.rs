//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define registry, reconciler and monitor metrics
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `proxywall_registry_ops_total` (counter): registry writes by op, outcome
//! - `proxywall_reconcile_passes_total` (counter): completed reconciliation passes
//! - `proxywall_reconcile_endpoints` (gauge): endpoints registered by the last pass
//! - `proxywall_render_cycles_total` (counter): config render cycles by outcome
//! - `proxywall_hook_exit_total` (counter): hook runs by hook, status
//! - `proxywall_supervisor_restarts_total` (counter): supervised task restarts
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed, so tests need no setup

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "error"
    }
}

/// Record a registry write.
pub fn record_registry_op(op: &'static str, ok: bool) {
    counter!("proxywall_registry_ops_total", "op" => op, "outcome" => outcome(ok)).increment(1);
}

/// Record a finished reconciliation pass.
pub fn record_reconcile_pass(registered: usize) {
    counter!("proxywall_reconcile_passes_total").increment(1);
    gauge!("proxywall_reconcile_endpoints").set(registered as f64);
}

/// Record a config render cycle.
pub fn record_render_cycle(ok: bool) {
    counter!("proxywall_render_cycles_total", "outcome" => outcome(ok)).increment(1);
}

/// Record a hook exit.
pub fn record_hook_exit(hook: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("proxywall_hook_exit_total", "hook" => hook, "status" => status).increment(1);
}

/// Record a supervised task restart.
pub fn record_supervisor_restart(task: &str) {
    counter!("proxywall_supervisor_restarts_total", "task" => task.to_string()).increment(1);
}
