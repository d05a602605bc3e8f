//! Metrics collection and exposition.
//!
//! # Metrics
//! - `manager_container_starts_total` (counter): containers created, by role
//! - `manager_container_exits_total` (counter): supervised exits, by role
//! - `manager_supervision_state` (gauge): current state as its numeric code, by role
//! - `manager_reloads_total` (counter): reload attempts, by role and outcome
//! - `manager_config_changes_total` (counter): detected changes, by strategy
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter is optional and serves its own listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::supervisor::spec::Role;
use crate::supervisor::state::SupervisionState;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_container_start(role: Role) {
    metrics::counter!("manager_container_starts_total", "role" => role.as_str()).increment(1);
}

pub fn record_container_exit(role: Role) {
    metrics::counter!("manager_container_exits_total", "role" => role.as_str()).increment(1);
}

pub fn record_supervision_state(role: Role, state: SupervisionState) {
    metrics::gauge!("manager_supervision_state", "role" => role.as_str()).set(state as u8 as f64);
}

pub fn record_reload(role: Role, outcome: &'static str) {
    metrics::counter!(
        "manager_reloads_total",
        "role" => role.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_config_change(strategy: &'static str) {
    metrics::counter!("manager_config_changes_total", "strategy" => strategy).increment(1);
}
