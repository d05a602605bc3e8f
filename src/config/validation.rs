//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Validate container naming inputs
//! - Reject reload signals that would end the load balancer
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{DetectorStrategy, ManagerConfig};
use crate::runtime::SignalKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid socket address: {value}")]
    Address { field: &'static str, value: String },

    #[error("runtime.namespace contains invalid characters: {0}")]
    Namespace(String),

    #[error("load_balancer.reload_signal {0} would stop the load balancer instead of reloading it")]
    TerminalReloadSignal(SignalKind),
}

/// Check a parsed configuration for values serde cannot reject on its own.
pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let namespace = &config.runtime.namespace;
    if namespace.is_empty() {
        errors.push(ValidationError::Empty { field: "runtime.namespace" });
    } else if !namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        // Docker container names only accept [a-zA-Z0-9][a-zA-Z0-9_.-]
        errors.push(ValidationError::Namespace(namespace.clone()));
    }

    if config.paths.service_name.is_empty() {
        errors.push(ValidationError::Empty { field: "paths.service_name" });
    }
    if config.paths.config_file_name.is_empty() {
        errors.push(ValidationError::Empty { field: "paths.config_file_name" });
    }
    if config.load_balancer.image.is_empty() {
        errors.push(ValidationError::Empty { field: "load_balancer.image" });
    }
    if config.renderer.enabled && config.renderer.image.is_empty() {
        errors.push(ValidationError::Empty { field: "renderer.image" });
    }
    if config.load_balancer.reload_signal.is_terminal() {
        errors.push(ValidationError::TerminalReloadSignal(config.load_balancer.reload_signal));
    }

    if config.detector.strategy == DetectorStrategy::Poll && config.detector.poll_interval_ms == 0 {
        errors.push(ValidationError::Zero { field: "detector.poll_interval_ms" });
    }
    if config.control.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "control.request_timeout_secs" });
    }

    if config.control.enabled && config.control.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "control.bind_address",
            value: config.control.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
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

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ManagerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ManagerConfig::default();
        config.runtime.namespace = "bad name".to_string();
        config.control.bind_address = "nowhere".to_string();
        config.detector.poll_interval_ms = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::Namespace("bad name".to_string())));
    }

    #[test]
    fn test_zero_interval_allowed_when_not_polling() {
        let mut config = ManagerConfig::default();
        config.detector.strategy = DetectorStrategy::Watch;
        config.detector.poll_interval_ms = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_terminal_reload_signal_rejected() {
        let mut config = ManagerConfig::default();
        for signal in [SignalKind::Kill, SignalKind::Terminate, SignalKind::Interrupt] {
            config.load_balancer.reload_signal = signal;
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors, vec![ValidationError::TerminalReloadSignal(signal)]);
        }

        config.load_balancer.reload_signal = SignalKind::User2;
        assert!(validate_config(&config).is_ok());
    }
}
