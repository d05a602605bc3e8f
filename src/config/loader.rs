//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::ManagerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
///
/// Without a file every section takes its defaults.
pub fn load_config(path: Option<&Path>) -> Result<ManagerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ManagerConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay the deployment environment onto a parsed config.
///
/// This is the only place process environment is read; everything
/// downstream receives the resulting immutable struct.
pub fn apply_env_overrides<F>(config: &mut ManagerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(dir) = non_empty("CONFIG_DIR") {
        config.paths.config_dir = PathBuf::from(dir);
    }
    if let Some(name) = non_empty("SERVICE_NAME") {
        config.paths.service_name = name;
    }
    if let Some(id) = non_empty("INSTANCE_ID") {
        config.identity.instance_id = id;
    }
    if let Some(addr) = non_empty("CONSUL_ADDR") {
        config.identity.consul_addr = addr;
    }
    if let Some(host) = non_empty("DOCKER_HOST") {
        config.runtime.docker_host = Some(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SignalKind;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONFIG_DIR", "/srv/copilot"),
            ("INSTANCE_ID", "node-7"),
            ("CONSUL_ADDR", ""),
        ]);
        let mut config = ManagerConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.paths.config_dir, PathBuf::from("/srv/copilot"));
        assert_eq!(config.identity.instance_id, "node-7");
        // Empty values leave the default in place.
        assert_eq!(config.identity.consul_addr, "127.0.0.1:8500");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [runtime]
            namespace = "edge"

            [control]
            bind_address = "127.0.0.1:6000"
            "#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.runtime.namespace, "edge");
        assert_eq!(config.control.bind_address, "127.0.0.1:6000");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [detector]
            poll_interval_ms = 0
            "#
        )
        .unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_kill_as_reload_signal_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [load_balancer]
            reload_signal = "SIGKILL"
            "#
        )
        .unwrap();

        match load_config(Some(file.path())).unwrap_err() {
            ConfigError::Validation(errors) => assert_eq!(
                errors,
                vec![ValidationError::TerminalReloadSignal(SignalKind::Kill)]
            ),
            other => panic!("unexpected error: {other}"),
        }
    }
}
