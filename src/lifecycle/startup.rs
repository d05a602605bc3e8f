//! Startup preconditions.
//!
//! # Responsibilities
//! - Ensure the service configuration directory exists
//! - Connect to the container runtime
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing is supervised until both preconditions hold

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ManagerConfig;
use crate::runtime::{DockerRuntime, RuntimeError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to create configuration directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Create `<config_dir>/services/<service>` if it does not exist.
pub async fn ensure_config_directory(config: &ManagerConfig) -> Result<PathBuf, StartupError> {
    let path = config.service_dir();
    tracing::info!(path = ?path, "Ensuring the configuration path exists");

    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|source| StartupError::Directory {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

pub async fn connect_runtime(config: &ManagerConfig) -> Result<DockerRuntime, StartupError> {
    let runtime = DockerRuntime::connect(config.runtime.docker_host.as_deref()).await?;
    tracing::info!("Connected to container runtime");
    Ok(runtime)
}
