//! Top-level error type for running the manager.

use thiserror::Error;

use crate::config::ConfigError;
use crate::lifecycle::startup::StartupError;
use crate::supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to watch configuration file: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
