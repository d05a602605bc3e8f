//! Container runtime facade.
//!
//! # Data Flow
//! ```text
//! supervisor ──┐
//! reload ──────┼──▶ ContainerRuntime (trait) ──▶ docker.rs (bollard) ──▶ Docker Engine
//! shutdown ────┘
//! ```
//!
//! # Design Decisions
//! - Containers are addressed by logical name (`<namespace>.<role>`) only;
//!   runtime ids are never assumed stable across restarts
//! - One shared, stateless client behind `Arc<dyn ContainerRuntime>`
//! - Stopping or killing a container that is already gone is not an error

pub mod docker;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::supervisor::spec::ManagedProcessSpec;

pub use docker::DockerRuntime;

/// Runtime-assigned identity of one running container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Abbreviated id for log lines.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.short_id())
    }
}

/// How a container stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
}

/// Signals the manager sends to managed containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SignalKind {
    #[serde(rename = "SIGHUP")]
    Hangup,
    #[serde(rename = "SIGUSR1")]
    User1,
    #[serde(rename = "SIGUSR2")]
    User2,
    #[serde(rename = "SIGINT")]
    Interrupt,
    #[serde(rename = "SIGTERM")]
    Terminate,
    #[serde(rename = "SIGKILL")]
    Kill,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Hangup => "SIGHUP",
            SignalKind::User1 => "SIGUSR1",
            SignalKind::User2 => "SIGUSR2",
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
            SignalKind::Kill => "SIGKILL",
        }
    }

    /// Whether delivering this signal ends the process rather than
    /// asking it to re-read its configuration.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SignalKind::Interrupt | SignalKind::Terminate | SignalKind::Kill
        )
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("Failed to pull image {image}: {message}")]
    Pull { image: String, message: String },

    #[error("Failed to create container {name}: {message}")]
    Create { name: String, message: String },

    #[error("Container {0} not found")]
    NotFound(String),

    #[error("Runtime request failed: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Capability over the container runtime.
///
/// Every call is a single request to the underlying runtime. Callers
/// decide whether a failure is fatal.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Find the running container registered under `name`, if any.
    async fn is_running(&self, name: &str) -> Result<Option<ContainerHandle>>;

    /// Pull the spec's image and create (but not start) its container.
    async fn create(&self, spec: &ManagedProcessSpec) -> Result<ContainerHandle>;

    async fn start(&self, handle: &ContainerHandle) -> Result<()>;

    /// Ask the container to stop, killing it after `timeout`.
    async fn stop(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()>;

    /// Deliver `signal` to the container's main process.
    async fn signal(&self, handle: &ContainerHandle, signal: SignalKind) -> Result<()>;

    async fn kill(&self, handle: &ContainerHandle) -> Result<()>;

    /// Block until the container is no longer running.
    ///
    /// Dropping the returned future abandons the wait without affecting
    /// the container.
    async fn wait_exit(&self, handle: &ContainerHandle) -> Result<ExitStatus>;

    /// Every running container registered under `name`.
    async fn list_running(&self, name: &str) -> Result<Vec<ContainerHandle>>;
}
