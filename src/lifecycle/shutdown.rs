//! Shutdown coordination for the manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::runtime::ContainerRuntime;
use crate::supervisor::spec::{ManagedProcessSpec, Role};

/// Process-wide cancellation.
///
/// Every long-running task observes the root token or a child of it, so
/// triggering the root reaches all of them.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    root: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token, for tasks that stop only on process shutdown.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// A token that can be cancelled on its own and is also cancelled
    /// with the root.
    pub fn child(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn trigger(&self) {
        self.root.cancel();
    }
}

struct RoleStop {
    spec: Arc<ManagedProcessSpec>,
    token: CancellationToken,
}

/// Rank in the stop sequence: the renderer goes first so it cannot
/// write a new file while the load balancer is going down.
fn stop_rank(role: Role) -> u8 {
    match role {
        Role::ConfigRenderer => 0,
        Role::LoadBalancer => 1,
    }
}

/// Stops every supervised role in a fixed order, then the rest of the
/// process.
pub struct ShutdownOrchestrator {
    shutdown: Shutdown,
    runtime: Arc<dyn ContainerRuntime>,
    roles: Vec<RoleStop>,
    grace: Duration,
    started: AtomicBool,
    draining: CancellationToken,
}

impl ShutdownOrchestrator {
    pub fn new(shutdown: Shutdown, runtime: Arc<dyn ContainerRuntime>, grace: Duration) -> Self {
        Self {
            shutdown,
            runtime,
            roles: Vec::new(),
            grace,
            started: AtomicBool::new(false),
            draining: CancellationToken::new(),
        }
    }

    /// Register a role and return the stop token its supervisor watches.
    pub fn register(&mut self, spec: Arc<ManagedProcessSpec>) -> CancellationToken {
        let token = self.shutdown.child();
        self.roles.push(RoleStop {
            spec,
            token: token.clone(),
        });
        self.roles.sort_by_key(|r| stop_rank(r.spec.role));
        token
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Cancelled as soon as a shutdown sequence begins, before any
    /// container is stopped.
    pub fn draining(&self) -> CancellationToken {
        self.draining.clone()
    }

    /// Run the shutdown sequence.
    ///
    /// Safe to call any number of times; only the first call acts and
    /// it returns `true`.
    pub async fn shutdown(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::info!("Shutdown already in progress");
            return false;
        }

        self.draining.cancel();
        tracing::info!(grace_secs = self.grace.as_secs(), "Shutting down supervised containers");
        let deadline = Instant::now() + self.grace;

        for role in &self.roles {
            role.token.cancel();
            self.stop_containers(&role.spec, deadline).await;
        }

        self.shutdown.trigger();
        tracing::info!("Shutdown sequence complete");
        true
    }

    /// Resolves once a shutdown sequence has finished.
    pub async fn finished(&self) {
        self.shutdown.token().cancelled().await;
    }

    /// Best-effort stop of every running container of one role, bounded
    /// by `deadline`.
    async fn stop_containers(&self, spec: &ManagedProcessSpec, deadline: Instant) {
        let stop_all = async {
            let running = match self.runtime.list_running(&spec.name).await {
                Ok(running) => running,
                Err(e) => {
                    tracing::warn!(role = %spec.role, error = %e, "Failed to list containers during shutdown");
                    return;
                }
            };
            for handle in running {
                tracing::info!(role = %spec.role, container = %handle, "Stopping container");
                if let Err(e) = self.runtime.stop(&handle, spec.stop_timeout).await {
                    tracing::warn!(role = %spec.role, container = %handle, error = %e, "Failed to stop container");
                }
            }
        };

        if tokio::time::timeout_at(deadline, stop_all).await.is_err() {
            tracing::warn!(role = %spec.role, "Gave up waiting for containers to stop, leaving them to runtime cleanup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_cancelled_with_root() {
        let shutdown = Shutdown::new();
        let child = shutdown.child();
        let other = shutdown.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!other.is_cancelled());
        assert!(!shutdown.token().is_cancelled());

        shutdown.trigger();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_renderer_stops_first() {
        assert!(stop_rank(Role::ConfigRenderer) < stop_rank(Role::LoadBalancer));
    }
}
