//! Signal-only reload of running containers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::detector::Fingerprint;
use crate::observability::metrics;
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::supervisor::spec::{ManagedProcessSpec, Role};

/// Why a reload was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadTrigger {
    /// The change detector saw the rendered file change. `fingerprint` is
    /// the content it read, or `None` when the content is unknown.
    FileChanged { fingerprint: Option<Fingerprint> },
    /// A configure call wrote new content with this fingerprint.
    Configure { fingerprint: Fingerprint },
}

impl ReloadTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReloadTrigger::FileChanged { .. } => "file_changed",
            ReloadTrigger::Configure { .. } => "configure",
        }
    }

    /// Content this trigger is about, when known.
    pub fn fingerprint(&self) -> Option<Fingerprint> {
        match self {
            ReloadTrigger::FileChanged { fingerprint } => *fingerprint,
            ReloadTrigger::Configure { fingerprint } => Some(*fingerprint),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub role: Role,
    pub trigger: ReloadTrigger,
}

impl ReloadRequest {
    pub fn new(role: Role, trigger: ReloadTrigger) -> Self {
        Self { role, trigger }
    }
}

/// Result of one reload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReloadOutcome {
    /// The reload signal went out to `delivered` containers.
    Signalled { delivered: usize, failed: usize },
    /// No running container to signal.
    NotRunning,
    /// The running containers were already signalled for this content.
    AlreadyApplied,
}

impl ReloadOutcome {
    fn label(&self) -> &'static str {
        match self {
            ReloadOutcome::Signalled { failed: 0, .. } => "signalled",
            ReloadOutcome::Signalled { delivered: 0, .. } => "failed",
            ReloadOutcome::Signalled { .. } => "partial",
            ReloadOutcome::NotRunning => "not_running",
            ReloadOutcome::AlreadyApplied => "already_applied",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("role {0} has no reload signal")]
    NotReloadable(Role),

    #[error("failed to list containers for {role}: {source}")]
    List {
        role: Role,
        #[source]
        source: RuntimeError,
    },
}

/// Counters exposed through the status endpoint.
#[derive(Debug, Default)]
struct ReloadStats {
    signalled: AtomicU64,
    not_running: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadStatsSnapshot {
    pub signalled: u64,
    pub not_running: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Sending half of the reload queue. Never blocks.
#[derive(Debug, Clone)]
pub struct ReloadSender {
    tx: mpsc::UnboundedSender<ReloadRequest>,
}

impl ReloadSender {
    pub fn request(&self, role: Role, trigger: ReloadTrigger) {
        if self.tx.send(ReloadRequest::new(role, trigger)).is_err() {
            tracing::debug!(role = %role, "Reload queue closed, dropping request");
        }
    }
}

/// Create the queue between change detection and the coordinator.
pub fn reload_channel() -> (ReloadSender, mpsc::UnboundedReceiver<ReloadRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReloadSender { tx }, rx)
}

/// Delivers reload signals to running containers.
///
/// Never creates, stops, or restarts a container; that belongs to the
/// supervisors.
///
/// A configure call and the change detector both see the same write, so a
/// request whose content matches the last signalled content for its role is
/// skipped. Requests without a fingerprint always signal.
pub struct ReloadCoordinator {
    runtime: Arc<dyn ContainerRuntime>,
    targets: HashMap<Role, Arc<ManagedProcessSpec>>,
    // Held across a whole reload so concurrent requests are serialized.
    last_signalled: Mutex<HashMap<Role, Fingerprint>>,
    stats: ReloadStats,
}

impl ReloadCoordinator {
    /// Build a coordinator for every spec that declares a reload signal.
    pub fn new<I>(runtime: Arc<dyn ContainerRuntime>, specs: I) -> Self
    where
        I: IntoIterator<Item = Arc<ManagedProcessSpec>>,
    {
        let targets = specs
            .into_iter()
            .filter(|spec| spec.reload_signal.is_some())
            .map(|spec| (spec.role, spec))
            .collect();

        Self {
            runtime,
            targets,
            last_signalled: Mutex::new(HashMap::new()),
            stats: ReloadStats::default(),
        }
    }

    /// Signal every running container of `request.role` to re-read its
    /// configuration.
    pub async fn reload(&self, request: &ReloadRequest) -> Result<ReloadOutcome, ReloadError> {
        let role = request.role;
        let spec = self
            .targets
            .get(&role)
            .ok_or(ReloadError::NotReloadable(role))?;
        let signal = spec.reload_signal.ok_or(ReloadError::NotReloadable(role))?;

        let mut last_signalled = self.last_signalled.lock().await;
        let fingerprint = request.trigger.fingerprint();
        if let Some(fp) = fingerprint {
            if last_signalled.get(&role) == Some(&fp) {
                tracing::debug!(
                    role = %role,
                    trigger = request.trigger.as_str(),
                    fingerprint = %fp,
                    "Content already signalled, skipping reload"
                );
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                metrics::record_reload(role, ReloadOutcome::AlreadyApplied.label());
                return Ok(ReloadOutcome::AlreadyApplied);
            }
        }

        let running = self
            .runtime
            .list_running(&spec.name)
            .await
            .map_err(|source| {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_reload(role, "error");
                ReloadError::List { role, source }
            })?;

        if running.is_empty() {
            tracing::warn!(
                role = %role,
                container = %spec.name,
                trigger = request.trigger.as_str(),
                "Reload requested but no container is running"
            );
            self.stats.not_running.fetch_add(1, Ordering::Relaxed);
            metrics::record_reload(role, ReloadOutcome::NotRunning.label());
            return Ok(ReloadOutcome::NotRunning);
        }

        let mut delivered = 0;
        let mut failed = 0;
        for handle in &running {
            match self.runtime.signal(handle, signal).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        role = %role,
                        container = %handle,
                        signal = %signal,
                        trigger = request.trigger.as_str(),
                        "Reload signal delivered"
                    );
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(role = %role, container = %handle, error = %e, "Failed to deliver reload signal");
                }
            }
        }

        if delivered > 0 {
            self.stats.signalled.fetch_add(1, Ordering::Relaxed);
            match fingerprint {
                Some(fp) => {
                    last_signalled.insert(role, fp);
                }
                None => {
                    last_signalled.remove(&role);
                }
            }
        } else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = ReloadOutcome::Signalled { delivered, failed };
        metrics::record_reload(role, outcome.label());
        Ok(outcome)
    }

    pub fn stats(&self) -> ReloadStatsSnapshot {
        ReloadStatsSnapshot {
            signalled: self.stats.signalled.load(Ordering::Relaxed),
            not_running: self.stats.not_running.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Drain queued requests in arrival order until `stop` is cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut requests: mpsc::UnboundedReceiver<ReloadRequest>,
        stop: CancellationToken,
    ) {
        tracing::info!(targets = self.targets.len(), "Reload coordinator starting");

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::info!("Reload coordinator received shutdown signal, exiting loop");
                    break;
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        tracing::debug!("Reload queue closed");
                        break;
                    };
                    if let Err(e) = self.reload(&request).await {
                        tracing::warn!(error = %e, "Reload failed");
                    }
                }
            }
        }
    }
}
