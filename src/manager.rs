//! Wiring of supervisors, change detection, reloads and the control
//! surface into one running manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::{DetectorStrategy, ManagerConfig};
use crate::control::{self, ConfigWriter, ControlState};
use crate::detector::{self, PollingDetector, WatchDetector};
use crate::error::ManagerError;
use crate::lifecycle::{Shutdown, ShutdownOrchestrator};
use crate::reload::{reload_channel, ReloadCoordinator, ReloadRequest, ReloadSender};
use crate::runtime::ContainerRuntime;
use crate::supervisor::{ManagedProcessSpec, ProcessSupervisor, Role, RoleStatus};

/// Upper bound on waiting for background tasks once shutdown completed.
const BACKGROUND_DRAIN: Duration = Duration::from_secs(5);

pub struct Manager {
    config: ManagerConfig,
    shutdown: Shutdown,
    orchestrator: Arc<ShutdownOrchestrator>,
    supervisors: Vec<ProcessSupervisor>,
    statuses: Arc<Vec<Arc<RoleStatus>>>,
    coordinator: Arc<ReloadCoordinator>,
    writer: Arc<ConfigWriter>,
    reloads: ReloadSender,
    reload_rx: mpsc::UnboundedReceiver<ReloadRequest>,
}

impl Manager {
    /// Build every component from `config`. Nothing runs until [`Manager::run`].
    pub fn new(config: ManagerConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        let shutdown = Shutdown::new();
        let mut orchestrator = ShutdownOrchestrator::new(
            shutdown.clone(),
            runtime.clone(),
            Duration::from_secs(config.runtime.shutdown_grace_secs),
        );

        let mut specs = vec![Arc::new(ManagedProcessSpec::load_balancer(&config))];
        if config.renderer.enabled {
            specs.push(Arc::new(ManagedProcessSpec::config_renderer(&config)));
        } else {
            tracing::info!("Config renderer disabled, only the load balancer is supervised");
        }

        let supervisors: Vec<ProcessSupervisor> = specs
            .iter()
            .map(|spec| {
                let stop = orchestrator.register(spec.clone());
                ProcessSupervisor::new(spec.clone(), runtime.clone(), stop)
            })
            .collect();
        let statuses: Arc<Vec<Arc<RoleStatus>>> =
            Arc::new(supervisors.iter().map(|s| s.status()).collect());

        let coordinator = Arc::new(ReloadCoordinator::new(runtime, specs));
        let (reloads, reload_rx) = reload_channel();
        let writer = Arc::new(ConfigWriter::new(&config.config_file()));

        Self {
            config,
            shutdown,
            orchestrator: Arc::new(orchestrator),
            supervisors,
            statuses,
            coordinator,
            writer,
            reloads,
            reload_rx,
        }
    }

    pub fn orchestrator(&self) -> Arc<ShutdownOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn statuses(&self) -> Arc<Vec<Arc<RoleStatus>>> {
        self.statuses.clone()
    }

    /// State for the control handlers.
    pub fn control_state(&self) -> ControlState {
        ControlState {
            roles: self.statuses.clone(),
            coordinator: self.coordinator.clone(),
            writer: self.writer.clone(),
            api_key: self.config.control.api_key.as_deref().map(Arc::from),
            shutdown: self.orchestrator.draining(),
        }
    }

    /// Run until shutdown completes or a supervisor fails.
    ///
    /// A supervisor failure starts the shutdown sequence and is returned
    /// once everything has stopped. The control surface is served on
    /// `control_listener` when one is given.
    pub async fn run(self, control_listener: Option<TcpListener>) -> Result<(), ManagerError> {
        let control_state = self.control_state();
        let mut background: Vec<JoinHandle<()>> = Vec::new();

        background.push(tokio::spawn(
            self.coordinator
                .clone()
                .run(self.reload_rx, self.shutdown.token()),
        ));

        let config_file = self.config.config_file();
        match self.config.detector.strategy {
            DetectorStrategy::Poll => {
                let detector = PollingDetector::new(
                    &config_file,
                    Duration::from_millis(self.config.detector.poll_interval_ms),
                    Role::LoadBalancer,
                    self.reloads.clone(),
                );
                background.push(tokio::spawn(detector.run(self.shutdown.token())));
            }
            DetectorStrategy::Watch => {
                let detector = WatchDetector::new(
                    &config_file,
                    Role::LoadBalancer,
                    self.config.detector.reload_on_attrib,
                    self.reloads.clone(),
                );
                let watcher = match detector.start() {
                    Ok(watcher) => watcher,
                    Err(e) => {
                        self.shutdown.trigger();
                        return Err(e.into());
                    }
                };
                background.push(tokio::spawn(detector::hold_until(
                    watcher,
                    self.shutdown.token(),
                )));
            }
            DetectorStrategy::Disabled => {
                tracing::info!("Change detection disabled, reloads come from the control surface only");
            }
        }

        if let Some(listener) = control_listener {
            let router = control::control_router(control_state, &self.config.control);
            let stop = self.shutdown.token();
            background.push(tokio::spawn(async move {
                if let Err(e) = control::serve(listener, router, stop).await {
                    tracing::error!(error = %e, "Control surface failed");
                }
            }));
        }

        let mut supervisors = JoinSet::new();
        for supervisor in self.supervisors {
            supervisors.spawn(supervisor.run());
        }
        tracing::info!(roles = supervisors.len(), "Manager running");

        let mut result = Ok(());
        while let Some(joined) = supervisors.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(ManagerError::from(e)),
                Err(e) => Some(ManagerError::Task(e)),
            };
            if let Some(e) = failure {
                tracing::error!(error = %e, "Fatal supervision error, shutting down");
                if result.is_ok() {
                    result = Err(e);
                }
                self.orchestrator.shutdown().await;
            }
        }

        if !self.orchestrator.is_started() {
            self.orchestrator.shutdown().await;
        }

        let grace = Duration::from_secs(self.config.runtime.shutdown_grace_secs) + Duration::from_secs(1);
        if tokio::time::timeout(grace, self.orchestrator.finished()).await.is_err() {
            tracing::warn!("Shutdown sequence did not finish in time");
            self.shutdown.trigger();
        }

        for handle in background {
            if tokio::time::timeout(BACKGROUND_DRAIN, handle).await.is_err() {
                tracing::warn!("Background task did not stop in time");
            }
        }

        tracing::info!("Manager stopped");
        result
    }
}
