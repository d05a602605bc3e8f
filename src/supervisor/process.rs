//! Restart-until-stopped loop for one managed container.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError};
use crate::supervisor::spec::{AdoptionPolicy, ManagedProcessSpec, Role};
use crate::supervisor::state::{RoleStatus, SupervisionState};

/// Pause before restarting after the runtime lost track of a container,
/// so a misbehaving wait endpoint cannot spin the loop.
const WAIT_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Extra time allowed for a replaced container to disappear.
const REPLACE_GRACE: Duration = Duration::from_secs(5);

/// Errors that end supervision of a role.
///
/// Each one means the role cannot get its container running, so the
/// whole manager shuts down.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{role}: failed to look up running container: {source}")]
    Lookup {
        role: Role,
        #[source]
        source: RuntimeError,
    },

    #[error("{role}: failed to stop existing container: {source}")]
    Replace {
        role: Role,
        #[source]
        source: RuntimeError,
    },

    #[error("{role}: failed to create container: {source}")]
    Create {
        role: Role,
        #[source]
        source: RuntimeError,
    },

    #[error("{role}: failed to start container: {source}")]
    Start {
        role: Role,
        #[source]
        source: RuntimeError,
    },
}

impl SupervisorError {
    pub fn role(&self) -> Role {
        match self {
            SupervisorError::Lookup { role, .. }
            | SupervisorError::Replace { role, .. }
            | SupervisorError::Create { role, .. }
            | SupervisorError::Start { role, .. } => *role,
        }
    }
}

/// Keeps one container alive until its stop token is cancelled.
pub struct ProcessSupervisor {
    spec: Arc<ManagedProcessSpec>,
    runtime: Arc<dyn ContainerRuntime>,
    status: Arc<RoleStatus>,
    stop: CancellationToken,
}

impl ProcessSupervisor {
    pub fn new(
        spec: Arc<ManagedProcessSpec>,
        runtime: Arc<dyn ContainerRuntime>,
        stop: CancellationToken,
    ) -> Self {
        let status = RoleStatus::new(spec.role, spec.name.clone());
        Self {
            spec,
            runtime,
            status,
            stop,
        }
    }

    /// Shared status handle, valid after the supervisor is consumed by `run`.
    pub fn status(&self) -> Arc<RoleStatus> {
        self.status.clone()
    }

    /// Run the supervision loop.
    ///
    /// Returns `Ok(())` once the stop token is observed, or the first
    /// error that prevents the container from being brought up.
    pub async fn run(self) -> Result<(), SupervisorError> {
        tracing::info!(
            role = %self.spec.role,
            container = %self.spec.name,
            image = %self.spec.image,
            adoption = ?self.spec.adoption,
            "Supervisor starting"
        );

        let result = self.supervise().await;

        self.status.clear_container();
        self.status.set_state(SupervisionState::Stopped);

        match &result {
            Ok(()) => tracing::info!(role = %self.spec.role, "Supervisor stopped"),
            Err(e) => tracing::error!(role = %self.spec.role, error = %e, "Supervisor failed"),
        }
        result
    }

    async fn supervise(&self) -> Result<(), SupervisorError> {
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            self.status.set_state(SupervisionState::Starting);
            let handle = self.acquire().await?;

            // A stop that raced with creation still wins.
            if self.stop.is_cancelled() {
                self.halt(&handle).await;
                return Ok(());
            }

            self.status.set_state(SupervisionState::Running);

            tokio::select! {
                biased;

                _ = self.stop.cancelled() => {
                    self.halt(&handle).await;
                    return Ok(());
                }

                result = self.runtime.wait_exit(&handle) => {
                    match result {
                        Ok(exit) => {
                            tracing::warn!(
                                role = %self.spec.role,
                                container = %handle,
                                exit_code = exit.code,
                                "Container exited, restarting"
                            );
                            self.status.record_exit(Some(exit.code));
                            self.status.set_state(SupervisionState::Exited);
                        }
                        Err(RuntimeError::NotFound(_)) => {
                            tracing::warn!(
                                role = %self.spec.role,
                                container = %handle,
                                "Container disappeared, restarting"
                            );
                            self.status.record_exit(None);
                            self.status.set_state(SupervisionState::Exited);
                        }
                        Err(e) => {
                            tracing::warn!(
                                role = %self.spec.role,
                                container = %handle,
                                error = %e,
                                "Lost track of container, restarting"
                            );
                            self.status.record_exit(None);
                            self.status.set_state(SupervisionState::Exited);
                            // The container may still be up; stop it if stop arrives now.
                            tokio::select! {
                                _ = self.stop.cancelled() => {
                                    self.halt(&handle).await;
                                    return Ok(());
                                }
                                _ = tokio::time::sleep(WAIT_ERROR_PAUSE) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    /// Adopt, replace, or create the role's container.
    async fn acquire(&self) -> Result<ContainerHandle, SupervisorError> {
        let role = self.spec.role;

        let existing = self
            .runtime
            .is_running(&self.spec.name)
            .await
            .map_err(|source| SupervisorError::Lookup { role, source })?;

        if let Some(existing) = existing {
            match self.spec.adoption {
                AdoptionPolicy::Adopt => {
                    tracing::info!(role = %role, container = %existing, "Adopting running container");
                    self.status.record_adopted(&existing.id);
                    return Ok(existing);
                }
                AdoptionPolicy::Replace => {
                    tracing::info!(role = %role, container = %existing, "Container already running, replacing");
                    self.runtime
                        .stop(&existing, self.spec.stop_timeout)
                        .await
                        .map_err(|source| SupervisorError::Replace { role, source })?;
                    // Let the old instance release its name before we reuse it.
                    let deadline = self.spec.stop_timeout + REPLACE_GRACE;
                    match tokio::time::timeout(deadline, self.runtime.wait_exit(&existing)).await {
                        Ok(Ok(_)) | Ok(Err(RuntimeError::NotFound(_))) => {}
                        Ok(Err(e)) => {
                            tracing::warn!(
                                role = %role,
                                container = %existing,
                                error = %e,
                                "Failed to wait for replaced container, creating anyway"
                            );
                        }
                        Err(_) => {
                            tracing::warn!(role = %role, container = %existing, "Replaced container did not exit in time");
                        }
                    }
                }
            }
        }

        let handle = self
            .runtime
            .create(&self.spec)
            .await
            .map_err(|source| SupervisorError::Create { role, source })?;

        self.runtime
            .start(&handle)
            .await
            .map_err(|source| SupervisorError::Start { role, source })?;

        self.status.record_start(&handle.id);
        tracing::info!(role = %role, container = %handle, "Container started");
        Ok(handle)
    }

    async fn halt(&self, handle: &ContainerHandle) {
        self.status.set_state(SupervisionState::Stopping);
        tracing::info!(role = %self.spec.role, container = %handle, "Stop requested, stopping container");

        if let Err(e) = self.runtime.stop(handle, self.spec.stop_timeout).await {
            tracing::warn!(
                role = %self.spec.role,
                container = %handle,
                error = %e,
                "Failed to stop container, leaving it to runtime cleanup"
            );
        }
    }
}
