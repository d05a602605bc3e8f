//! Docker Engine implementation of the runtime facade.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures_util::{pin_mut, StreamExt, TryStreamExt};

use crate::runtime::{
    ContainerHandle, ContainerRuntime, ExitStatus, Result, RuntimeError, SignalKind,
};
use crate::supervisor::spec::ManagedProcessSpec;

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Runtime facade backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the engine and verify it answers.
    ///
    /// `host` accepts `unix://` sockets and `tcp://`/`http://` endpoints;
    /// `None` uses the platform default (`DOCKER_HOST` or the local socket).
    pub async fn connect(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_socket(host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            Some(host) => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connect(e.to_string()))?;

        Ok(Self { docker })
    }

    async fn pull(&self, image: &str) -> Result<()> {
        tracing::info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| RuntimeError::Pull {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Remove a leftover container that still holds `name`.
    async fn remove_stale(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => {
                tracing::info!(container = %name, "Removed stale container");
                Ok(())
            }
            // 404: nothing to remove. 409: removal already in progress.
            Err(e) if matches!(status_code(&e), Some(404) | Some(409)) => Ok(()),
            Err(e) => Err(api_error(e)),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn is_running(&self, name: &str) -> Result<Option<ContainerHandle>> {
        Ok(self.list_running(name).await?.into_iter().next())
    }

    async fn create(&self, spec: &ManagedProcessSpec) -> Result<ContainerHandle> {
        self.pull(&spec.image).await?;
        self.remove_stale(&spec.name).await?;

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for port in &spec.ports {
            let key = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some(port.host_ip.clone()),
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            auto_remove: Some(spec.auto_remove),
            binds: Some(spec.binds.clone()),
            port_bindings: Some(port_bindings),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::Create {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "Runtime warning on create");
        }

        Ok(ContainerHandle::new(response.id, spec.name.clone()))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<()> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(api_error)
    }

    async fn stop(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.as_secs() as i64,
        };
        match self.docker.stop_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped. 404: already removed.
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(api_error(e)),
        }
    }

    async fn signal(&self, handle: &ContainerHandle, signal: SignalKind) -> Result<()> {
        let options = KillContainerOptions {
            signal: signal.as_str(),
        };
        match self.docker.kill_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(404) => Err(RuntimeError::NotFound(handle.name.clone())),
            Err(e) => Err(api_error(e)),
        }
    }

    async fn kill(&self, handle: &ContainerHandle) -> Result<()> {
        let options = KillContainerOptions {
            signal: SignalKind::Kill.as_str(),
        };
        match self.docker.kill_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            // 404: already removed. 409: not running.
            Err(e) if matches!(status_code(&e), Some(404) | Some(409)) => Ok(()),
            Err(e) => Err(api_error(e)),
        }
    }

    async fn wait_exit(&self, handle: &ContainerHandle) -> Result<ExitStatus> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let stream = self.docker.wait_container(&handle.id, Some(options));
        pin_mut!(stream);

        match stream.next().await {
            Some(Ok(response)) => Ok(ExitStatus {
                code: response.status_code,
            }),
            // bollard reports a non-zero exit code as an error.
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(ExitStatus { code }),
            Some(Err(e)) if status_code(&e) == Some(404) => {
                Err(RuntimeError::NotFound(handle.name.clone()))
            }
            Some(Err(e)) => Err(api_error(e)),
            None => Err(RuntimeError::Api(format!(
                "wait stream for {} ended without a status",
                handle
            ))),
        }
    }

    async fn list_running(&self, name: &str) -> Result<Vec<ContainerHandle>> {
        let filters = HashMap::from([("name".to_string(), vec![name.to_string()])]);
        let options = ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(api_error)?;

        // The engine's name filter is a substring match; keep exact names only.
        Ok(containers
            .into_iter()
            .filter(|c| {
                c.names
                    .as_ref()
                    .is_some_and(|names| names.iter().any(|n| n.trim_start_matches('/') == name))
            })
            .filter_map(|c| c.id)
            .map(|id| ContainerHandle::new(id, name))
            .collect())
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn api_error(err: DockerError) -> RuntimeError {
    match status_code(&err) {
        Some(code) => RuntimeError::Api(format!("{} (status {})", err, code)),
        None => RuntimeError::Api(err.to_string()),
    }
}
