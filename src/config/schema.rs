//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the manager.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::runtime::SignalKind;
use crate::supervisor::spec::AdoptionPolicy;

/// Root configuration for the manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Container runtime settings (naming, timeouts).
    pub runtime: RuntimeConfig,

    /// Host filesystem layout.
    pub paths: PathsConfig,

    /// Identity of this node, handed to the rendering helper.
    pub identity: IdentityConfig,

    /// Change detection settings.
    pub detector: DetectorConfig,

    /// Inbound control surface settings.
    pub control: ControlConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// The supervised load balancer.
    pub load_balancer: LoadBalancerConfig,

    /// The supervised configuration-rendering helper.
    pub renderer: RendererConfig,
}

impl ManagerConfig {
    /// Directory holding the rendered configuration and its template.
    pub fn service_dir(&self) -> PathBuf {
        self.paths
            .config_dir
            .join("services")
            .join(&self.paths.service_name)
    }

    /// The rendered load balancer configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.service_dir().join(&self.paths.config_file_name)
    }

    /// The template consumed by the rendering helper.
    pub fn template_file(&self) -> PathBuf {
        self.service_dir().join(&self.paths.template_file_name)
    }
}

/// Container runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Prefix of every logical container name (`<namespace>.<role>`).
    pub namespace: String,

    /// Optional Docker endpoint; local defaults are used when unset.
    pub docker_host: Option<String>,

    /// Seconds the runtime waits for a graceful stop before killing.
    pub stop_timeout_secs: u64,

    /// Upper bound on the explicit container stops issued during shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: "opencopilot".to_string(),
            docker_host: None,
            stop_timeout_secs: 10,
            shutdown_grace_secs: 15,
        }
    }
}

/// Host filesystem layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root configuration directory on the host (`CONFIG_DIR`).
    pub config_dir: PathBuf,

    /// Service whose configuration is managed (`SERVICE_NAME`).
    pub service_name: String,

    /// Rendered configuration file name.
    pub config_file_name: String,

    /// Template file name read by the rendering helper.
    pub template_file_name: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/opencopilot"),
            service_name: "LB".to_string(),
            config_file_name: "haproxy.cfg".to_string(),
            template_file_name: "haproxy.ctmpl".to_string(),
        }
    }
}

/// Node identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Instance id of this device (`INSTANCE_ID`).
    pub instance_id: String,

    /// Address of the key/value store the renderer reads from (`CONSUL_ADDR`).
    pub consul_addr: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            instance_id: String::new(),
            consul_addr: "127.0.0.1:8500".to_string(),
        }
    }
}

/// Change detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorStrategy {
    /// Fingerprint the file on a fixed interval.
    Poll,
    /// React to filesystem notifications.
    Watch,
    /// Only the control surface triggers reloads.
    Disabled,
}

/// Change detector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub strategy: DetectorStrategy,

    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Treat attribute changes (e.g. `touch`) as reload triggers.
    pub reload_on_attrib: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            strategy: DetectorStrategy::Poll,
            poll_interval_ms: 3000,
            reload_on_attrib: false,
        }
    }
}

/// Control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Enable the control surface.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:50052").
    pub bind_address: String,

    /// Bearer token required on every call when set.
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted configure payload in bytes.
    pub max_payload_bytes: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:50052".to_string(),
            api_key: None,
            request_timeout_secs: 30,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A published port of a managed container.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortConfig {
    /// Port inside the container.
    pub container_port: u16,

    /// Port on the host.
    pub host_port: u16,

    /// Host interface to bind.
    #[serde(default = "default_host_ip")]
    pub host_ip: String,

    /// "tcp" or "udp".
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_host_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

/// Load balancer container configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub image: String,

    /// Mount point of the service directory inside the container.
    pub container_config_dir: String,

    /// Policy when a container with our name is already running.
    pub adoption: AdoptionPolicy,

    /// Signal that makes the load balancer re-read its configuration.
    pub reload_signal: SignalKind,

    pub ports: Vec<PortConfig>,

    pub env: Vec<String>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            image: "haproxy:1.8.9".to_string(),
            container_config_dir: "/usr/local/etc/haproxy".to_string(),
            adoption: AdoptionPolicy::Adopt,
            reload_signal: SignalKind::Hangup,
            ports: vec![
                PortConfig {
                    container_port: 80,
                    host_port: 80,
                    host_ip: "0.0.0.0".to_string(),
                    protocol: default_protocol(),
                },
                PortConfig {
                    container_port: 8080,
                    host_port: 8080,
                    host_ip: "127.0.0.1".to_string(),
                    protocol: default_protocol(),
                },
            ],
            env: Vec::new(),
        }
    }
}

/// Rendering helper container configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Supervise the rendering helper at all.
    pub enabled: bool,

    pub image: String,

    pub adoption: AdoptionPolicy,

    /// Docker network mode ("host" lets the helper reach a node-local store).
    pub network_mode: Option<String>,

    /// Extra arguments appended to the generated command line.
    pub extra_args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image: "hashicorp/consul-template:0.19.4-alpine".to_string(),
            adoption: AdoptionPolicy::Replace,
            network_mode: Some("host".to_string()),
            extra_args: Vec::new(),
        }
    }
}
