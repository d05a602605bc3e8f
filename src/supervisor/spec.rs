//! Static description of each supervised container.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::PortConfig;
use crate::config::ManagerConfig;
use crate::runtime::SignalKind;

/// A supervised role. Each role owns exactly one logical container name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    #[serde(rename = "lb")]
    LoadBalancer,
    #[serde(rename = "config-renderer")]
    ConfigRenderer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::LoadBalancer => "lb",
            Role::ConfigRenderer => "config-renderer",
        }
    }

    /// `<namespace>.<role>`, the only name the runtime knows this role by.
    pub fn logical_name(&self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a supervisor does when it finds its container already running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AdoptionPolicy {
    /// Take ownership of the running container and wait on it.
    Adopt,
    /// Stop the running container and create a fresh one.
    Replace,
}

/// Everything needed to (re)create the container of one role.
///
/// Built once from [`ManagerConfig`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedProcessSpec {
    pub role: Role,
    /// Logical container name.
    pub name: String,
    pub image: String,
    /// Command override; empty keeps the image default.
    pub command: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// `host:container` bind mounts.
    pub binds: Vec<String>,
    pub ports: Vec<PortConfig>,
    pub labels: HashMap<String, String>,
    pub network_mode: Option<String>,
    /// Let the runtime delete the container once it exits.
    pub auto_remove: bool,
    pub adoption: AdoptionPolicy,
    /// Live-reload signal; `None` for roles that are never reloaded.
    pub reload_signal: Option<SignalKind>,
    pub stop_timeout: Duration,
}

impl ManagedProcessSpec {
    /// The load balancer container.
    pub fn load_balancer(config: &ManagerConfig) -> Self {
        let role = Role::LoadBalancer;
        let lb = &config.load_balancer;
        let service_dir = config.service_dir();

        Self {
            role,
            name: role.logical_name(&config.runtime.namespace),
            image: lb.image.clone(),
            command: Vec::new(),
            env: lb.env.clone(),
            binds: vec![format!(
                "{}:{}",
                service_dir.display(),
                lb.container_config_dir
            )],
            ports: lb.ports.clone(),
            labels: role_labels(config, role),
            network_mode: None,
            auto_remove: true,
            adoption: lb.adoption,
            reload_signal: Some(lb.reload_signal),
            stop_timeout: Duration::from_secs(config.runtime.stop_timeout_secs),
        }
    }

    /// The helper that renders the load balancer configuration from a
    /// template. Its output file is watched by the change detector.
    pub fn config_renderer(config: &ManagerConfig) -> Self {
        let role = Role::ConfigRenderer;
        let renderer = &config.renderer;
        let service_dir = config.service_dir().display().to_string();

        let mut command = vec![
            "-template".to_string(),
            format!(
                "{}:{}",
                config.template_file().display(),
                config.config_file().display()
            ),
            "-consul-addr".to_string(),
            config.identity.consul_addr.clone(),
        ];
        command.extend(renderer.extra_args.iter().cloned());

        Self {
            role,
            name: role.logical_name(&config.runtime.namespace),
            image: renderer.image.clone(),
            command,
            env: vec![
                format!("CONFIG_DIR={}", config.paths.config_dir.display()),
                format!("INSTANCE_ID={}", config.identity.instance_id),
                format!("CONSUL_ADDR={}", config.identity.consul_addr),
            ],
            // Same path on both sides so rendered paths match the host's.
            binds: vec![format!("{}:{}", service_dir, service_dir)],
            ports: Vec::new(),
            labels: role_labels(config, role),
            network_mode: renderer.network_mode.clone(),
            auto_remove: true,
            adoption: renderer.adoption,
            reload_signal: None,
            stop_timeout: Duration::from_secs(config.runtime.stop_timeout_secs),
        }
    }
}

fn role_labels(config: &ManagerConfig, role: Role) -> HashMap<String, String> {
    let namespace = &config.runtime.namespace;
    HashMap::from([
        (format!("{}.role", namespace), role.as_str().to_string()),
        (
            format!("{}.service", namespace),
            config.paths.service_name.clone(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_names() {
        let config = ManagerConfig::default();
        assert_eq!(ManagedProcessSpec::load_balancer(&config).name, "opencopilot.lb");
        assert_eq!(
            ManagedProcessSpec::config_renderer(&config).name,
            "opencopilot.config-renderer"
        );
    }

    #[test]
    fn test_load_balancer_spec() {
        let config = ManagerConfig::default();
        let spec = ManagedProcessSpec::load_balancer(&config);

        assert_eq!(spec.binds, vec!["/etc/opencopilot/services/LB:/usr/local/etc/haproxy"]);
        assert_eq!(spec.reload_signal, Some(SignalKind::Hangup));
        assert_eq!(spec.adoption, AdoptionPolicy::Adopt);
        assert_eq!(spec.ports.len(), 2);
        assert_eq!(spec.labels.get("opencopilot.role").map(String::as_str), Some("lb"));
        assert!(spec.auto_remove);
    }

    #[test]
    fn test_renderer_command() {
        let mut config = ManagerConfig::default();
        config.identity.consul_addr = "10.0.0.1:8500".to_string();
        config.identity.instance_id = "node-1".to_string();
        let spec = ManagedProcessSpec::config_renderer(&config);

        assert_eq!(
            spec.command,
            vec![
                "-template",
                "/etc/opencopilot/services/LB/haproxy.ctmpl:/etc/opencopilot/services/LB/haproxy.cfg",
                "-consul-addr",
                "10.0.0.1:8500",
            ]
        );
        assert!(spec.env.contains(&"INSTANCE_ID=node-1".to_string()));
        assert_eq!(spec.network_mode.as_deref(), Some("host"));
        assert_eq!(spec.reload_signal, None);
    }
}
