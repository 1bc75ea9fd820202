//! Configuration data types.

use crate::scheduler::BalancingMethod;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Request dispatcher settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Health checker settings
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Nodes to register at startup
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Services to register at startup
    #[serde(default)]
    pub services: Vec<ServiceConfig>,

    /// Instances to deploy at startup
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log file; logs go to stdout when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether the metrics server is started
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind the metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for the Prometheus endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Request dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Address the proxy accepts client requests on
    #[serde(default = "default_proxy_listen")]
    pub listen: SocketAddr,

    /// Timeout for connecting to an instance
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for an instance to send the response head and first body frame
    #[serde(default = "default_response_timeout", with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Largest body chunk forwarded to the client at once, in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: default_proxy_listen(),
            connect_timeout: default_connect_timeout(),
            response_timeout: default_response_timeout(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Health checker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// How often every enabled service is probed
    #[serde(default = "default_health_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout of a single TCP probe
    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            timeout: default_health_timeout(),
        }
    }
}

/// A node declared in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    /// Host name or URL of the node
    pub url: String,

    /// Unique name; defaults to the generated ID
    #[serde(default)]
    pub name: Option<String>,

    /// Weight for weighted round robin (0 excludes the node)
    #[serde(default = "default_weight")]
    pub weight: u8,

    /// Attach the node right after creating it
    #[serde(default = "default_true")]
    pub attach: bool,
}

/// A service declared in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Unique service name
    pub name: String,

    /// Public routes (host names) served by this service
    #[serde(default)]
    pub routes: Vec<String>,

    /// Scheduling algorithm
    #[serde(default)]
    pub balancing_method: BalancingMethod,

    /// Version instances must run to be attached by a rollout
    #[serde(default)]
    pub target_version: Option<String>,

    /// Enable the service right after creating it
    #[serde(default = "default_true")]
    pub enable: bool,
}

/// An instance declared in the configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    /// Name or ID of the owning service
    pub service: String,

    /// Name, ID or URL of the hosting node
    pub node: String,

    /// `host:port`, URL, or a bare port on the node's host
    pub address: String,

    /// Name, unique within the service; defaults to the generated ID
    #[serde(default)]
    pub name: Option<String>,

    /// Version tag of the deployed code
    #[serde(default)]
    pub version: String,

    /// Attach the instance right after creating it
    #[serde(default = "default_true")]
    pub attach: bool,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_proxy_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_chunk_size() -> usize {
    8192
}

fn default_health_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_weight() -> u8 {
    1
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.proxy.listen.port(), 8080);
        assert_eq!(config.proxy.chunk_size, 8192);
        assert_eq!(config.proxy.response_timeout, Duration::from_secs(60));
        assert_eq!(config.health_check.interval, Duration::from_secs(15));
        assert_eq!(config.health_check.timeout, Duration::from_secs(5));
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_topology_defaults() {
        let yaml = r#"
nodes:
  - url: 10.0.0.1
services:
  - name: api
instances:
  - service: api
    node: 10.0.0.1
    address: "8080"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.nodes[0].weight, 1);
        assert!(config.nodes[0].attach);
        assert_eq!(
            config.services[0].balancing_method,
            BalancingMethod::WeightedRoundRobin
        );
        assert!(config.services[0].enable);
        assert!(config.instances[0].attach);
        assert_eq!(config.instances[0].version, "");
    }

    #[test]
    fn test_humantime_durations() {
        let yaml = r#"
proxy:
  connect_timeout: 250ms
  response_timeout: 3s
health_check:
  interval: 1m 30s
  timeout: 2s
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.proxy.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.proxy.response_timeout, Duration::from_secs(3));
        assert_eq!(config.health_check.interval, Duration::from_secs(90));
        assert_eq!(config.health_check.timeout, Duration::from_secs(2));
    }
}
