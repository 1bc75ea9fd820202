//! Configuration file loading.

use crate::config::{validate_config, Config};
use crate::error::ErrorKind;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::ReadError(_) => ErrorKind::Internal,
            ConfigError::ParseError(_) | ConfigError::ValidationError(_) => {
                ErrorKind::InvalidArgument
            }
        }
    }
}

/// Load configuration from a YAML file.
///
/// Reads the file, parses the YAML, then checks the declared topology for
/// consistency. Whether the topology can actually be built is only known once
/// a `Controller` is bootstrapped from it.
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Returns
///
/// The parsed and validated configuration, or an error.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents)?;
    validate_config(&config).map_err(ConfigError::ValidationError)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal_config() {
        let yaml = r#"
proxy:
  listen: "127.0.0.1:8080"

nodes:
  - url: 10.0.0.1
    name: node-1
    weight: 2

services:
  - name: api
    routes: [api.example.com]

instances:
  - service: api
    node: node-1
    address: "9000"
    version: "1.0"
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].weight, 2);
        assert_eq!(config.services[0].routes, vec!["api.example.com"]);
        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.health_check.interval, Duration::from_secs(15));
    }

    #[test]
    fn test_load_empty_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{}").unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.yaml");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::ReadError(_)));
    }

    #[test]
    fn test_load_invalid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not: valid: yaml: {{{}}}").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_load_unknown_balancing_method() {
        let yaml = r#"
services:
  - name: api
    balancing_method: ip_hash
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_invalid_topology() {
        let yaml = r#"
instances:
  - service: api
    node: node-1
    address: "9000"
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        match load_config(file.path()) {
            Err(ConfigError::ValidationError(msg)) => {
                assert!(msg.contains("non-existent service 'api'"));
            }
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }
}
