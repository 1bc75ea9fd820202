//! Configuration validation.

use crate::config::Config;
use crate::entity::{is_url_safe, Endpoint};
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - A known log level and a metrics path starting with `/`
/// - Non-zero chunk size, response timeout, health-check interval and timeout
/// - Unique, URL-safe node, service and instance names
/// - Parseable node URLs and instance addresses
/// - Routes that belong to exactly one service
/// - Instance references to declared services and nodes
///
/// # Returns
///
/// `Ok(())` if valid, or every problem found joined with `"; "`.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    let metrics = &config.global.metrics;
    if metrics.enabled {
        if !metrics.path.starts_with('/') {
            errors.push(format!("metrics path '{}' must start with '/'", metrics.path));
        }
        if metrics.address == config.proxy.listen {
            errors.push(format!(
                "metrics address {} collides with the proxy listen address",
                metrics.address
            ));
        }
    }

    if config.proxy.chunk_size == 0 {
        errors.push("proxy chunk_size must be greater than 0".to_string());
    }
    if config.proxy.response_timeout.is_zero() {
        errors.push("proxy response_timeout must be greater than 0".to_string());
    }
    if config.health_check.interval.is_zero() {
        errors.push("health_check interval must be greater than 0".to_string());
    }
    if config.health_check.timeout.is_zero() {
        errors.push("health_check timeout must be greater than 0".to_string());
    }

    // Nodes may be referenced by name or URL
    let mut node_refs = HashSet::new();
    let mut node_urls = HashSet::new();
    for node in &config.nodes {
        match Endpoint::parse(&node.url) {
            Ok(ep) if ep.host().is_empty() => {
                errors.push(format!("node URL '{}' has no host", node.url));
            }
            Ok(_) => {}
            Err(e) => errors.push(e.to_string()),
        }

        if !node_urls.insert(node.url.trim()) {
            errors.push(format!("duplicate node URL: {}", node.url));
        }
        node_refs.insert(node.url.trim());

        if let Some(name) = &node.name {
            if !is_url_safe(name) {
                errors.push(format!("node name '{}' is not URL-safe", name));
            }
            if !node_refs.insert(name.as_str()) {
                errors.push(format!("duplicate node name: {}", name));
            }
        }
    }

    let mut service_names = HashSet::new();
    let mut routes = HashSet::new();
    for service in &config.services {
        if service.name.trim().is_empty() {
            errors.push("service name cannot be empty".to_string());
        } else if !is_url_safe(&service.name) {
            errors.push(format!("service name '{}' is not URL-safe", service.name));
        }

        if !service_names.insert(service.name.as_str()) {
            errors.push(format!("duplicate service name: {}", service.name));
        }

        for route in &service.routes {
            if route.trim().is_empty() {
                errors.push(format!("service '{}' has an empty route", service.name));
            } else if !routes.insert(route.trim()) {
                errors.push(format!(
                    "route '{}' of service '{}' is already used",
                    route, service.name
                ));
            }
        }
    }

    let mut instance_names = HashSet::new();
    for instance in &config.instances {
        if !service_names.contains(instance.service.as_str()) {
            errors.push(format!(
                "instance '{}' references non-existent service '{}'",
                instance.address, instance.service
            ));
        }
        if !node_refs.contains(instance.node.as_str()) {
            errors.push(format!(
                "instance '{}' references non-existent node '{}'",
                instance.address, instance.node
            ));
        }

        if let Err(e) = Endpoint::parse(&instance.address) {
            errors.push(e.to_string());
        }

        if let Some(name) = &instance.name {
            if !is_url_safe(name) {
                errors.push(format!("instance name '{}' is not URL-safe", name));
            }
            if !instance_names.insert((instance.service.as_str(), name.as_str())) {
                errors.push(format!(
                    "duplicate instance name '{}' in service '{}'",
                    name, instance.service
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
