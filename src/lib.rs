//! dice - A weighted HTTP load balancer for static infrastructures
//!
//! This crate provides:
//! - Host-based routing of HTTP/1.1 requests to services
//! - Weighted round robin over the instances of each service
//! - Active TCP health checking of instances
//! - A control plane over nodes, services and instances
//! - Hot configuration reload and Prometheus metrics

pub mod config;
pub mod control;
pub mod entity;
pub mod error;
pub mod frontend;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use error::ErrorKind;
pub use state::AppState;
