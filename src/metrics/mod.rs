//! Metrics collection and exposition.

mod collector;
mod server;

pub use collector::{MetricsCollector, RequestTimer, UNROUTED};
pub use server::MetricsServer;
