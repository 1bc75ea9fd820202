//! Health checking for service instances.

mod checker;

pub use checker::{HealthChecker, ProbeSummary};
