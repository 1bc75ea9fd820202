//! Instance selection algorithms.
//!
//! A scheduler is a per-service, stateful selector over that service's
//! deployments. The registry owns one scheduler per service and pushes a fresh
//! deployment list after every mutation.

mod weighted_round_robin;

pub use weighted_round_robin::WeightedRoundRobin;

use crate::entity::{Deployment, Instance};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced by schedulers and the scheduler factory.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no service instance found")]
    NoHealthyInstance,

    #[error("unsupported balancing method '{0}'")]
    UnsupportedBalancingMethod(String),
}

impl SchedulerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::NoHealthyInstance => ErrorKind::NoHealthyInstance,
            SchedulerError::UnsupportedBalancingMethod(_) => ErrorKind::UnsupportedBalancingMethod,
        }
    }
}

/// Trait for instance selection algorithms.
pub trait Scheduler: Send + Sync {
    /// Select the next instance to forward a request to.
    ///
    /// # Returns
    ///
    /// A copy of the selected instance, or `NoHealthyInstance` if nothing is
    /// eligible.
    fn next(&self) -> Result<Instance, SchedulerError>;

    /// Replace the working set of deployments.
    ///
    /// Selection state such as cursors survives the update.
    fn update_deployments(&mut self, deployments: Vec<Deployment>);

    /// The balancing method this scheduler implements.
    fn method(&self) -> BalancingMethod;
}

/// Balancing method selectable per service.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BalancingMethod {
    LeastConnection,
    Random,
    RoundRobin,
    #[default]
    WeightedRoundRobin,
}

impl BalancingMethod {
    /// The identifier used in configuration and control-plane requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancingMethod::LeastConnection => "least_connection",
            BalancingMethod::Random => "random",
            BalancingMethod::RoundRobin => "round_robin",
            BalancingMethod::WeightedRoundRobin => "weighted_round_robin",
        }
    }
}

impl fmt::Display for BalancingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalancingMethod {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "least_connection" => Ok(BalancingMethod::LeastConnection),
            "random" => Ok(BalancingMethod::Random),
            "round_robin" => Ok(BalancingMethod::RoundRobin),
            "weighted_round_robin" => Ok(BalancingMethod::WeightedRoundRobin),
            other => Err(SchedulerError::UnsupportedBalancingMethod(other.to_string())),
        }
    }
}

/// Build the scheduler for a balancing method.
///
/// Only weighted round robin is implemented; the other methods are accepted
/// identifiers without an algorithm and fail with `UnsupportedBalancingMethod`.
pub fn new_scheduler(
    method: BalancingMethod,
    deployments: Vec<Deployment>,
) -> Result<Box<dyn Scheduler>, SchedulerError> {
    match method {
        BalancingMethod::WeightedRoundRobin => Ok(Box::new(WeightedRoundRobin::new(deployments))),
        other => Err(SchedulerError::UnsupportedBalancingMethod(other.to_string())),
    }
}
