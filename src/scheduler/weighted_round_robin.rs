//! Weighted round-robin scheduling.
//!
//! The cursor stays on a deployment until its node has received `weight`
//! selections, then moves on. Heavier nodes therefore get proportionally more
//! requests, in deployment order.

use super::{BalancingMethod, Scheduler, SchedulerError};
use crate::entity::{Deployment, Instance};
use parking_lot::Mutex;

/// Weighted round-robin scheduler.
pub struct WeightedRoundRobin {
    deployments: Vec<Deployment>,
    cursor: Mutex<Cursor>,
}

/// Position in the deployment list and selections made at that position.
#[derive(Debug, Default)]
struct Cursor {
    index: usize,
    weight: u8,
}

impl Cursor {
    fn advance(&mut self, len: usize) {
        self.index = (self.index + 1) % len;
        self.weight = 0;
    }
}

impl WeightedRoundRobin {
    /// Create a scheduler over the given deployments.
    pub fn new(deployments: Vec<Deployment>) -> Self {
        Self {
            deployments,
            cursor: Mutex::new(Cursor::default()),
        }
    }
}

impl Scheduler for WeightedRoundRobin {
    fn next(&self) -> Result<Instance, SchedulerError> {
        let len = self.deployments.len();
        if len == 0 {
            return Err(SchedulerError::NoHealthyInstance);
        }

        let mut cursor = self.cursor.lock();
        cursor.index %= len;

        // The previous call may have used up the quota at this position.
        if cursor.weight > 0 && cursor.weight >= self.deployments[cursor.index].node.weight {
            cursor.advance(len);
        }

        for _ in 0..len {
            let deployment = &self.deployments[cursor.index];

            if !deployment.instance.is_eligible() {
                cursor.advance(len);
                continue;
            }

            // Also catches weight 0, which is never selected.
            if deployment.node.weight <= cursor.weight {
                cursor.advance(len);
                continue;
            }

            cursor.weight += 1;
            return Ok(deployment.instance.clone());
        }

        Err(SchedulerError::NoHealthyInstance)
    }

    fn update_deployments(&mut self, deployments: Vec<Deployment>) {
        self.deployments = deployments;

        let cursor = self.cursor.get_mut();
        if self.deployments.is_empty() {
            cursor.index = 0;
        } else {
            cursor.index %= self.deployments.len();
        }
    }

    fn method(&self) -> BalancingMethod {
        BalancingMethod::WeightedRoundRobin
    }
}
