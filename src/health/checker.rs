//! Active health checker.
//!
//! Instances of every enabled service are probed with a plain TCP connect.
//! The outcome becomes the instance's liveness in the live registry, which
//! the scheduler consults on every selection.

use crate::registry::ServiceRegistry;
use crate::state::AppState;
use crate::util::dial;
use futures::future::join_all;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Outcome of one probe round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSummary {
    /// Instances probed
    pub probed: usize,
    /// Instances that accepted the connection
    pub alive: usize,
    /// Instances whose liveness flipped
    pub changed: usize,
}

/// One instance to probe, captured without holding any lock.
struct Target {
    service_id: String,
    service_name: String,
    instance_id: String,
    instance_name: String,
    address: String,
}

/// Periodic prober of instance liveness.
pub struct HealthChecker {
    state: AppState,
}

impl HealthChecker {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Probe on every interval tick until shutdown.
    ///
    /// The first round starts immediately. A reload requests an extra round
    /// through `AppState::probe_requests`. Shutdown also interrupts a round
    /// that is still in flight.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let period = self.state.config().health_check.interval;
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?period, "health checker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.state.probe_requests().notified() => {
                    ticker.reset();
                }
                _ = shutdown.recv() => {
                    info!("health checker shutting down");
                    return;
                }
            }

            tokio::select! {
                summary = self.run_once() => {
                    debug!(
                        probed = summary.probed,
                        alive = summary.alive,
                        changed = summary.changed,
                        "probe round finished"
                    );
                }
                _ = shutdown.recv() => {
                    info!("health checker shutting down during a probe round");
                    return;
                }
            }
        }
    }

    /// Probe every instance of every enabled service once.
    ///
    /// Probes run concurrently and no lock is held while they are in flight.
    /// Results for a service disabled in the meantime are discarded.
    pub async fn run_once(&self) -> ProbeSummary {
        let registry = self.state.registry();
        let deadline = self.state.config().health_check.timeout;

        let targets = collect_targets(&registry);
        let results = join_all(targets.iter().map(|t| probe(&t.address, deadline))).await;

        let mut summary = ProbeSummary::default();
        let mut by_service: HashMap<&str, Vec<(&str, bool)>> = HashMap::new();

        for (target, alive) in targets.iter().zip(results) {
            summary.probed += 1;
            if alive {
                summary.alive += 1;
            }
            self.state
                .metrics()
                .record_health_check(&target.service_name, &target.instance_name, alive);
            by_service
                .entry(target.service_id.as_str())
                .or_default()
                .push((target.instance_id.as_str(), alive));
        }

        for (service_id, results) in by_service {
            let Some(entry) = registry.service(service_id) else {
                continue;
            };
            let mut service = entry.write();
            if !service.entity().is_enabled {
                continue;
            }

            for (instance_id, alive) in &results {
                let flipped = service
                    .deployments()
                    .iter()
                    .find(|d| d.instance.id == *instance_id && d.instance.is_alive != *alive);
                if let Some(d) = flipped {
                    info!(
                        service = %service.entity().name,
                        instance = %d.instance.name,
                        address = %d.instance.address,
                        alive = *alive,
                        "instance liveness changed"
                    );
                }
            }
            summary.changed += service.apply_liveness(results);
        }

        summary
    }
}

fn collect_targets(registry: &ServiceRegistry) -> Vec<Target> {
    let mut targets = Vec::new();
    for entry in registry.services() {
        let service = entry.read();
        if !service.entity().is_enabled {
            continue;
        }
        for deployment in service.deployments() {
            targets.push(Target {
                service_id: service.entity().id.clone(),
                service_name: service.entity().name.clone(),
                instance_id: deployment.instance.id.clone(),
                instance_name: deployment.instance.name.clone(),
                address: deployment.instance.address.clone(),
            });
        }
    }
    targets
}

/// Connect and immediately close.
async fn probe(address: &str, deadline: Duration) -> bool {
    match dial(address, deadline).await {
        Ok(_stream) => true,
        Err(e) => {
            debug!(address, error = %e, "probe failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::control::{Controller, InstanceOptions, NodeOptions, ServiceOptions};
    use tokio::net::TcpListener;

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    fn state_with(addresses: &[&str], enabled: bool) -> AppState {
        let controller = Controller::new();
        controller
            .create_node("127.0.0.1", NodeOptions { attach: true, ..NodeOptions::default() })
            .unwrap();
        controller
            .create_service(
                "api",
                ServiceOptions {
                    routes: vec!["api.test".to_string()],
                    enable: enabled,
                    ..ServiceOptions::default()
                },
            )
            .unwrap();
        for (i, address) in addresses.iter().enumerate() {
            controller
                .create_instance(
                    "api",
                    "127.0.0.1",
                    address,
                    InstanceOptions {
                        name: Some(format!("api-{}", i)),
                        attach: true,
                        ..InstanceOptions::default()
                    },
                )
                .unwrap();
        }

        let mut config = Config::default();
        config.health_check.interval = Duration::from_millis(50);
        config.health_check.timeout = Duration::from_millis(500);
        AppState::new(config, controller)
    }

    fn alive(state: &AppState, name: &str) -> bool {
        state.controller().instance_info(name).unwrap().is_alive
    }

    #[tokio::test]
    async fn test_run_once_marks_liveness() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap().to_string();
        let down = closed_port().await;

        let state = state_with(&[up.as_str(), down.as_str()], true);
        let checker = HealthChecker::new(state.clone());

        let summary = checker.run_once().await;
        assert_eq!(summary.probed, 2);
        assert_eq!(summary.alive, 1);
        assert_eq!(summary.changed, 1);
        assert!(alive(&state, "api-0"));
        assert!(!alive(&state, "api-1"));

        // Nothing flips on a second identical round.
        assert_eq!(checker.run_once().await.changed, 0);

        drop(listener);
        let summary = checker.run_once().await;
        assert_eq!(summary.alive, 0);
        assert!(!alive(&state, "api-0"));
    }

    #[tokio::test]
    async fn test_disabled_service_left_untouched() {
        let down = closed_port().await;
        let state = state_with(&[down.as_str()], true);
        let checker = HealthChecker::new(state.clone());

        let entry = state.registry().lookup_service("api.test").unwrap();
        let id = entry.read().deployments()[0].instance.id.clone();
        entry.write().apply_liveness([(id.as_str(), true)]);

        state.controller().disable_service("api").unwrap();
        let summary = checker.run_once().await;
        assert_eq!(summary.probed, 0);
        assert!(alive(&state, "api-0"));

        state.controller().enable_service("api").unwrap();
        let summary = checker.run_once().await;
        assert_eq!(summary.probed, 1);
        assert!(!alive(&state, "api-0"));
    }

    #[tokio::test]
    async fn test_run_probes_and_stops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up = listener.local_addr().unwrap().to_string();
        let state = state_with(&[up.as_str()], true);

        let handle = tokio::spawn(HealthChecker::new(state.clone()).run(state.shutdown().subscribe()));

        let mut became_alive = false;
        for _ in 0..40 {
            if alive(&state, "api-0") {
                became_alive = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(became_alive);

        state.trigger_shutdown();
        let stopped = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(stopped.is_ok());
    }
}
