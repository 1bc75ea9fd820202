//! Shared application state.

use crate::config::Config;
use crate::control::{ControlError, Controller};
use crate::metrics::MetricsCollector;
use crate::registry::ServiceRegistry;
use crate::util::ShutdownSignal;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shared state accessible from all tasks.
///
/// Configuration and topology are swapped as a whole on reload. Readers that
/// loaded the previous controller keep using it until they finish.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ArcSwap<Config>>,
    controller: Arc<ArcSwap<Controller>>,
    metrics: MetricsCollector,
    shutdown: ShutdownSignal,
    probe_now: Arc<Notify>,
}

impl AppState {
    /// Create state around an already bootstrapped controller.
    pub fn new(config: Config, controller: Controller) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            controller: Arc::new(ArcSwap::from_pointee(controller)),
            metrics: MetricsCollector::new(),
            shutdown: ShutdownSignal::new(),
            probe_now: Arc::new(Notify::new()),
        }
    }

    /// Bootstrap the topology declared in `config`.
    pub fn from_config(config: Config) -> Result<Self, ControlError> {
        let controller = Controller::from_config(&config)?;
        Ok(Self::new(config, controller))
    }

    /// Get the current configuration.
    pub fn config(&self) -> arc_swap::Guard<Arc<Config>> {
        self.config.load()
    }

    /// Get the current controller.
    pub fn controller(&self) -> Arc<Controller> {
        self.controller.load_full()
    }

    /// Get the live registry of the current controller.
    pub fn registry(&self) -> Arc<ServiceRegistry> {
        Arc::clone(self.controller.load().registry())
    }

    /// Replace configuration and topology.
    ///
    /// The new topology is built completely before anything is swapped, so
    /// a failing configuration leaves the running one in place. Instances of
    /// the new topology start dead; a probe round is requested right away.
    pub fn reload(&self, config: Config) -> Result<(), ControlError> {
        let controller = Controller::from_config(&config)?;

        let current = self.config.load();
        if current.proxy.listen != config.proxy.listen {
            warn!(
                current = %current.proxy.listen,
                requested = %config.proxy.listen,
                "proxy listen address changes require a restart"
            );
        }
        if current.global.metrics.address != config.global.metrics.address {
            warn!("metrics address changes require a restart");
        }
        if current.health_check.interval != config.health_check.interval {
            warn!("health check interval changes require a restart");
        }

        self.controller.store(Arc::new(controller));
        self.config.store(Arc::new(config));
        self.probe_now.notify_one();

        info!(services = self.registry().len(), "topology replaced");
        Ok(())
    }

    /// Notified whenever an immediate probe round is wanted.
    pub fn probe_requests(&self) -> &Notify {
        &self.probe_now
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Trigger shutdown.
    pub fn trigger_shutdown(&self) {
        self.shutdown.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn with_service(name: &str, route: &str) -> Config {
        let mut config = Config::default();
        config.services.push(ServiceConfig {
            name: name.to_string(),
            routes: vec![route.to_string()],
            balancing_method: Default::default(),
            target_version: None,
            enable: true,
        });
        config
    }

    #[test]
    fn test_reload_swaps_topology() {
        let state = AppState::from_config(with_service("api", "api.example.com")).unwrap();
        let old = state.registry();
        assert!(old.lookup_service("api.example.com").is_some());

        state.reload(with_service("web", "www.example.com")).unwrap();
        assert!(state.registry().lookup_service("www.example.com").is_some());
        assert!(state.registry().lookup_service("api.example.com").is_none());
        assert_eq!(state.config().services[0].name, "web");

        // A reader holding the old registry is unaffected.
        assert!(old.lookup_service("api.example.com").is_some());
    }

    #[test]
    fn test_failed_reload_keeps_state() {
        let state = AppState::from_config(with_service("api", "api.example.com")).unwrap();

        let mut broken = with_service("web", "www.example.com");
        broken.services[0].balancing_method = crate::scheduler::BalancingMethod::Random;
        assert!(state.reload(broken).is_err());

        assert!(state.registry().lookup_service("api.example.com").is_some());
        assert_eq!(state.config().services[0].name, "api");
    }

    #[tokio::test]
    async fn test_reload_requests_probe() {
        let state = AppState::from_config(Config::default()).unwrap();
        state.reload(Config::default()).unwrap();

        // notify_one stores a permit when nobody is waiting yet.
        tokio::time::timeout(
            std::time::Duration::from_secs(1),
            state.probe_requests().notified(),
        )
        .await
        .unwrap();
    }
}
