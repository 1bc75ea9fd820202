//! Metrics collector using prometheus-client.
//!
//! Tracks proxied requests per service, client connections and the outcome
//! of instance probes.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Labels for request counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub service: String,
    pub method: String,
    pub status: String,
}

/// Labels for per-service latency.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
    pub service: String,
}

/// Labels for per-instance gauges.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct InstanceLabels {
    pub service: String,
    pub instance: String,
}

/// Labels for probe outcomes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HealthCheckLabels {
    pub service: String,
    pub instance: String,
    pub result: HealthCheckResult,
}

/// Result of a health check.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HealthCheckResult {
    Success,
    Failure,
}

/// Service label used when a request never resolved to a service.
pub const UNROUTED: &str = "-";

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    requests_total: Family<RequestLabels, Counter>,
    request_duration_seconds: Family<ServiceLabels, Histogram>,
    active_connections: Gauge,
    connections_total: Counter,
    instance_alive: Family<InstanceLabels, Gauge>,
    health_checks_total: Family<HealthCheckLabels, Counter>,
    registry: Registry,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds =
            Family::<ServiceLabels, Histogram>::new_with_constructor(|| {
                // 1ms up to roughly 15s
                Histogram::new(exponential_buckets(0.001, 2.5, 12))
            });
        let active_connections = Gauge::default();
        let connections_total = Counter::default();
        let instance_alive = Family::<InstanceLabels, Gauge>::default();
        let health_checks_total = Family::<HealthCheckLabels, Counter>::default();

        registry.register(
            "dice_requests",
            "Total number of proxied requests",
            requests_total.clone(),
        );
        registry.register(
            "dice_request_duration_seconds",
            "Time until the response head was sent, in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "dice_active_connections",
            "Number of open client connections",
            active_connections.clone(),
        );
        registry.register(
            "dice_connections",
            "Total number of accepted client connections",
            connections_total.clone(),
        );
        registry.register(
            "dice_instance_alive",
            "Instance liveness from the last probe (1=alive, 0=dead)",
            instance_alive.clone(),
        );
        registry.register(
            "dice_health_checks",
            "Total number of instance probes",
            health_checks_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                active_connections,
                connections_total,
                instance_alive,
                health_checks_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed request.
    pub fn record_request(&self, service: &str, method: &str, status: u16, duration: Duration) {
        let labels = RequestLabels {
            service: service.to_string(),
            method: method.to_string(),
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        let labels = ServiceLabels {
            service: service.to_string(),
        };
        self.inner
            .request_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
    }

    pub fn connection_opened(&self) {
        self.inner.active_connections.inc();
        self.inner.connections_total.inc();
    }

    pub fn connection_closed(&self) {
        self.inner.active_connections.dec();
    }

    /// Record one probe and the resulting liveness.
    pub fn record_health_check(&self, service: &str, instance: &str, alive: bool) {
        let labels = HealthCheckLabels {
            service: service.to_string(),
            instance: instance.to_string(),
            result: if alive {
                HealthCheckResult::Success
            } else {
                HealthCheckResult::Failure
            },
        };
        self.inner.health_checks_total.get_or_create(&labels).inc();

        let labels = InstanceLabels {
            service: service.to_string(),
            instance: instance.to_string(),
        };
        self.inner
            .instance_alive
            .get_or_create(&labels)
            .set(if alive { 1 } else { 0 });
    }

    /// Start timing a request.
    pub fn start_request_timer(&self) -> RequestTimer {
        RequestTimer {
            collector: self.clone(),
            start: Instant::now(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures one request from arrival to response head.
pub struct RequestTimer {
    collector: MetricsCollector,
    start: Instant,
}

impl RequestTimer {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the request and consume the timer.
    pub fn record(self, service: &str, method: &str, status: u16) {
        self.collector
            .record_request(service, method, status, self.start.elapsed());
    }
}
