//! Prometheus metrics for systemcheck server.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use systemcheck::OverallStatus;

/// Labels for per-system metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SystemLabels {
    /// Registered system name
    pub system: String,
}

/// Labels for HTTP request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    /// Endpoint (overall, system, manual_error)
    pub endpoint: String,
    /// Response status class (ok, not_found, unavailable)
    pub outcome: String,
}

/// Metrics registry with all systemcheck server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Status code per system (-1 starting, 0 healthy, 1 unhealthy)
    status_code: Family<SystemLabels, Gauge>,
    /// Buffered errors
    recent_errors: Family<SystemLabels, Gauge>,
    /// 1 until the first probe completes
    starting: Family<SystemLabels, Gauge>,
    /// Sum of every status code
    overall_code: Gauge,
    /// Registered systems
    systems_registered: Gauge,
    /// Manual escalations accepted
    manual_errors_total: Family<SystemLabels, Counter>,
    /// Status API requests
    requests_total: Family<RequestLabels, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let status_code = Family::<SystemLabels, Gauge>::default();
        registry.register(
            "systemcheck_status_code",
            "Current status per system (-1=starting, 0=healthy, 1=unhealthy)",
            status_code.clone(),
        );

        let recent_errors = Family::<SystemLabels, Gauge>::default();
        registry.register(
            "systemcheck_recent_errors",
            "Errors held in the system's error buffer",
            recent_errors.clone(),
        );

        let starting = Family::<SystemLabels, Gauge>::default();
        registry.register(
            "systemcheck_starting",
            "Whether the system has yet to complete a probe",
            starting.clone(),
        );

        let overall_code = Gauge::default();
        registry.register(
            "systemcheck_overall_code",
            "Sum of every system's status code",
            overall_code.clone(),
        );

        let systems_registered = Gauge::default();
        registry.register(
            "systemcheck_systems_registered",
            "Number of registered systems",
            systems_registered.clone(),
        );

        let manual_errors_total = Family::<SystemLabels, Counter>::default();
        registry.register(
            "systemcheck_manual_errors",
            "Manually reported errors accepted",
            manual_errors_total.clone(),
        );

        let requests_total = Family::<RequestLabels, Counter>::default();
        registry.register(
            "systemcheck_http_requests",
            "Status API requests by endpoint and outcome",
            requests_total.clone(),
        );

        Self {
            registry,
            status_code,
            recent_errors,
            starting,
            overall_code,
            systems_registered,
            manual_errors_total,
            requests_total,
        }
    }

    /// Mirror an overall status into the gauges.
    ///
    /// Per-system series are rebuilt so removed systems disappear.
    pub fn observe(&self, overall: &OverallStatus) {
        self.status_code.clear();
        self.recent_errors.clear();
        self.starting.clear();

        for (name, snapshot) in &overall.systems {
            let labels = SystemLabels { system: name.clone() };
            self.status_code.get_or_create(&labels).set(snapshot.code.code());
            self.recent_errors
                .get_or_create(&labels)
                .set(snapshot.recent_errors.len() as i64);
            self.starting.get_or_create(&labels).set(i64::from(snapshot.starting));
        }

        self.overall_code.set(overall.overall_code);
        self.systems_registered.set(overall.systems.len() as i64);
    }

    /// Record an accepted manual error
    pub fn record_manual_error(&self, system: &str) {
        self.manual_errors_total
            .get_or_create(&SystemLabels {
                system: system.to_string(),
            })
            .inc();
    }

    /// Record a status API request
    pub fn record_request(&self, endpoint: &str, outcome: &str) {
        self.requests_total
            .get_or_create(&RequestLabels {
                endpoint: endpoint.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
