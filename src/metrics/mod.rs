/// Metrics and health endpoints
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Health status for the service
#[derive(Debug, Clone, Copy)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Metrics registry wrapper
pub struct MetricsRegistry {
    registry: Registry,
    pub requests_total: IntCounter,
    pub reconciliations_total: IntCounter,
    pub dns_sync_errors_total: IntCounter,
    pub certs_issued_total: IntCounter,
    pub certs_renewed_total: IntCounter,
    pub renewal_failures_total: IntCounter,
    pub certs_managed: IntGauge,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();
        let requests_total =
            IntCounter::new("navigator_requests_total", "Total control API requests").unwrap();
        let reconciliations_total = IntCounter::new(
            "navigator_reconciliations_total",
            "Total DNS/LB reconciliation passes",
        )
        .unwrap();
        let dns_sync_errors_total = IntCounter::new(
            "navigator_dns_sync_errors_total",
            "Total partial DNS/LB sync failures",
        )
        .unwrap();
        let certs_issued_total =
            IntCounter::new("navigator_certs_issued_total", "Total certificates issued").unwrap();
        let certs_renewed_total =
            IntCounter::new("navigator_certs_renewed_total", "Total certificates renewed").unwrap();
        let renewal_failures_total = IntCounter::new(
            "navigator_renewal_failures_total",
            "Total certificate renewal failures",
        )
        .unwrap();
        let certs_managed =
            IntGauge::new("navigator_certs_managed", "Currently managed certificate count").unwrap();

        registry.register(Box::new(requests_total.clone())).unwrap();
        registry
            .register(Box::new(reconciliations_total.clone()))
            .unwrap();
        registry
            .register(Box::new(dns_sync_errors_total.clone()))
            .unwrap();
        registry.register(Box::new(certs_issued_total.clone())).unwrap();
        registry
            .register(Box::new(certs_renewed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(renewal_failures_total.clone()))
            .unwrap();
        registry.register(Box::new(certs_managed.clone())).unwrap();

        Self {
            registry,
            requests_total,
            reconciliations_total,
            dns_sync_errors_total,
            certs_issued_total,
            certs_renewed_total,
            renewal_failures_total,
            certs_managed,
        }
    }

    pub fn gather_text(&self) -> String {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&mf, &mut buffer).unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Health check response
pub fn health_status(status: HealthStatus) -> (&'static str, u16) {
    match status {
        HealthStatus::Healthy => ("ok", 200),
        HealthStatus::Degraded => ("degraded", 200),
        HealthStatus::Unhealthy => ("unhealthy", 503),
    }
}

/// Shared metrics type
pub type SharedMetrics = Arc<MetricsRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_text_includes_registered_metrics() {
        let metrics = MetricsRegistry::new();
        metrics.certs_issued_total.inc();
        let text = metrics.gather_text();
        assert!(text.contains("navigator_certs_issued_total"));
    }

    #[test]
    fn health_status_maps_to_http_codes() {
        assert_eq!(health_status(HealthStatus::Healthy).1, 200);
        assert_eq!(health_status(HealthStatus::Unhealthy).1, 503);
    }
}
