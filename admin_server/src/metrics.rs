//! Prometheus exporter setup for the admin server.

use metrics::gauge;

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Set the number of entities served by the admin site.
pub fn registered_entities(count: usize) {
    gauge!("admin_registered_entities").set(count as f64);
}
