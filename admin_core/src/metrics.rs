//! Prometheus-style counters for admin activity.
//!
//! Recording is a no-op until the host installs a metrics recorder.

use metrics::counter;

/// Record a rendered admin view.
pub fn request(view: &'static str) {
    counter!("admin_requests_total", "view" => view).increment(1);
}

pub fn entity_created(entity: &str) {
    counter!("admin_entities_created_total", "entity" => entity.to_string()).increment(1);
}

pub fn entity_updated(entity: &str) {
    counter!("admin_entities_updated_total", "entity" => entity.to_string()).increment(1);
}

pub fn entities_deleted(entity: &str, count: u64) {
    counter!("admin_entities_deleted_total", "entity" => entity.to_string()).increment(count);
}

/// Record an error response.
pub fn error_recorded(kind: &'static str) {
    counter!("admin_errors_total", "kind" => kind).increment(1);
}
