//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use crate::db::models::Plan;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all Carta metrics
pub const METRICS_PREFIX: &str = "carta";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Public menu metrics
    describe_counter!(
        format!("{}_menu_views_total", METRICS_PREFIX),
        Unit::Count,
        "Total public menu views"
    );

    // Catalog metrics
    describe_counter!(
        format!("{}_products_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total products created"
    );

    describe_counter!(
        format!("{}_plan_limit_rejections_total", METRICS_PREFIX),
        Unit::Count,
        "Product writes rejected by the free plan limit"
    );

    // Billing metrics
    describe_counter!(
        format!("{}_upgrades_started_total", METRICS_PREFIX),
        Unit::Count,
        "Premium upgrades started"
    );

    describe_counter!(
        format!("{}_plan_changes_total", METRICS_PREFIX),
        Unit::Count,
        "Plan changes applied after reconciliation"
    );

    // Upload metrics
    describe_counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        Unit::Count,
        "Total image uploads"
    );

    // Database metrics
    describe_gauge!(
        format!("{}_db_connections_active", METRICS_PREFIX),
        Unit::Count,
        "Active database connections"
    );

    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a public menu view
pub fn record_menu_view(slug: &str) {
    counter!(
        format!("{}_menu_views_total", METRICS_PREFIX),
        "restaurant" => slug.to_string()
    )
    .increment(1);
}

/// Helper to record a product creation
pub fn record_product_created() {
    counter!(format!("{}_products_created_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a write rejected by the free plan limit
pub fn record_plan_limit_rejection() {
    counter!(format!("{}_plan_limit_rejections_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record an upgrade kickoff
pub fn record_upgrade_started() {
    counter!(format!("{}_upgrades_started_total", METRICS_PREFIX)).increment(1);
}

/// Helper to record a reconciled plan change
pub fn record_plan_change(plan: Plan) {
    counter!(
        format!("{}_plan_changes_total", METRICS_PREFIX),
        "plan" => String::from(plan)
    )
    .increment(1);
}

/// Helper to record an image upload
pub fn record_upload(kind: &str) {
    counter!(
        format!("{}_uploads_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Verify buckets are sorted and contain SLO targets
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        // P50 target (50ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.050));
        // P99 target (150ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/menu/joes-diner");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }
}
