//! Request metrics middleware

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use carta_core::metrics::RequestMetrics;

/// Record count and latency for every request
///
/// Uses the matched route template as the endpoint label so path
/// parameters do not blow up metric cardinality.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let tracker = RequestMetrics::start(&method, &endpoint);
    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());

    response
}
