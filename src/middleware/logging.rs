use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Request logging middleware with a per-request id.
///
/// Bodies are intentionally not captured: webhook payloads and signup
/// requests both carry material that has no business in log output.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        "→ Request"
    );

    let response = next.run(request).await;

    let latency = start.elapsed();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        latency_ms = %latency.as_millis(),
        "← Response"
    );

    response
}
