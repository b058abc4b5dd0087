use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Collects request count and latency per method/path/status.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Collapse dynamic segments (survey codes, submission ids) so the path
/// label set stays bounded.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized: Vec<&str> = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        let follows_collection = i > 0
            && matches!(segments[i - 1], "surveys" | "submissions")
            && *segment != "stats"
            && *segment != "status";
        if (follows_collection && !segment.is_empty()) || is_uuid_like(segment) {
            normalized.push("{id}");
        } else {
            normalized.push(segment);
        }
    }

    normalized.join("/")
}

fn is_uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}
