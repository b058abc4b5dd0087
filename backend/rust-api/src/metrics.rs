use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref SUBMISSIONS_CREATED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_created_total",
        "Total number of survey submissions accepted",
        &["survey"]
    )
    .unwrap();

    // Reasons are internal-only; the client always sees the same generic
    // rejection.
    pub static ref SUBMISSIONS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_rejected_total",
        "Total number of submissions rejected before persistence",
        &["reason"]
    )
    .unwrap();

    pub static ref REVIEW_DECISIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "review_decisions_total",
        "Total number of review decisions recorded",
        &["outcome"]
    )
    .unwrap();
}

pub fn record_abuse_rejection(reason: &str) {
    SUBMISSIONS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
}

/// Render the prometheus registry as text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
