//! Metrics module
//!
//! Prometheus counters and histograms for signing requests and transfers.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Signing metrics
    pub static ref SIGN_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "direct_uploadr_sign_requests_total",
        "Signing endpoint requests",
        &["status"]
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "direct_uploadr_uploads_total",
        "Total number of uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "direct_uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "direct_uploadr_upload_duration_seconds",
        "Upload duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "direct_uploadr_errors_total",
        "Total errors reported to on_error",
        &["type"]
    ).unwrap();
}

/// Record a signing request outcome ("success", "failure", "invalid")
pub fn record_sign_request(status: &str) {
    SIGN_REQUESTS_TOTAL.with_label_values(&[status]).inc();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(reason: &str) {
    UPLOADS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record upload duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
