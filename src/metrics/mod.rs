//! Metrics module
//!
//! Prometheus counters and histograms for the upload pipeline.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kb_uploads_total",
        "Total number of file uploads by outcome",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kb_upload_bytes_total",
        "Total bytes uploaded and registered"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "kb_upload_duration_seconds",
        "Upload step duration in seconds",
        &["stage"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    pub static ref UPLOAD_ERRORS: CounterVec = register_counter_vec!(
        "kb_upload_errors_total",
        "Upload failures by pipeline stage",
        &["stage"]
    ).unwrap();
}

/// Record a completed upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["completed"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(stage: &str) {
    UPLOADS_TOTAL.with_label_values(&["error"]).inc();
    UPLOAD_ERRORS.with_label_values(&[stage]).inc();
}

/// Record the duration of a pipeline stage ("transfer", "registration", "total")
pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[stage])
        .observe(duration_secs);
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success() {
        record_upload_success(1024);
        // Just verify it doesn't panic
    }

    #[test]
    fn test_record_upload_failure() {
        record_upload_failure("transfer");
        assert!(UPLOAD_ERRORS.with_label_values(&["transfer"]).get() >= 1.0);
    }

    #[test]
    fn test_render_contains_upload_metrics() {
        record_stage_duration("total", 0.25);
        let text = render();
        assert!(text.contains("kb_upload_duration_seconds"));
    }
}
