//! Integration tests for telemetry initialization and span helpers.

use document_worker::telemetry::batch::{
    record_batch_closed, record_batch_transition, start_batch_span, start_response_span,
};
use document_worker::telemetry::{TelemetryConfig, init_telemetry, metrics};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; a second
    // initialization in the same process may return Err, which is fine.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "document-worker-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = init_telemetry(config);
}

#[test]
fn batch_span_records_lifecycle() {
    let span = start_batch_span("bulk");
    record_batch_transition(&span, "new", "assembling");
    record_batch_transition(&span, "assembling", "running");
    record_batch_closed(&span, 3, "size_limit");
    record_batch_transition(&span, "running", "succeeded");
}

#[test]
fn response_span_enters() {
    let span = start_response_span(42);
    let _entered = span.enter();
}

#[test]
fn metrics_record_without_provider() {
    metrics::documents_admitted().add(1, &[]);
    metrics::batch_size().record(3, &[]);
    metrics::batch_duration_ms().record(12.5, &[]);
}
