//! Metric instrument factories for document-worker.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"document-worker"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("document-worker")
}

/// Counter: documents admitted into a batch.
pub fn documents_admitted() -> Counter<u64> {
    meter()
        .u64_counter("docworker.documents.admitted")
        .with_description("Number of documents admitted into batches")
        .build()
}

/// Counter: tasks answered during assembly without being admitted.
/// Labels: `kind` ("invalid" | "rejected").
pub fn tasks_refused() -> Counter<u64> {
    meter()
        .u64_counter("docworker.tasks.refused")
        .with_description("Number of tasks refused by validation")
        .build()
}

/// Counter: completed batches.
/// Labels: `outcome` ("succeeded" | "rejected"), `close_reason`.
pub fn batches_completed() -> Counter<u64> {
    meter()
        .u64_counter("docworker.batches.completed")
        .with_description("Number of batches run to completion")
        .build()
}

/// Histogram: documents per batch.
pub fn batch_size() -> Histogram<u64> {
    meter()
        .u64_histogram("docworker.batch.size")
        .with_description("Documents per batch")
        .build()
}

/// Histogram: batch duration from assembly start to last response.
pub fn batch_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("docworker.batch.duration_ms")
        .with_description("Batch duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: responses that could not be encoded or delivered.
pub fn response_failures() -> Counter<u64> {
    meter()
        .u64_counter("docworker.responses.failed")
        .with_description("Number of responses that could not be synthesized or delivered")
        .build()
}

/// Counter: oversized values pushed to the value store.
/// Labels: `result` ("stored" | "inline_fallback").
pub fn value_offloads() -> Counter<u64> {
    meter()
        .u64_counter("docworker.values.offloads")
        .with_description("Oversized field values offloaded to the value store")
        .build()
}

/// Counter: queue-level operations (create, send, read, archive, release).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("docworker.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: Postgres value store operations.
/// Labels: `operation` ("store" | "retrieve").
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("docworker.store.operations")
        .with_description("Number of value store operations")
        .build()
}
