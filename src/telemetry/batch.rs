//! Batch and document span helpers.

use tracing::Span;

/// Start a span covering one batch from assembly to the last response.
///
/// `batch.state`, `batch.size` and `batch.close_reason` are declared empty
/// and filled in as the batch progresses.
pub fn start_batch_span(mode: &str) -> Span {
    tracing::info_span!(
        "document.batch",
        "batch.mode" = mode,
        "batch.state" = tracing::field::Empty,
        "batch.size" = tracing::field::Empty,
        "batch.close_reason" = tracing::field::Empty,
    )
}

/// Record a batch state transition on the span and emit an event for it.
pub fn record_batch_transition(span: &Span, from: &str, to: &str) {
    span.record("batch.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "batch_transition");
    });
}

/// Record how the batch ended up: its size and why assembly stopped.
pub fn record_batch_closed(span: &Span, size: usize, close_reason: &str) {
    span.record("batch.size", size as u64);
    span.record("batch.close_reason", close_reason);
}

/// Start a span for synthesizing and dispatching one document's response.
pub fn start_response_span(task_id: i64) -> Span {
    tracing::debug_span!("document.respond", "task.id" = task_id)
}
