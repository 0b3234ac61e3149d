//! Batch runner: assembles a batch through the processor and answers every
//! admitted task.
//!
//! A batch either succeeds as a whole, with each task answered from its own
//! document, or is rejected as a whole when the processor reports a
//! transient failure. There is no partial success.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, error, info, warn};

use super::assembler::{Batch, BatchAssembler, BatchLimits, CloseReason};
use super::shutdown::Shutdown;
use crate::context::WorkerContext;
use crate::document::Documents;
use crate::error::{Error, Result};
use crate::model::{TaskId, WorkerResponse};
use crate::source::TaskSource;
use crate::telemetry::batch::{
    record_batch_closed, record_batch_transition, start_batch_span, start_response_span,
};
use crate::telemetry::metrics;
use crate::worker::{Processor, TransientError};

/// How a batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every admitted task got a success response.
    Succeeded,
    /// Every admitted task was rejected for redelivery.
    Rejected,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Succeeded => "succeeded",
            BatchOutcome::Rejected => "rejected",
        }
    }
}

/// A response that could not be synthesized or delivered.
#[derive(Debug)]
pub struct ResponseFailure {
    pub task_id: TaskId,
    pub error: Error,
}

/// Summary of one batch cycle.
#[derive(Debug)]
pub struct BatchReport {
    /// Documents admitted.
    pub size: usize,
    /// Tasks refused by validation while assembling.
    pub refused: usize,
    pub outcome: BatchOutcome,
    /// `None` if processing finished before the batch was closed.
    pub close_reason: Option<CloseReason>,
    /// Assembly stopped because shutdown was signalled.
    pub interrupted: bool,
    pub response_failures: Vec<ResponseFailure>,
    pub duration: Duration,
}

/// Runs batch cycles against one task source.
#[derive(Clone)]
pub struct BatchRunner {
    context: Arc<WorkerContext>,
    source: Arc<dyn TaskSource>,
    shutdown: Shutdown,
}

impl BatchRunner {
    pub fn new(context: Arc<WorkerContext>, source: Arc<dyn TaskSource>, shutdown: Shutdown) -> Self {
        Self {
            context,
            source,
            shutdown,
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.context
    }

    /// Assemble and process one batch, then answer every admitted task.
    pub async fn run_batch(&self, processor: &Processor) -> BatchReport {
        let span = start_batch_span(processor.mode());
        self.run_batch_inner(processor, &span)
            .instrument(span.clone())
            .await
    }

    async fn run_batch_inner(&self, processor: &Processor, span: &tracing::Span) -> BatchReport {
        let started = Instant::now();
        let settings = self.context.settings();
        let limits = match processor {
            Processor::Single(_) => BatchLimits::single(settings.max_batch_time()),
            Processor::Bulk(_) => BatchLimits::from_settings(settings),
        };

        record_batch_transition(span, "new", "assembling");
        let assembler = BatchAssembler::new(&self.context, self.source.as_ref(), &self.shutdown, limits);
        let mut documents = Documents::new(assembler);

        record_batch_transition(span, "assembling", "running");
        let processed = match processor {
            Processor::Single(worker) => match documents.next_document().await {
                Some(document) => worker.process_document(document).await,
                None => Ok(()),
            },
            Processor::Bulk(worker) => worker.process_documents(&mut documents).await,
        };

        let batch = documents.into_batch();
        let size = batch.len();
        let refused = batch.refused();
        let close_reason = batch.close_reason();
        record_batch_closed(span, size, close_reason.map_or("open", |r| r.as_str()));

        let (outcome, response_failures) = match processed {
            Ok(()) => {
                let failures = self.respond_success(batch).await;
                record_batch_transition(span, "running", "succeeded");
                (BatchOutcome::Succeeded, failures)
            }
            Err(e) => {
                warn!(size, error = %e, "processing failed, rejecting whole batch");
                let failures = self.respond_rejected(batch, &e).await;
                record_batch_transition(span, "running", "rejected");
                (BatchOutcome::Rejected, failures)
            }
        };

        let duration = started.elapsed();
        let close_label = close_reason.map_or("open", |r| r.as_str());
        metrics::batches_completed().add(
            1,
            &[
                KeyValue::new("outcome", outcome.as_str()),
                KeyValue::new("close_reason", close_label),
            ],
        );
        metrics::batch_size().record(size as u64, &[]);
        metrics::batch_duration_ms().record(duration.as_secs_f64() * 1000.0, &[]);

        if size > 0 || refused > 0 {
            info!(
                size,
                refused,
                outcome = outcome.as_str(),
                close_reason = close_label,
                duration_ms = duration.as_millis() as u64,
                failed_responses = response_failures.len(),
                "batch completed"
            );
        }

        BatchReport {
            size,
            refused,
            outcome,
            close_reason,
            interrupted: close_reason == Some(CloseReason::Interrupted),
            response_failures,
            duration,
        }
    }

    /// Answer every task from its own document.
    async fn respond_success(&self, batch: Batch) -> Vec<ResponseFailure> {
        let mut failures = Vec::new();
        for entry in batch.into_entries() {
            let task_id = entry.task.id;
            let delivered: Result<()> = async {
                let data = self
                    .context
                    .codec()
                    .encode_result(&entry.document.to_result())?;
                self.source
                    .respond(&entry.task, WorkerResponse::Success { data })
                    .await
            }
            .instrument(start_response_span(task_id.0))
            .await;

            if let Err(error) = delivered {
                record_response_failure(&mut failures, task_id, error);
            }
        }
        failures
    }

    /// Reject every task of the batch for redelivery.
    async fn respond_rejected(&self, batch: Batch, cause: &TransientError) -> Vec<ResponseFailure> {
        let mut failures = Vec::new();
        for entry in batch.into_entries() {
            let task_id = entry.task.id;
            let response = WorkerResponse::Rejected {
                reason: cause.to_string(),
            };
            if let Err(error) = self.source.respond(&entry.task, response).await {
                record_response_failure(&mut failures, task_id, error);
            }
        }
        failures
    }
}

fn record_response_failure(failures: &mut Vec<ResponseFailure>, task_id: TaskId, error: Error) {
    error!(task_id = %task_id, error = %error, "could not deliver response");
    metrics::response_failures().add(1, &[]);
    failures.push(ResponseFailure { task_id, error });
}
