//! Batch assembly: pulls tasks one at a time and decides when a batch is done.
//!
//! A batch is bounded by size and by a time window. The window opens when
//! the first document is admitted, not when assembly starts, so a long wait
//! for the first task does not shorten the window for the rest. Refused
//! tasks are answered on the spot and count toward neither bound.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::shutdown::Shutdown;
use super::validate::{Refusal, TaskCheck, validate_task};
use crate::config::WorkerSettings;
use crate::context::WorkerContext;
use crate::document::Document;
use crate::model::WorkerTask;
use crate::source::TaskSource;
use crate::telemetry::metrics;

/// Result of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    Admitted,
    NoMore,
}

/// Why a batch stopped admitting documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The batch reached its maximum size.
    SizeLimit,
    /// No task arrived before the deadline, or the source is exhausted.
    WindowElapsed,
    /// Shutdown was signalled while waiting for a task.
    Interrupted,
    /// Processing code closed the batch.
    ClosedByWorker,
    /// The task source failed.
    SourceFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::SizeLimit => "size_limit",
            CloseReason::WindowElapsed => "window_elapsed",
            CloseReason::Interrupted => "interrupted",
            CloseReason::ClosedByWorker => "closed_by_worker",
            CloseReason::SourceFailed => "source_failed",
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and time bounds of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_batch_size: usize,
    pub max_batch_time: Duration,
}

impl BatchLimits {
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self {
            max_batch_size: settings.max_batch_size.max(1),
            max_batch_time: settings.max_batch_time(),
        }
    }

    /// One document, waited for up to `max_wait`.
    pub fn single(max_wait: Duration) -> Self {
        Self {
            max_batch_size: 1,
            max_batch_time: max_wait,
        }
    }
}

/// An admitted task and the document built from it.
#[derive(Debug)]
pub struct BatchEntry {
    pub task: WorkerTask,
    pub document: Document,
}

/// The documents assembled for one processing cycle. Entries are only ever appended.
#[derive(Debug, Default)]
pub struct Batch {
    entries: Vec<BatchEntry>,
    closed: bool,
    close_reason: Option<CloseReason>,
    window_end: Option<Instant>,
    refused: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// End of the batch window; set when the first document is admitted.
    pub fn window_end(&self) -> Option<Instant> {
        self.window_end
    }

    /// Tasks consumed from the source but refused by validation.
    pub fn refused(&self) -> usize {
        self.refused
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BatchEntry> {
        self.entries
    }
}

/// Fills a [`Batch`] from a task source, one admission at a time.
pub struct BatchAssembler<'a> {
    context: &'a Arc<WorkerContext>,
    source: &'a dyn TaskSource,
    shutdown: &'a Shutdown,
    limits: BatchLimits,
    batch: Batch,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(
        context: &'a Arc<WorkerContext>,
        source: &'a dyn TaskSource,
        shutdown: &'a Shutdown,
        limits: BatchLimits,
    ) -> Self {
        Self {
            context,
            source,
            shutdown,
            limits,
            batch: Batch::default(),
        }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub fn batch(&self) -> &Batch {
        &self.batch
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.batch.closed
    }

    pub fn document_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.batch.entries.get_mut(index).map(|entry| &mut entry.document)
    }

    /// Stop admitting documents; what is already admitted stays.
    pub fn close_batch(&mut self) {
        self.close(CloseReason::ClosedByWorker);
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }

    /// Try to admit one more document.
    ///
    /// Never waits once the batch is full or closed. Otherwise waits for a
    /// valid task until the batch deadline, answering refused tasks as they
    /// come. A shutdown signal closes the batch as it stands; the signal
    /// itself stays set for the caller to see.
    pub async fn try_admit_next(&mut self) -> Admission {
        if self.batch.entries.len() >= self.limits.max_batch_size {
            self.close(CloseReason::SizeLimit);
            return Admission::NoMore;
        }
        if self.batch.closed {
            return Admission::NoMore;
        }
        if self.shutdown.is_triggered() {
            self.close(CloseReason::Interrupted);
            return Admission::NoMore;
        }

        let deadline = self
            .batch
            .window_end
            .unwrap_or_else(|| Instant::now() + self.limits.max_batch_time);
        let source = self.source;
        let shutdown = self.shutdown;

        loop {
            let max_wait = deadline.saturating_duration_since(Instant::now());
            let pulled = tokio::select! {
                biased;
                _ = shutdown.triggered() => None,
                pulled = source.next_task(max_wait) => Some(pulled),
            };

            let task = match pulled {
                None => {
                    info!(size = self.batch.len(), "shutdown signalled, closing batch");
                    self.close(CloseReason::Interrupted);
                    return Admission::NoMore;
                }
                Some(Ok(None)) => {
                    self.close(CloseReason::WindowElapsed);
                    return Admission::NoMore;
                }
                Some(Err(e)) => {
                    error!(size = self.batch.len(), error = %e, "task source failed, closing batch");
                    self.close(CloseReason::SourceFailed);
                    return Admission::NoMore;
                }
                Some(Ok(Some(task))) => task,
            };

            match validate_task(&task, self.context.codec()) {
                TaskCheck::Valid(payload) => {
                    self.admit(task, payload);
                    return Admission::Admitted;
                }
                TaskCheck::Refused(refusal) => self.refuse(task, refusal).await,
            }

            // Refused tasks must not hold the batch open past its deadline.
            if Instant::now() >= deadline {
                self.close(CloseReason::WindowElapsed);
                return Admission::NoMore;
            }
        }
    }

    fn admit(&mut self, task: WorkerTask, payload: crate::model::TaskPayload) {
        if self.batch.window_end.is_none() {
            self.batch.window_end = Some(Instant::now() + self.limits.max_batch_time);
        }
        debug!(task_id = %task.id, position = self.batch.len(), "document admitted");
        metrics::documents_admitted().add(1, &[]);

        let document = Document::from_payload(Arc::clone(self.context), payload);
        self.batch.entries.push(BatchEntry { task, document });
    }

    async fn refuse(&mut self, task: WorkerTask, refusal: Refusal) {
        warn!(
            task_id = %task.id,
            kind = refusal.kind(),
            reason = refusal.reason(),
            "task refused"
        );
        metrics::tasks_refused().add(1, &[KeyValue::new("kind", refusal.kind())]);
        self.batch.refused += 1;

        if let Err(e) = self.source.respond(&task, refusal.into_response()).await {
            error!(task_id = %task.id, error = %e, "failed to answer refused task");
        }
    }

    fn close(&mut self, reason: CloseReason) {
        if self.batch.closed {
            return;
        }
        debug!(size = self.batch.len(), %reason, "batch closed");
        self.batch.closed = true;
        self.batch.close_reason = Some(reason);
    }
}
