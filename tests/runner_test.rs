//! Integration tests for batch processing: all-or-nothing outcomes, response
//! synthesis, single vs bulk mode, and the worker host loop.

use async_trait::async_trait;
use document_worker::config::WorkerSettings;
use document_worker::context::WorkerContext;
use document_worker::document::{Document, Documents};
use document_worker::engine::{
    BatchOutcome, BatchRunner, CloseReason, HostStats, Shutdown, WorkerHost,
};
use document_worker::model::{
    FieldAction, FieldValue, ResultPayload, TaskId, WorkerResponse, WorkerTask,
};
use document_worker::source::{ChannelTaskSource, TaskResponse, TaskSource};
use document_worker::store::MemoryValueStore;
use document_worker::worker::{BulkDocumentWorker, DocumentWorker, Processor, TransientError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn context(max_batch_size: usize) -> Arc<WorkerContext> {
    Arc::new(WorkerContext::new(
        Arc::new(MemoryValueStore::new()),
        WorkerSettings {
            max_batch_size,
            max_batch_time_ms: 200,
            ..WorkerSettings::default()
        },
    ))
}

fn task(id: i64) -> WorkerTask {
    let payload = json!({"fields": {"ID": [{"data": id.to_string()}]}});
    WorkerTask::document(TaskId(id), serde_json::to_vec(&payload).unwrap())
        .correlation_id(format!("corr-{id}"))
}

fn source() -> (
    Arc<dyn TaskSource>,
    mpsc::Sender<WorkerTask>,
    mpsc::UnboundedReceiver<TaskResponse>,
) {
    let (source, tx, rx) = ChannelTaskSource::new(64);
    (Arc::new(source), tx, rx)
}

fn drain(responses: &mut mpsc::UnboundedReceiver<TaskResponse>) -> Vec<TaskResponse> {
    let mut out = Vec::new();
    while let Ok(response) = responses.try_recv() {
        out.push(response);
    }
    out
}

fn decode(response: &TaskResponse) -> ResultPayload {
    match &response.response {
        WorkerResponse::Success { data } => serde_json::from_slice(data).unwrap(),
        other => panic!("expected success, got {other:?}"),
    }
}

/// Tags each document with `SEEN` and fails on the document whose ID is `fail_on`.
struct Tagger {
    fail_on: Option<&'static str>,
}

#[async_trait]
impl DocumentWorker for Tagger {
    async fn process_document(&self, document: &mut Document) -> Result<(), TransientError> {
        let id = document.field("ID").string_values().join(",");
        if self.fail_on == Some(id.as_str()) {
            return Err(TransientError::new(format!("backend unavailable for {id}")));
        }
        document.field("SEEN").add(format!("seen {id}")).await;
        Ok(())
    }
}

#[async_trait]
impl BulkDocumentWorker for Tagger {}

/// Takes one document, then closes the batch.
struct FirstOnly;

#[async_trait]
impl DocumentWorker for FirstOnly {
    async fn process_document(&self, document: &mut Document) -> Result<(), TransientError> {
        document.field("ID").clear();
        Ok(())
    }
}

#[async_trait]
impl BulkDocumentWorker for FirstOnly {
    async fn process_documents(&self, documents: &mut Documents<'_>) -> Result<(), TransientError> {
        if let Some(document) = documents.next_document().await {
            self.process_document(document).await?;
        }
        documents.close_batch();
        Ok(())
    }
}

fn tagger(fail_on: Option<&'static str>) -> Processor {
    Processor::Bulk(Arc::new(Tagger { fail_on }))
}

// ---------------------------------------------------------------------------
// Batch outcomes
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn successful_batch_answers_every_task_with_its_changes() {
    let (source, tx, mut rx) = source();
    for id in 1..=3 {
        tx.send(task(id)).await.unwrap();
    }

    let runner = BatchRunner::new(context(3), source, Shutdown::new());
    let report = runner.run_batch(&tagger(None)).await;

    assert_eq!(report.size, 3);
    assert_eq!(report.outcome, BatchOutcome::Succeeded);
    assert_eq!(report.close_reason, Some(CloseReason::SizeLimit));
    assert!(!report.interrupted);
    assert!(report.response_failures.is_empty());

    let responses = drain(&mut rx);
    assert_eq!(responses.len(), 3);
    for (response, id) in responses.iter().zip(1..) {
        assert_eq!(response.task_id, TaskId(id));
        assert_eq!(response.correlation_id, Some(format!("corr-{id}")));

        let result = decode(response);
        assert_eq!(result.field_changes.len(), 1);
        let seen = &result.field_changes["SEEN"];
        assert_eq!(seen.action, FieldAction::Add);
        assert_eq!(seen.values, vec![FieldValue::text(format!("seen {id}"))]);
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failure_rejects_the_whole_batch() {
    let (source, tx, mut rx) = source();
    for id in 1..=3 {
        tx.send(task(id)).await.unwrap();
    }

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let report = runner.run_batch(&tagger(Some("2"))).await;

    // Document 3 was never pulled into the batch.
    assert_eq!(report.size, 2);
    assert_eq!(report.outcome, BatchOutcome::Rejected);
    assert_eq!(report.close_reason, None);

    let responses = drain(&mut rx);
    assert_eq!(responses.len(), 2);
    for response in &responses {
        match &response.response {
            WorkerResponse::Rejected { reason } => assert!(reason.contains("backend unavailable")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    // The untouched task is processed by the next batch.
    let report = runner.run_batch(&tagger(None)).await;
    assert_eq!(report.size, 1);
    assert_eq!(report.outcome, BatchOutcome::Succeeded);
    assert_eq!(drain(&mut rx)[0].task_id, TaskId(3));
}

#[tokio::test(start_paused = true)]
async fn unchanged_documents_still_get_a_success_response() {
    struct Noop;

    #[async_trait]
    impl DocumentWorker for Noop {
        async fn process_document(&self, _document: &mut Document) -> Result<(), TransientError> {
            Ok(())
        }
    }

    let (source, tx, mut rx) = source();
    tx.send(task(1)).await.unwrap();

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let report = runner.run_batch(&Processor::Single(Arc::new(Noop))).await;
    assert_eq!(report.size, 1);

    let responses = drain(&mut rx);
    assert!(decode(&responses[0]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn single_mode_takes_one_document_per_cycle() {
    let (source, tx, mut rx) = source();
    for id in 1..=2 {
        tx.send(task(id)).await.unwrap();
    }

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let processor = Processor::Single(Arc::new(Tagger { fail_on: None }));
    assert_eq!(processor.mode(), "single");

    let first = runner.run_batch(&processor).await;
    assert_eq!(first.size, 1);
    assert_eq!(drain(&mut rx).len(), 1);

    let second = runner.run_batch(&processor).await;
    assert_eq!(second.size, 1);
    assert_eq!(drain(&mut rx)[0].task_id, TaskId(2));
}

#[tokio::test(start_paused = true)]
async fn worker_can_close_the_batch_early() {
    let (source, tx, mut rx) = source();
    for id in 1..=3 {
        tx.send(task(id)).await.unwrap();
    }

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let report = runner.run_batch(&Processor::Bulk(Arc::new(FirstOnly))).await;
    assert_eq!(report.size, 1);
    assert_eq!(report.close_reason, Some(CloseReason::ClosedByWorker));

    let result = decode(&drain(&mut rx)[0]);
    let id = &result.field_changes["ID"];
    assert_eq!(id.action, FieldAction::Replace);
    assert!(id.values.is_empty());
}

#[tokio::test(start_paused = true)]
async fn refused_tasks_are_reported_apart_from_size() {
    let (source, tx, mut rx) = source();
    let mut bad = task(1);
    bad.data = b"{not json".to_vec();
    tx.send(bad).await.unwrap();
    tx.send(task(2)).await.unwrap();

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let report = runner.run_batch(&tagger(None)).await;
    assert_eq!(report.size, 1);
    assert_eq!(report.refused, 1);

    let responses = drain(&mut rx);
    assert!(matches!(responses[0].response, WorkerResponse::Invalid { .. }));
    assert!(responses[1].response.is_success());
}

#[tokio::test(start_paused = true)]
async fn undeliverable_responses_are_reported() {
    let (source, tx, rx) = source();
    tx.send(task(1)).await.unwrap();
    tx.send(task(2)).await.unwrap();
    drop(rx);

    let runner = BatchRunner::new(context(10), source, Shutdown::new());
    let report = runner.run_batch(&tagger(None)).await;
    assert_eq!(report.size, 2);
    assert_eq!(report.outcome, BatchOutcome::Succeeded);

    let failed: Vec<_> = report.response_failures.iter().map(|f| f.task_id).collect();
    assert_eq!(failed, vec![TaskId(1), TaskId(2)]);
}

// ---------------------------------------------------------------------------
// Worker host
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn host_processes_until_shutdown() {
    let (source, tx, mut rx) = source();
    let shutdown = Shutdown::new();
    let host = WorkerHost::new(context(2), source, tagger(None), shutdown.clone())
        .idle_backoff(Duration::from_millis(10));
    let handle = tokio::spawn(async move { host.run().await });

    for id in 1..=5 {
        tx.send(task(id)).await.unwrap();
    }
    let mut answered = Vec::new();
    while answered.len() < 5 {
        answered.push(rx.recv().await.unwrap().task_id.0);
    }
    shutdown.trigger();

    let stats = handle.await.unwrap();
    assert_eq!(answered, vec![1, 2, 3, 4, 5]);
    assert_eq!(stats.documents, 5);
    assert!(stats.batches >= 3);
    assert_eq!(stats.rejected_batches, 0);
    assert_eq!(stats.failed_responses, 0);
}

#[tokio::test(start_paused = true)]
async fn idle_host_stops_when_signalled() {
    let (source, _tx, _rx) = source();
    let host = Arc::new(WorkerHost::new(
        context(10),
        source,
        tagger(None),
        Shutdown::new(),
    ));
    let running = Arc::clone(&host);
    let handle = tokio::spawn(async move { running.run().await });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!handle.is_finished());
    host.shutdown();

    let stats = handle.await.unwrap();
    assert_eq!(stats, HostStats::default());
}

#[tokio::test(start_paused = true)]
async fn host_backs_off_after_a_rejected_batch() {
    let (source, tx, mut rx) = source();
    let shutdown = Shutdown::new();
    let processor = Processor::Bulk(Arc::new(Tagger { fail_on: Some("1") }));
    let host = WorkerHost::new(context(10), source, processor, shutdown.clone())
        .idle_backoff(Duration::from_secs(1));
    let handle = tokio::spawn(async move { host.run().await });

    tx.send(task(1)).await.unwrap();
    let first = rx.recv().await.unwrap();
    assert!(matches!(first.response, WorkerResponse::Rejected { .. }));
    let rejected_at = tokio::time::Instant::now();

    tx.send(task(2)).await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(second.response.is_success());
    assert!(rejected_at.elapsed() >= Duration::from_secs(1));

    shutdown.trigger();
    let stats = handle.await.unwrap();
    assert_eq!(stats.rejected_batches, 1);
    assert_eq!(stats.documents, 2);
}

#[tokio::test]
async fn processor_close_reaches_the_worker() {
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Pooled {
        closed: AtomicBool,
    }

    #[async_trait]
    impl DocumentWorker for Pooled {
        async fn process_document(&self, _document: &mut Document) -> Result<(), TransientError> {
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BulkDocumentWorker for Pooled {}

    let worker = Arc::new(Pooled::default());
    Processor::Bulk(worker.clone()).close().await;
    assert!(worker.closed.load(Ordering::SeqCst));

    // Workers without resources keep the no-op default.
    Processor::Single(Arc::new(Tagger { fail_on: None })).close().await;
}
