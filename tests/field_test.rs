//! Integration tests for per-field change tracking and value offloading.

use async_trait::async_trait;
use document_worker::config::WorkerSettings;
use document_worker::context::WorkerContext;
use document_worker::document::Document;
use document_worker::error::{Error, Result};
use document_worker::model::{FieldAction, FieldEncoding, FieldValue, TaskPayload};
use document_worker::store::{MemoryValueStore, ValueStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn context_with(store: Arc<dyn ValueStore>, inline_threshold: usize) -> Arc<WorkerContext> {
    Arc::new(WorkerContext::new(
        store,
        WorkerSettings {
            inline_threshold,
            ..WorkerSettings::default()
        },
    ))
}

fn document(context: Arc<WorkerContext>, fields: &[(&str, &[&str])]) -> Document {
    let fields = fields
        .iter()
        .map(|(name, values)| {
            let values = values.iter().map(|v| FieldValue::text(*v)).collect();
            (name.to_string(), values)
        })
        .collect::<HashMap<_, _>>();
    Document::from_payload(
        context,
        TaskPayload {
            fields,
            ..TaskPayload::default()
        },
    )
}

/// Store that always fails, counting attempts.
#[derive(Default)]
struct BrokenStore {
    attempts: AtomicUsize,
}

#[async_trait]
impl ValueStore for BrokenStore {
    async fn store(&self, _data: &[u8], _hint: Option<&str>) -> Result<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Store("store unavailable".to_string()))
    }

    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>> {
        Err(Error::NotFound(reference.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Ledger semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_appends_after_originals() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[("F", &["a", "b"])]);

    let mut field = doc.field("F");
    assert!(!field.has_changes());
    field.add("c").await;

    assert_eq!(field.string_values(), vec!["a", "b", "c"]);
    assert!(field.has_changes());

    let changes = doc.changes();
    let f = &changes["F"];
    assert_eq!(f.action, FieldAction::Add);
    assert_eq!(f.values, vec![FieldValue::text("c")]);
}

#[tokio::test]
async fn clear_then_add_replaces_originals() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[("F", &["a", "b"])]);

    let mut field = doc.field("F");
    field.add("c").await;
    field.clear();
    assert!(field.has_changes());
    assert!(!field.has_values());
    assert!(field.values().is_empty());

    field.add("d").await;
    assert_eq!(field.string_values(), vec!["d"]);
    assert_eq!(field.original_values().len(), 2);

    let changes = doc.changes();
    assert_eq!(changes["F"].action, FieldAction::Replace);
    assert_eq!(changes["F"].values, vec![FieldValue::text("d")]);
}

#[tokio::test]
async fn reset_restores_originals_and_drops_the_change() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[("F", &["a", "b"])]);

    {
        let mut field = doc.field("F");
        field.add("c").await;
        field.clear();
        field.add("d").await;
        field.reset();

        assert!(!field.has_changes());
        assert_eq!(field.string_values(), vec!["a", "b"]);
    }
    assert!(!doc.has_changes());
    assert!(doc.changes().is_empty());
}

#[tokio::test]
async fn clear_on_empty_field_is_still_a_change() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[]);

    let mut field = doc.field("NEW");
    assert!(!field.has_values());
    field.clear();
    assert!(field.has_changes());

    let changes = doc.changes();
    assert_eq!(changes["NEW"].action, FieldAction::Replace);
    assert!(changes["NEW"].values.is_empty());
}

#[tokio::test]
async fn reading_a_missing_field_records_nothing() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[("F", &["a"])]);

    assert!(doc.field("MISSING").values().is_empty());
    assert!(!doc.field("MISSING").has_values());
    assert!(doc.field("F").has_values());
    assert!(doc.changes().is_empty());
}

#[tokio::test]
async fn string_values_skip_references_and_decode_base64() {
    let ctx = context_with(Arc::new(MemoryValueStore::new()), 100);
    let mut doc = document(ctx, &[("F", &["a"])]);

    let mut field = doc.field("F");
    field.add_bytes(b"bytes").await;
    field.add_reference("some/ref");
    field.add_bytes(&[0xff, 0xfe]).await;

    assert_eq!(field.values().len(), 4);
    assert_eq!(field.string_values(), vec!["a", "bytes"]);

    let values = field.values();
    assert_eq!(values[1].encoding(), FieldEncoding::Base64);
    assert_eq!(values[2].reference_str(), Some("some/ref"));
    assert_eq!(values[3].bytes().unwrap(), vec![0xff, 0xfe]);
}

// ---------------------------------------------------------------------------
// Offloading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn value_over_threshold_is_offloaded() {
    let store = Arc::new(MemoryValueStore::new());
    let ctx = context_with(store.clone(), 10);
    let mut doc = document(ctx, &[]);

    let long = "x".repeat(11);
    let mut field = doc.field("BODY");
    field.add("0123456789").await;
    field.add(long.clone()).await;

    let values = field.values();
    assert_eq!(values[0], FieldValue::text("0123456789"));
    assert!(values[1].is_reference());
    assert_eq!(store.len(), 1);

    let loaded = values[1].load(&*store).await.unwrap();
    assert_eq!(loaded, long.as_bytes());
    assert_eq!(field.string_values(), vec!["0123456789"]);
}

#[tokio::test]
async fn threshold_counts_bytes_not_chars() {
    let store = Arc::new(MemoryValueStore::new());
    let ctx = context_with(store.clone(), 4);
    let mut doc = document(ctx, &[]);

    // Three chars, six bytes.
    doc.field("F").add("äöü").await;
    assert!(doc.field("F").values()[0].is_reference());
}

#[tokio::test]
async fn store_failure_falls_back_to_inline_after_retries() {
    let store = Arc::new(BrokenStore::default());
    let ctx = Arc::new(WorkerContext::new(
        store.clone(),
        WorkerSettings {
            inline_threshold: 2,
            store_retries: 2,
            ..WorkerSettings::default()
        },
    ));
    let mut doc = document(ctx, &[]);

    doc.field("F").add("too long").await;
    doc.field("B").add_bytes(b"raw bytes").await;

    assert_eq!(store.attempts.load(Ordering::SeqCst), 6);
    assert_eq!(doc.field("F").values(), vec![FieldValue::text("too long")]);
    assert_eq!(doc.field("B").values(), vec![FieldValue::binary(b"raw bytes")]);
}

#[tokio::test]
async fn add_reference_never_touches_the_store() {
    let store = Arc::new(BrokenStore::default());
    let ctx = context_with(store.clone(), 0);
    let mut doc = document(ctx, &[]);

    doc.field("F").add_reference("x".repeat(500));
    assert_eq!(store.attempts.load(Ordering::SeqCst), 0);
    assert!(doc.field("F").values()[0].is_reference());
}
