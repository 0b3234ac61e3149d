//! Processing logic plugged into the engine.
//!
//! A processing unit implements [`DocumentWorker`] to handle one document at a
//! time, and additionally [`BulkDocumentWorker`] if it wants to see a whole
//! batch. The engine is told which capability to use through [`Processor`].

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::document::{Document, Documents};

/// A batch-wide, retryable processing failure.
///
/// Returning this rejects every document of the current batch. Failures that
/// concern a single document belong in [`Document::add_failure`] instead.
#[derive(Debug, Error)]
#[error("transient processing failure: {message}")]
pub struct TransientError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<crate::error::Error> for TransientError {
    fn from(e: crate::error::Error) -> Self {
        Self::with_source(e.to_string(), e)
    }
}

/// Processes documents one at a time.
#[async_trait]
pub trait DocumentWorker: Send + Sync {
    async fn process_document(&self, document: &mut Document) -> Result<(), TransientError>;

    /// Release held resources. Called once, after the last batch has been answered.
    async fn close(&self) {}
}

/// Processes a lazily assembled batch of documents.
///
/// The default implementation pulls every document of the batch and hands it
/// to [`DocumentWorker::process_document`].
#[async_trait]
pub trait BulkDocumentWorker: DocumentWorker {
    async fn process_documents(&self, documents: &mut Documents<'_>) -> Result<(), TransientError> {
        while let Some(document) = documents.next_document().await {
            self.process_document(document).await?;
        }
        Ok(())
    }
}

/// Which processing capability the engine drives.
#[derive(Clone)]
pub enum Processor {
    /// One document per cycle.
    Single(Arc<dyn DocumentWorker>),
    /// Batches bounded by the configured size and time window.
    Bulk(Arc<dyn BulkDocumentWorker>),
}

impl Processor {
    pub fn mode(&self) -> &'static str {
        match self {
            Processor::Single(_) => "single",
            Processor::Bulk(_) => "bulk",
        }
    }

    /// Close the underlying worker.
    pub async fn close(&self) {
        match self {
            Processor::Single(worker) => worker.close().await,
            Processor::Bulk(worker) => worker.close().await,
        }
    }
}
