//! The lazy batch cursor handed to bulk processing code.

use super::Document;
use crate::engine::assembler::{Admission, Batch, BatchAssembler};

/// The documents of the batch being processed.
///
/// Documents are admitted on demand: each call to [`next_document`] past
/// the already-admitted ones asks the assembler for one more, which may wait
/// for the task source up to the batch deadline.
///
/// [`next_document`]: Documents::next_document
pub struct Documents<'a> {
    assembler: BatchAssembler<'a>,
    position: usize,
}

impl<'a> Documents<'a> {
    pub fn new(assembler: BatchAssembler<'a>) -> Self {
        Self {
            assembler,
            position: 0,
        }
    }

    /// The next document of the batch, or `None` once the batch is complete.
    pub async fn next_document(&mut self) -> Option<&mut Document> {
        if self.position >= self.assembler.len()
            && self.assembler.try_admit_next().await == Admission::NoMore
        {
            return None;
        }
        let index = self.position;
        self.position += 1;
        self.assembler.document_mut(index)
    }

    /// An already-admitted document by position.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.assembler.document_mut(index)
    }

    /// Number of documents admitted so far.
    pub fn current_size(&self) -> usize {
        self.assembler.len()
    }

    pub fn is_batch_closed(&self) -> bool {
        self.assembler.is_closed()
    }

    /// Stop admitting further documents into this batch.
    pub fn close_batch(&mut self) {
        self.assembler.close_batch();
    }

    pub fn into_batch(self) -> Batch {
        self.assembler.into_batch()
    }
}
