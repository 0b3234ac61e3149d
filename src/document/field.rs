//! Per-field change tracking.
//!
//! The original values of a field are never touched. Edits go into a
//! [`FieldChangeSet`], and the current values are rebuilt from both on every
//! read.

use opentelemetry::KeyValue;
use tracing::{debug, warn};

use crate::context::WorkerContext;
use crate::model::{FieldAction, FieldChanges, FieldValue};
use crate::telemetry::metrics;

/// The edit ledger of one field: an action plus the values added since the
/// field was created or last reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChangeSet {
    action: FieldAction,
    values: Vec<FieldValue>,
}

impl FieldChangeSet {
    pub fn action(&self) -> FieldAction {
        self.action
    }

    /// Values added since construction or the last reset, in call order.
    pub fn pending_values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn has_changes(&self) -> bool {
        self.action == FieldAction::Replace || !self.values.is_empty()
    }

    pub fn has_values(&self, original: &[FieldValue]) -> bool {
        !self.values.is_empty() || (self.action == FieldAction::Add && !original.is_empty())
    }

    /// Current values: originals then pending under `Add`, pending alone
    /// under `Replace`.
    pub fn current_values(&self, original: &[FieldValue]) -> Vec<FieldValue> {
        match self.action {
            FieldAction::Add => original.iter().chain(&self.values).cloned().collect(),
            FieldAction::Replace => self.values.clone(),
        }
    }

    /// Current values that are inline text, decoded.
    pub fn string_values(&self, original: &[FieldValue]) -> Vec<String> {
        let visible: &[FieldValue] = match self.action {
            FieldAction::Add => original,
            FieldAction::Replace => &[],
        };
        visible
            .iter()
            .chain(&self.values)
            .filter(|value| !value.is_reference())
            .filter_map(FieldValue::string_value)
            .collect()
    }

    pub fn push(&mut self, value: FieldValue) {
        self.values.push(value);
    }

    pub fn clear(&mut self) {
        self.action = FieldAction::Replace;
        self.values.clear();
    }

    pub fn reset(&mut self) {
        self.action = FieldAction::Add;
        self.values.clear();
    }

    /// The change to emit for this field, or `None` if it is unchanged.
    pub fn to_changes(&self) -> Option<FieldChanges> {
        self.has_changes().then(|| FieldChanges {
            action: self.action,
            values: self.values.clone(),
        })
    }
}

/// A mutable handle on one field of a [`Document`](super::Document).
pub struct Field<'d> {
    name: String,
    original: &'d [FieldValue],
    changes: &'d mut FieldChangeSet,
    context: &'d WorkerContext,
}

impl<'d> Field<'d> {
    pub(crate) fn new(
        name: String,
        original: &'d [FieldValue],
        changes: &'d mut FieldChangeSet,
        context: &'d WorkerContext,
    ) -> Self {
        Self {
            name,
            original,
            changes,
            context,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The values the field arrived with.
    pub fn original_values(&self) -> &[FieldValue] {
        self.original
    }

    /// Add a UTF-8 text value.
    ///
    /// Text longer than the inline threshold is offloaded to the value store
    /// and added as a reference; if the store fails it is added inline.
    pub async fn add(&mut self, data: impl Into<String>) {
        let data = data.into();
        let value = match self.offload(data.as_bytes()).await {
            Some(reference) => FieldValue::reference(reference),
            None => FieldValue::text(data),
        };
        self.changes.push(value);
    }

    /// Add a binary value, base64-encoded unless offloaded.
    pub async fn add_bytes(&mut self, data: &[u8]) {
        let value = match self.offload(data).await {
            Some(reference) => FieldValue::reference(reference),
            None => FieldValue::binary(data),
        };
        self.changes.push(value);
    }

    /// Add a value that already lives in the value store.
    pub fn add_reference(&mut self, reference: impl Into<String>) {
        self.changes.push(FieldValue::reference(reference));
    }

    /// Remove every value, originals included.
    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// Undo every edit, restoring the original values.
    pub fn reset(&mut self) {
        self.changes.reset();
    }

    pub fn values(&self) -> Vec<FieldValue> {
        self.changes.current_values(self.original)
    }

    pub fn string_values(&self) -> Vec<String> {
        self.changes.string_values(self.original)
    }

    pub fn has_changes(&self) -> bool {
        self.changes.has_changes()
    }

    pub fn has_values(&self) -> bool {
        self.changes.has_values(self.original)
    }

    /// Try to move an oversized value into the store. Best effort.
    async fn offload(&self, data: &[u8]) -> Option<String> {
        let settings = self.context.settings();
        if data.len() <= settings.inline_threshold {
            return None;
        }

        let attempts = settings.store_retries.saturating_add(1);
        for attempt in 1..=attempts {
            match self.context.store().store(data, None).await {
                Ok(reference) => {
                    debug!(field = %self.name, bytes = data.len(), %reference, "value offloaded");
                    metrics::value_offloads().add(1, &[KeyValue::new("result", "stored")]);
                    return Some(reference);
                }
                Err(e) => {
                    warn!(
                        field = %self.name,
                        bytes = data.len(),
                        attempt,
                        error = %e,
                        "could not store value over the inline threshold"
                    );
                }
            }
        }

        metrics::value_offloads().add(1, &[KeyValue::new("result", "inline_fallback")]);
        None
    }
}
