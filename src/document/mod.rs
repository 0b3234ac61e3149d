//! Documents as seen by processing code.
//!
//! A [`Document`] wraps the immutable field snapshot of one task. Processing
//! code reads and edits fields through [`Field`] handles; only the edits are
//! turned into the result.

pub mod documents;
pub mod field;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::context::WorkerContext;
use crate::model::{
    Failure, FieldChanges, FieldValue, ResultPayload, SubdocumentPayload, SubdocumentResult,
    TaskPayload,
};

pub use documents::Documents;
pub use field::{Field, FieldChangeSet};

/// One document (or subdocument) under processing.
pub struct Document {
    context: Arc<WorkerContext>,
    reference: Option<String>,
    fields: HashMap<String, Vec<FieldValue>>,
    custom_data: HashMap<String, String>,
    changes: BTreeMap<String, FieldChangeSet>,
    failures: Vec<Failure>,
    subdocuments: Vec<Document>,
}

impl Document {
    /// Build the view of a decoded task.
    pub fn from_payload(context: Arc<WorkerContext>, payload: TaskPayload) -> Self {
        let subdocuments = build_subdocuments(&context, payload.subdocuments);
        Self {
            context,
            reference: None,
            fields: payload.fields,
            custom_data: payload.custom_data,
            changes: BTreeMap::new(),
            failures: Vec::new(),
            subdocuments,
        }
    }

    fn from_subdocument(context: Arc<WorkerContext>, payload: SubdocumentPayload) -> Self {
        let subdocuments = build_subdocuments(&context, payload.subdocuments);
        Self {
            context,
            reference: payload.reference,
            fields: payload.fields,
            custom_data: HashMap::new(),
            changes: BTreeMap::new(),
            failures: Vec::new(),
            subdocuments,
        }
    }

    /// The subdocument reference; `None` for top-level documents.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Services available to processing code, e.g. the value store.
    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    /// A handle on the named field. The field does not need to exist yet.
    pub fn field(&mut self, name: &str) -> Field<'_> {
        let changes = self.changes.entry(name.to_string()).or_default();
        let original = self.fields.get(name).map(Vec::as_slice).unwrap_or(&[]);
        Field::new(name.to_string(), original, changes, &self.context)
    }

    /// Names of the fields the document arrived with, sorted.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn custom_data(&self, key: &str) -> Option<&str> {
        self.custom_data.get(key).map(String::as_str)
    }

    /// Record a failure against this document. Ignored when both parts are absent.
    pub fn add_failure(&mut self, failure_id: Option<&str>, failure_message: Option<&str>) {
        if failure_id.is_none() && failure_message.is_none() {
            return;
        }
        self.failures.push(Failure {
            failure_id: failure_id.map(str::to_string),
            failure_message: failure_message.map(str::to_string),
        });
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn subdocuments(&self) -> &[Document] {
        &self.subdocuments
    }

    pub fn subdocuments_mut(&mut self) -> &mut [Document] {
        &mut self.subdocuments
    }

    /// True if any field of this document (not its subdocuments) was edited.
    pub fn has_changes(&self) -> bool {
        self.changes.values().any(FieldChangeSet::has_changes)
    }

    /// The edits to emit: one entry per changed field, unchanged fields omitted.
    pub fn changes(&self) -> BTreeMap<String, FieldChanges> {
        self.changes
            .iter()
            .filter_map(|(name, set)| set.to_changes().map(|changes| (name.clone(), changes)))
            .collect()
    }

    /// Everything this document reports back: field changes, failures and
    /// the results of subdocuments that have any.
    pub fn to_result(&self) -> ResultPayload {
        ResultPayload {
            field_changes: self.changes(),
            failures: self.failures.clone(),
            subdocuments: self.subdocument_results(),
        }
    }

    fn subdocument_results(&self) -> Vec<SubdocumentResult> {
        self.subdocuments
            .iter()
            .enumerate()
            .filter_map(|(index, sub)| {
                let result = SubdocumentResult {
                    index,
                    reference: sub.reference.clone(),
                    field_changes: sub.changes(),
                    failures: sub.failures.clone(),
                    subdocuments: sub.subdocument_results(),
                };
                let empty = result.field_changes.is_empty()
                    && result.failures.is_empty()
                    && result.subdocuments.is_empty();
                (!empty).then_some(result)
            })
            .collect()
    }
}

fn build_subdocuments(
    context: &Arc<WorkerContext>,
    payloads: Vec<SubdocumentPayload>,
) -> Vec<Document> {
    payloads
        .into_iter()
        .map(|payload| Document::from_subdocument(Arc::clone(context), payload))
        .collect()
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("reference", &self.reference)
            .field("fields", &self.fields.len())
            .field("changed", &self.changes().len())
            .field("failures", &self.failures.len())
            .field("subdocuments", &self.subdocuments.len())
            .finish()
    }
}
