//! Task and result payloads, as carried inside a [`WorkerTask`](super::WorkerTask).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{FieldAction, FieldValue, Failure};

/// The decoded body of a document task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default)]
    pub fields: HashMap<String, Vec<FieldValue>>,
    #[serde(default)]
    pub custom_data: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdocuments: Vec<SubdocumentPayload>,
}

/// A nested document inside a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubdocumentPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, Vec<FieldValue>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdocuments: Vec<SubdocumentPayload>,
}

/// The net edit made to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    pub action: FieldAction,
    pub values: Vec<FieldValue>,
}

/// The encoded outcome of processing one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_changes: BTreeMap<String, FieldChanges>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdocuments: Vec<SubdocumentResult>,
}

/// Changes made to a subdocument, addressed by its position in the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubdocumentResult {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_changes: BTreeMap<String, FieldChanges>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<Failure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdocuments: Vec<SubdocumentResult>,
}

impl ResultPayload {
    /// True when the result carries nothing at all.
    pub fn is_empty(&self) -> bool {
        self.field_changes.is_empty() && self.failures.is_empty() && self.subdocuments.is_empty()
    }
}
