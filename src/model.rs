//! Core data model.
//!
//! A field value is one datum of a named, multi-valued document field. Values
//! are immutable once built; edits to a field are tracked separately as a
//! change set (see [`crate::document::field`]).

pub mod payload;
pub mod task;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::ValueStore;

pub use payload::{FieldChanges, ResultPayload, SubdocumentPayload, SubdocumentResult, TaskPayload};
pub use task::{TaskId, WorkerResponse, WorkerTask};

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// How the `data` string of a [`FieldValue`] is to be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldEncoding {
    /// Plain UTF-8 text. The default when `encoding` is absent on the wire.
    #[default]
    #[serde(rename = "utf8")]
    Utf8,
    /// Standard base64 of arbitrary bytes.
    #[serde(rename = "base64")]
    Base64,
    /// A reference into the value store.
    #[serde(rename = "storage_ref")]
    StorageRef,
}

impl FieldEncoding {
    fn is_utf8(&self) -> bool {
        *self == FieldEncoding::Utf8
    }
}

/// One value of a document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    data: String,
    #[serde(default, skip_serializing_if = "FieldEncoding::is_utf8")]
    encoding: FieldEncoding,
}

impl FieldValue {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            encoding: FieldEncoding::Utf8,
        }
    }

    pub fn binary(data: &[u8]) -> Self {
        Self {
            data: BASE64.encode(data),
            encoding: FieldEncoding::Base64,
        }
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        Self {
            data: reference.into(),
            encoding: FieldEncoding::StorageRef,
        }
    }

    pub fn encoding(&self) -> FieldEncoding {
        self.encoding
    }

    /// The raw wire string, whatever the encoding.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn is_reference(&self) -> bool {
        self.encoding == FieldEncoding::StorageRef
    }

    /// The store reference, if this value lives in the value store.
    pub fn reference_str(&self) -> Option<&str> {
        self.is_reference().then_some(self.data.as_str())
    }

    /// The value as text, if it is inline and valid UTF-8.
    ///
    /// Base64 values qualify when their decoded bytes are UTF-8. References
    /// never do; their content has to be loaded first.
    pub fn string_value(&self) -> Option<String> {
        match self.encoding {
            FieldEncoding::Utf8 => Some(self.data.clone()),
            FieldEncoding::Base64 => BASE64
                .decode(&self.data)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok()),
            FieldEncoding::StorageRef => None,
        }
    }

    /// The inline bytes of this value.
    ///
    /// # Errors
    /// Fails for references and for base64 data that does not decode.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match self.encoding {
            FieldEncoding::Utf8 => Ok(self.data.as_bytes().to_vec()),
            FieldEncoding::Base64 => BASE64
                .decode(&self.data)
                .map_err(|e| Error::Other(format!("invalid base64 field value: {e}"))),
            FieldEncoding::StorageRef => Err(Error::Other(format!(
                "field value is a store reference: {}",
                self.data
            ))),
        }
    }

    /// The bytes of this value, fetching referenced content from `store`.
    pub async fn load(&self, store: &dyn ValueStore) -> Result<Vec<u8>> {
        match self.reference_str() {
            Some(reference) => store.retrieve(reference).await,
            None => self.bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field action
// ---------------------------------------------------------------------------

/// How a field's new values combine with its original values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAction {
    /// Originals are kept and new values follow them.
    #[default]
    Add,
    /// Originals are discarded; only new values remain.
    Replace,
}

impl std::fmt::Display for FieldAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FieldAction::Add => "add",
            FieldAction::Replace => "replace",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// A per-document failure recorded by processing code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
