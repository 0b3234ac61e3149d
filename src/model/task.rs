//! Raw work items as delivered by a task source, and the responses sent back.

use serde::{Deserialize, Serialize};

/// Classifier every document task must carry.
pub const TASK_CLASSIFIER: &str = "DocumentWorker";

/// Highest task API version this worker understands.
pub const TASK_API_VERSION: u32 = 1;

/// Delivery identifier assigned by the task source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of input pulled from a task source. The payload is still encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTask {
    pub id: TaskId,
    /// Caller-supplied identifier, echoed back on the response.
    pub correlation_id: Option<String>,
    pub classifier: String,
    pub api_version: u32,
    pub data: Vec<u8>,
}

impl WorkerTask {
    /// A task of the current classifier and version carrying `data`.
    pub fn document(id: TaskId, data: Vec<u8>) -> Self {
        Self {
            id,
            correlation_id: None,
            classifier: TASK_CLASSIFIER.to_string(),
            api_version: TASK_API_VERSION,
            data,
        }
    }

    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// What the worker reports back for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    /// Processed; `data` is the encoded result payload.
    Success { data: Vec<u8> },
    /// Not processed this time; the task may be delivered again.
    Rejected { reason: String },
    /// The task can never be processed by this worker.
    Invalid { reason: String },
}

impl WorkerResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerResponse::Success { .. })
    }

    /// Short label used in logs and metric attributes.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerResponse::Success { .. } => "success",
            WorkerResponse::Rejected { .. } => "rejected",
            WorkerResponse::Invalid { .. } => "invalid",
        }
    }
}
