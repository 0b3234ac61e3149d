//! Task validation: the gate between raw tasks and admitted documents.

use crate::codec::Codec;
use crate::model::task::{TASK_API_VERSION, TASK_CLASSIFIER};
use crate::model::{TaskPayload, WorkerResponse, WorkerTask};

/// Why a task was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    /// The task can never be processed here.
    Invalid(String),
    /// The task may be processable later, or elsewhere.
    Rejected(String),
}

impl Refusal {
    pub fn kind(&self) -> &'static str {
        match self {
            Refusal::Invalid(_) => "invalid",
            Refusal::Rejected(_) => "rejected",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Refusal::Invalid(reason) | Refusal::Rejected(reason) => reason,
        }
    }

    pub fn into_response(self) -> WorkerResponse {
        match self {
            Refusal::Invalid(reason) => WorkerResponse::Invalid { reason },
            Refusal::Rejected(reason) => WorkerResponse::Rejected { reason },
        }
    }
}

/// Outcome of validating one task.
#[derive(Debug)]
pub enum TaskCheck {
    Valid(TaskPayload),
    Refused(Refusal),
}

/// Check classifier and version, then decode the payload.
///
/// A version newer than this worker supports is rejected rather than
/// invalid, so the task stays available to a newer worker.
pub fn validate_task(task: &WorkerTask, codec: &dyn Codec) -> TaskCheck {
    if task.classifier != TASK_CLASSIFIER {
        return TaskCheck::Refused(Refusal::Invalid(format!(
            "task classifier {:?} is not {TASK_CLASSIFIER:?}",
            task.classifier
        )));
    }
    if task.api_version > TASK_API_VERSION {
        return TaskCheck::Refused(Refusal::Rejected(format!(
            "task api version {} is newer than supported version {TASK_API_VERSION}",
            task.api_version
        )));
    }
    if task.api_version == 0 {
        return TaskCheck::Refused(Refusal::Invalid(
            "task api version must be at least 1".to_string(),
        ));
    }
    if task.data.is_empty() {
        return TaskCheck::Refused(Refusal::Invalid("task has no data".to_string()));
    }
    match codec.decode_task(&task.data) {
        Ok(payload) => TaskCheck::Valid(payload),
        Err(e) => TaskCheck::Refused(Refusal::Invalid(format!("task data cannot be decoded: {e}"))),
    }
}
