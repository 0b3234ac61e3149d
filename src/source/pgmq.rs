//! Task source over pgmq: tasks are read from an input queue, results sent
//! to an output queue.
//!
//! Rejected tasks are made visible again after the redelivery delay;
//! everything else is archived once answered. Messages whose envelope cannot be read at all are
//! answered as invalid inside the source and never surface as tasks.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::TaskSource;
use crate::config::QueueSettings;
use crate::db::Db;
use crate::db::pgmq::PgmqMessage;
use crate::error::{Error, Result};
use crate::model::{TaskId, WorkerResponse, WorkerTask};

/// Input queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub task_classifier: String,
    pub task_api_version: u32,
    /// Base64 of the codec-encoded task payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_data: Option<String>,
}

impl TaskEnvelope {
    /// Wrap encoded payload bytes for the current classifier and version.
    pub fn document(task_id: Option<String>, data: &[u8]) -> Self {
        Self {
            task_id,
            task_classifier: crate::model::task::TASK_CLASSIFIER.to_string(),
            task_api_version: crate::model::task::TASK_API_VERSION,
            task_data: Some(BASE64.encode(data)),
        }
    }
}

/// Output queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub task_classifier: String,
    pub task_api_version: u32,
    pub task_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub const STATUS_SUCCESS: &str = "RESULT_SUCCESS";
pub const STATUS_INVALID: &str = "INVALID_TASK";

pub struct PgmqTaskSource {
    db: Arc<Db>,
    settings: QueueSettings,
}

impl PgmqTaskSource {
    pub fn new(db: Arc<Db>, settings: QueueSettings) -> Self {
        Self { db, settings }
    }

    /// Create the input and output queues if missing.
    pub async fn ensure_queues(&self) -> Result<()> {
        self.db.create_queue(&self.settings.input_queue).await?;
        self.db.create_queue(&self.settings.output_queue).await?;
        Ok(())
    }

    async fn send_response(&self, envelope: ResponseEnvelope) -> Result<()> {
        let body = serde_json::to_value(&envelope)?;
        self.db
            .send_to_queue(&self.settings.output_queue, &body)
            .await?;
        Ok(())
    }

    /// Answer and archive a message that never became a task.
    async fn discard(&self, msg: &PgmqMessage, error: &Error) -> Result<()> {
        let task_id = msg
            .message
            .get("taskId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        self.send_response(ResponseEnvelope {
            task_id,
            task_classifier: String::new(),
            task_api_version: 0,
            task_status: STATUS_INVALID.to_string(),
            task_data: None,
            reason: Some(error.to_string()),
        })
        .await?;
        self.db
            .archive_message(&self.settings.input_queue, msg.msg_id)
            .await
    }
}

fn parse_envelope(msg: &PgmqMessage) -> Result<WorkerTask> {
    let envelope: TaskEnvelope = serde_json::from_value(msg.message.clone())
        .map_err(|e| Error::Envelope(format!("message {}: {e}", msg.msg_id)))?;
    let data = match envelope.task_data {
        Some(encoded) => BASE64
            .decode(encoded)
            .map_err(|e| Error::Envelope(format!("message {}: taskData: {e}", msg.msg_id)))?,
        None => Vec::new(),
    };
    Ok(WorkerTask {
        id: TaskId(msg.msg_id),
        correlation_id: envelope.task_id,
        classifier: envelope.task_classifier,
        api_version: envelope.task_api_version,
        data,
    })
}

#[async_trait]
impl TaskSource for PgmqTaskSource {
    async fn next_task(&self, max_wait: Duration) -> Result<Option<WorkerTask>> {
        let deadline = Instant::now() + max_wait;
        loop {
            let msg = self
                .db
                .read_from_queue(&self.settings.input_queue, self.settings.visibility_timeout)
                .await?;

            if let Some(msg) = msg {
                match parse_envelope(&msg) {
                    Ok(task) => {
                        debug!(task_id = %task.id, read_ct = msg.read_ct, "task read");
                        return Ok(Some(task));
                    }
                    Err(e) => {
                        warn!(msg_id = msg.msg_id, error = %e, "discarding unreadable message");
                        self.discard(&msg, &e).await?;
                        if Instant::now() >= deadline {
                            return Ok(None);
                        }
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.settings.poll_interval().min(deadline - now)).await;
        }
    }

    async fn respond(&self, task: &WorkerTask, response: WorkerResponse) -> Result<()> {
        let envelope = |status: &str, task_data: Option<String>, reason: Option<String>| {
            ResponseEnvelope {
                task_id: task.correlation_id.clone(),
                task_classifier: task.classifier.clone(),
                task_api_version: task.api_version,
                task_status: status.to_string(),
                task_data,
                reason,
            }
        };

        match response {
            WorkerResponse::Success { data } => {
                self.send_response(envelope(STATUS_SUCCESS, Some(BASE64.encode(data)), None))
                    .await?;
                self.db
                    .archive_message(&self.settings.input_queue, task.id.0)
                    .await
            }
            WorkerResponse::Invalid { reason } => {
                self.send_response(envelope(STATUS_INVALID, None, Some(reason)))
                    .await?;
                self.db
                    .archive_message(&self.settings.input_queue, task.id.0)
                    .await
            }
            WorkerResponse::Rejected { reason } => {
                info!(
                    task_id = %task.id,
                    %reason,
                    delay_secs = self.settings.redelivery_delay_secs,
                    "task rejected, releasing for redelivery"
                );
                self.db
                    .release_message(
                        &self.settings.input_queue,
                        task.id.0,
                        self.settings.redelivery_delay_secs,
                    )
                    .await
            }
        }
    }
}
