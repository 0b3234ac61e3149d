//! In-process task source over tokio channels.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

use super::TaskSource;
use crate::error::{Error, Result};
use crate::model::{TaskId, WorkerResponse, WorkerTask};

/// A response observed on a [`ChannelTaskSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResponse {
    pub task_id: TaskId,
    pub correlation_id: Option<String>,
    pub response: WorkerResponse,
}

/// Task source fed from an mpsc channel; responses go to an unbounded channel.
///
/// The source is exhausted once every task sender is dropped and the
/// channel drained.
pub struct ChannelTaskSource {
    tasks: Mutex<mpsc::Receiver<WorkerTask>>,
    responses: mpsc::UnboundedSender<TaskResponse>,
}

impl ChannelTaskSource {
    /// Create a source with room for `capacity` queued tasks.
    ///
    /// Returns the source, the sender to feed it, and the receiver on which
    /// responses appear.
    pub fn new(
        capacity: usize,
    ) -> (
        Self,
        mpsc::Sender<WorkerTask>,
        mpsc::UnboundedReceiver<TaskResponse>,
    ) {
        let (task_tx, task_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let source = Self {
            tasks: Mutex::new(task_rx),
            responses: response_tx,
        };
        (source, task_tx, response_rx)
    }
}

#[async_trait]
impl TaskSource for ChannelTaskSource {
    async fn next_task(&self, max_wait: Duration) -> Result<Option<WorkerTask>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut tasks = match tokio::time::timeout_at(deadline, self.tasks.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Ok(None),
        };
        match tokio::time::timeout_at(deadline, tasks.recv()).await {
            Ok(task) => Ok(task),
            Err(_) => Ok(None),
        }
    }

    async fn respond(&self, task: &WorkerTask, response: WorkerResponse) -> Result<()> {
        self.responses
            .send(TaskResponse {
                task_id: task.id,
                correlation_id: task.correlation_id.clone(),
                response,
            })
            .map_err(|_| Error::Other(format!("response receiver dropped for task {}", task.id)))
    }
}
