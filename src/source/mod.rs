//! Task sources: where work items come from and where responses go.

pub mod channel;
pub mod pgmq;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::model::{WorkerResponse, WorkerTask};

pub use channel::{ChannelTaskSource, TaskResponse};
pub use pgmq::PgmqTaskSource;

#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Wait up to `max_wait` for the next task.
    ///
    /// Returns `Ok(None)` when nothing arrived in time or the source is
    /// exhausted. Must not block longer than `max_wait`.
    async fn next_task(&self, max_wait: Duration) -> Result<Option<WorkerTask>>;

    /// Accept the response for a task previously returned by `next_task`.
    async fn respond(&self, task: &WorkerTask, response: WorkerResponse) -> Result<()>;
}
