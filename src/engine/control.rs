//! Worker host: runs batch cycles until shutdown.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::runner::{BatchOutcome, BatchReport, BatchRunner};
use super::shutdown::Shutdown;
use crate::context::WorkerContext;
use crate::source::TaskSource;
use crate::worker::Processor;

/// Totals over the lifetime of a host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub batches: u64,
    pub documents: u64,
    pub refused: u64,
    pub rejected_batches: u64,
    pub failed_responses: u64,
}

impl HostStats {
    fn record(&mut self, report: &BatchReport) {
        if report.size == 0 && report.refused == 0 {
            return;
        }
        self.batches += 1;
        self.documents += report.size as u64;
        self.refused += report.refused as u64;
        if report.outcome == BatchOutcome::Rejected {
            self.rejected_batches += 1;
        }
        self.failed_responses += report.response_failures.len() as u64;
    }
}

/// Repeatedly assembles and processes batches from one source.
///
/// Several hosts may share a context, source and shutdown signal and run on
/// separate tasks; each works on its own batch.
pub struct WorkerHost {
    runner: BatchRunner,
    processor: Processor,
    shutdown: Shutdown,
    idle_backoff: Duration,
}

impl WorkerHost {
    pub fn new(
        context: Arc<WorkerContext>,
        source: Arc<dyn TaskSource>,
        processor: Processor,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            runner: BatchRunner::new(context, source, shutdown.clone()),
            processor,
            shutdown,
            idle_backoff: Duration::from_secs(1),
        }
    }

    /// Pause after a cycle that saw no tasks at all, or whose batch was rejected.
    pub fn idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    /// Signal the host (and every host sharing its signal) to stop.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Run batch cycles until shutdown. Work admitted before the signal is
    /// still processed and answered.
    pub async fn run(&self) -> HostStats {
        let mut stats = HostStats::default();
        info!(mode = self.processor.mode(), "worker host started");

        while !self.shutdown.is_triggered() {
            let report = self.runner.run_batch(&self.processor).await;
            stats.record(&report);

            if report.interrupted {
                break;
            }
            if !report.response_failures.is_empty() {
                warn!(
                    failed = report.response_failures.len(),
                    "some responses were not delivered; their tasks will be redelivered"
                );
            }
            let idle = report.size == 0 && report.refused == 0;
            if idle || report.outcome == BatchOutcome::Rejected {
                tokio::select! {
                    _ = self.shutdown.triggered() => break,
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
            }
        }

        info!(
            batches = stats.batches,
            documents = stats.documents,
            refused = stats.refused,
            "worker host stopped"
        );
        stats
    }
}
