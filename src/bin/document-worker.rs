//! document-worker CLI: runs the batch engine over pgmq and submits tasks.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use document_worker::config::Config;
use document_worker::config::secrets::ExposeSecret;
use document_worker::context::WorkerContext;
use document_worker::db::Db;
use document_worker::document::Document;
use document_worker::engine::{Shutdown, WorkerHost};
use document_worker::model::TaskPayload;
use document_worker::source::{PgmqTaskSource, TaskSource};
use document_worker::source::pgmq::TaskEnvelope;
use document_worker::telemetry::{TelemetryConfig, init_telemetry};
use document_worker::worker::{BulkDocumentWorker, DocumentWorker, Processor, TransientError};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "document-worker", about = "Batching document worker over pgmq")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run worker hosts until ctrl-c
    Serve {
        /// Number of concurrent batch hosts
        #[arg(long, default_value_t = 1)]
        workers: usize,
        /// Process one document per cycle instead of batches
        #[arg(long)]
        single: bool,
        /// Pause after an empty cycle, in milliseconds
        #[arg(long, default_value_t = 1000)]
        idle_backoff_ms: u64,
    },
    /// Send a task payload (JSON file) to the input queue
    Submit {
        /// Path to a JSON task payload
        file: PathBuf,
        /// Correlation id echoed on the response (default: random UUID)
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Check database connectivity
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            workers,
            single,
            idle_backoff_ms,
        } => cmd_serve(config, workers, single, idle_backoff_ms).await,
        Command::Submit { file, task_id } => cmd_submit(config, file, task_id).await,
        Command::Health => {
            let db = Db::connect(config.database_url.expose_secret(), 1).await?;
            db.health_check().await?;
            println!("ok");
            Ok(())
        }
    }
}

async fn cmd_serve(
    config: Config,
    workers: usize,
    single: bool,
    idle_backoff_ms: u64,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "document-worker".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let db = Db::connect(
        config.database_url.expose_secret(),
        config.database_max_connections,
    )
    .await?;
    let db = Arc::new(db);
    db.migrate().await?;

    let source = PgmqTaskSource::new(Arc::clone(&db), config.queue.clone());
    source.ensure_queues().await?;
    let source: Arc<dyn TaskSource> = Arc::new(source);

    let context = Arc::new(WorkerContext::new(db, config.worker.clone()));
    let word_count = Arc::new(WordCountWorker);
    let processor = if single {
        Processor::Single(word_count)
    } else {
        Processor::Bulk(word_count)
    };

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        signal.trigger();
    });

    let mut hosts = Vec::with_capacity(workers.max(1));
    for _ in 0..workers.max(1) {
        let host = WorkerHost::new(
            Arc::clone(&context),
            Arc::clone(&source),
            processor.clone(),
            shutdown.clone(),
        )
        .idle_backoff(Duration::from_millis(idle_backoff_ms));
        hosts.push(tokio::spawn(async move { host.run().await }));
    }

    for host in hosts {
        let stats = host.await?;
        tracing::info!(?stats, "host finished");
    }
    processor.close().await;
    Ok(())
}

async fn cmd_submit(config: Config, file: PathBuf, task_id: Option<String>) -> anyhow::Result<()> {
    let content = tokio::fs::read(&file).await?;
    // Parse first so malformed files fail here rather than in the worker.
    let payload: TaskPayload = serde_json::from_slice(&content)?;
    let data = serde_json::to_vec(&payload)?;

    let db = Db::connect(config.database_url.expose_secret(), 1).await?;
    db.migrate().await?;
    db.create_queue(&config.queue.input_queue).await?;

    let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let envelope = TaskEnvelope::document(Some(task_id.clone()), &data);
    let msg_id = db
        .send_to_queue(&config.queue.input_queue, &serde_json::to_value(&envelope)?)
        .await?;

    println!("Submitted: {task_id} (message {msg_id})");
    Ok(())
}

/// Counts the words of every field and records the total in `WORD_COUNT`.
///
/// Referenced values are loaded from the value store; a store failure fails
/// the batch so it can be retried.
struct WordCountWorker;

const WORD_COUNT_FIELD: &str = "WORD_COUNT";

fn count_document<'a>(
    document: &'a mut Document,
) -> Pin<Box<dyn Future<Output = Result<(), TransientError>> + Send + 'a>> {
    Box::pin(async move {
        let names: Vec<String> = document.field_names().into_iter().map(str::to_string).collect();
        let mut words = 0usize;
        for name in names {
            if name == WORD_COUNT_FIELD {
                continue;
            }
            let values = document.field(&name).values();
            for value in values {
                let text = match value.string_value() {
                    Some(text) => text,
                    None if value.is_reference() => {
                        let bytes = value.load(document.context().store()).await?;
                        String::from_utf8_lossy(&bytes).into_owned()
                    }
                    None => continue,
                };
                words += text.split_whitespace().count();
            }
        }

        if words == 0 {
            document.add_failure(Some("NO_TEXT"), Some("document has no text to count"));
        }
        let mut field = document.field(WORD_COUNT_FIELD);
        field.clear();
        field.add(words.to_string()).await;

        for subdocument in document.subdocuments_mut() {
            count_document(subdocument).await?;
        }
        Ok(())
    })
}

#[async_trait]
impl DocumentWorker for WordCountWorker {
    async fn process_document(&self, document: &mut Document) -> Result<(), TransientError> {
        count_document(document).await
    }
}

#[async_trait]
impl BulkDocumentWorker for WordCountWorker {}
