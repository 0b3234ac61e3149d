//! Typed configuration from environment variables and an optional TOML file.
//!
//! Loads once at startup, fails fast if required vars are missing or a
//! setting is out of range. Sensitive values wrapped in
//! secrecy::SecretString to prevent log leaks.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Upper bound on pooled Postgres connections, shared by queues and the value store.
    pub database_max_connections: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub worker: WorkerSettings,
    pub queue: QueueSettings,
}

/// Batch bounds and value handling. Shared by every batch through the
/// [`WorkerContext`](crate::context::WorkerContext).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Hard cap on documents per batch. Must be at least 1.
    pub max_batch_size: usize,
    /// Batch window in milliseconds, measured from the first admitted document.
    pub max_batch_time_ms: u64,
    /// Byte length above which added values are offloaded to the value store.
    pub inline_threshold: usize,
    /// Extra store attempts before an offload falls back to an inline value.
    pub store_retries: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_batch_time_ms: 2_000,
            inline_threshold: 100,
            store_retries: 0,
        }
    }
}

impl WorkerSettings {
    pub fn max_batch_time(&self) -> Duration {
        Duration::from_millis(self.max_batch_time_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "max_batch_size must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// pgmq queue names and polling behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub input_queue: String,
    pub output_queue: String,
    /// Visibility timeout (seconds) for pgmq reads.
    pub visibility_timeout: i32,
    /// Delay between empty reads while waiting for a task.
    pub poll_interval_ms: u64,
    /// Seconds a rejected task stays invisible before it is delivered again.
    pub redelivery_delay_secs: i32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            input_queue: "document_input".to_string(),
            output_queue: "document_output".to_string(),
            visibility_timeout: 60,
            poll_interval_ms: 250,
            redelivery_delay_secs: 5,
        }
    }
}

impl QueueSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_queue.is_empty() || self.output_queue.is_empty() {
            return Err(Error::Config("queue names must not be empty".to_string()));
        }
        if self.input_queue == self.output_queue {
            return Err(Error::Config(format!(
                "input and output queue are both {}",
                self.input_queue
            )));
        }
        if self.visibility_timeout <= 0 {
            return Err(Error::Config(
                "visibility_timeout must be positive".to_string(),
            ));
        }
        if self.redelivery_delay_secs < 0 {
            return Err(Error::Config(
                "redelivery_delay_secs must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shape of the optional TOML settings file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    worker: WorkerSettings,
    queue: QueueSettings,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// If `DOCWORKER_CONFIG` names a TOML file, its `[worker]` and `[queue]`
    /// tables provide the base settings; `DOCWORKER_*` vars override them.
    pub fn from_env() -> Result<Self> {
        let file = match std::env::var("DOCWORKER_CONFIG") {
            Ok(path) => load_settings_file(Path::new(&path))?,
            Err(_) => SettingsFile::default(),
        };

        let mut worker = file.worker;
        override_var("DOCWORKER_MAX_BATCH_SIZE", &mut worker.max_batch_size)?;
        override_var("DOCWORKER_MAX_BATCH_TIME_MS", &mut worker.max_batch_time_ms)?;
        override_var("DOCWORKER_INLINE_THRESHOLD", &mut worker.inline_threshold)?;
        override_var("DOCWORKER_STORE_RETRIES", &mut worker.store_retries)?;
        worker.validate()?;

        let mut queue = file.queue;
        override_var("DOCWORKER_INPUT_QUEUE", &mut queue.input_queue)?;
        override_var("DOCWORKER_OUTPUT_QUEUE", &mut queue.output_queue)?;
        override_var(
            "DOCWORKER_REDELIVERY_DELAY_SECS",
            &mut queue.redelivery_delay_secs,
        )?;
        queue.validate()?;

        let mut database_max_connections = DEFAULT_MAX_CONNECTIONS;
        override_var("DATABASE_MAX_CONNECTIONS", &mut database_max_connections)?;
        if database_max_connections == 0 {
            return Err(Error::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            database_max_connections,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            worker,
            queue,
        })
    }
}

fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("cannot read settings file {}: {e}", path.display()))
    })?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("bad settings file {}: {e}", path.display())))
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn override_var<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}")))?;
    }
    Ok(())
}
