//! Postgres-backed value store: content-addressed blobs in `document_values`.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::store::{ValueStore, content_address};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

impl super::Db {
    /// Store a blob under its content address. Storing the same bytes twice is a no-op.
    pub async fn store_value(&self, data: &[u8], hint: Option<&str>) -> Result<String> {
        let reference = content_address(data, hint);
        sqlx::query(
            "INSERT INTO document_values (reference, data, size_bytes)
             VALUES ($1, $2, $3)
             ON CONFLICT (reference) DO NOTHING",
        )
        .bind(&reference)
        .bind(data)
        .bind(data.len() as i64)
        .execute(self.pool())
        .await?;
        metrics::store_operations().add(1, &[KeyValue::new("operation", "store")]);
        Ok(reference)
    }

    /// Fetch a blob by reference.
    pub async fn retrieve_value(&self, reference: &str) -> Result<Vec<u8>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT data FROM document_values WHERE reference = $1")
                .bind(reference)
                .fetch_optional(self.pool())
                .await?;
        metrics::store_operations().add(1, &[KeyValue::new("operation", "retrieve")]);
        row.map(|(data,)| data)
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }
}

#[async_trait]
impl ValueStore for super::Db {
    async fn store(&self, data: &[u8], hint: Option<&str>) -> Result<String> {
        self.store_value(data, hint)
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>> {
        match self.retrieve_value(reference).await {
            Err(Error::Database(e)) => Err(Error::Store(e.to_string())),
            other => other,
        }
    }
}
