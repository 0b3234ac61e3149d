//! In-process value store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ValueStore, content_address};
use crate::error::{Error, Result};

/// A [`ValueStore`] backed by a concurrent map. Content lives as long as the store.
#[derive(Debug, Default)]
pub struct MemoryValueStore {
    values: DashMap<String, Vec<u8>>,
}

impl MemoryValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl ValueStore for MemoryValueStore {
    async fn store(&self, data: &[u8], hint: Option<&str>) -> Result<String> {
        let reference = content_address(data, hint);
        self.values
            .entry(reference.clone())
            .or_insert_with(|| data.to_vec());
        Ok(reference)
    }

    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>> {
        self.values
            .get(reference)
            .map(|value| value.clone())
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }
}
