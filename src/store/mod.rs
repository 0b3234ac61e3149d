//! Value store: content-addressable storage for field values too large to
//! carry inline.
//!
//! Implementations must be safe for concurrent `store`/`retrieve` calls from
//! many documents at once; callers never lock around them.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryValueStore;

#[async_trait]
pub trait ValueStore: Send + Sync {
    /// Store `data` and return a reference to it.
    ///
    /// `hint` is an optional namespace that prefixes the reference.
    async fn store(&self, data: &[u8], hint: Option<&str>) -> Result<String>;

    /// Fetch the content behind `reference`.
    async fn retrieve(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Content address of `data`: its blake3 hash in hex, optionally namespaced.
pub fn content_address(data: &[u8], hint: Option<&str>) -> String {
    let hash = blake3::hash(data).to_hex();
    match hint {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{hash}"),
        _ => hash.to_string(),
    }
}
