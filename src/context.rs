//! Process-wide services handed to every batch and document.

use std::sync::Arc;

use crate::codec::{Codec, JsonCodec};
use crate::config::WorkerSettings;
use crate::store::ValueStore;

/// Shared services: value store, payload codec and worker settings.
///
/// Built once at startup and shared behind an `Arc`; nothing in the crate
/// looks these up globally.
pub struct WorkerContext {
    store: Arc<dyn ValueStore>,
    codec: Arc<dyn Codec>,
    settings: WorkerSettings,
}

impl WorkerContext {
    /// A context using the JSON codec.
    pub fn new(store: Arc<dyn ValueStore>, settings: WorkerSettings) -> Self {
        Self {
            store,
            codec: Arc::new(JsonCodec),
            settings,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn store(&self) -> &dyn ValueStore {
        self.store.as_ref()
    }

    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
