//! Payload codec: turns task bytes into a [`TaskPayload`] and results back into bytes.

use crate::error::Result;
use crate::model::{ResultPayload, TaskPayload};

/// Serializes and deserializes task and result payloads.
pub trait Codec: Send + Sync {
    fn decode_task(&self, data: &[u8]) -> Result<TaskPayload>;
    fn encode_result(&self, result: &ResultPayload) -> Result<Vec<u8>>;
}

/// JSON codec (serde_json).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode_task(&self, data: &[u8]) -> Result<TaskPayload> {
        Ok(serde_json::from_slice(data)?)
    }

    fn encode_result(&self, result: &ResultPayload) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(result)?)
    }
}
