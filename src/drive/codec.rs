//! Record payload encoding
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┐
//! │ Len (4, LE)  │ LZ4 block (uncompressed size prepended)  │
//! └──────────────┴──────────────────────────────────────────┘
//! ```
//!
//! The length prefix lets the reader drop whatever stale bytes follow the
//! payload inside its last packet.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

const LEN_SIZE: usize = 4;

/// Serialize, compress and frame a value.
pub(crate) fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    let raw = bincode::serialize(value)
        .map_err(|e| StoreError::Serialization(format!("Failed to encode record: {}", e)))?;
    let compressed = lz4_flex::compress_prepend_size(&raw);

    let len = u32::try_from(compressed.len()).map_err(|_| {
        StoreError::Serialization(format!(
            "Compressed record of {} bytes exceeds the frame limit",
            compressed.len()
        ))
    })?;

    let mut framed = Vec::with_capacity(LEN_SIZE + compressed.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(&compressed);
    Ok(framed)
}

/// Unframe, decompress and deserialize bytes gathered from a chain.
pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    if bytes.len() < LEN_SIZE {
        return Err(StoreError::Persistence(format!(
            "Record frame truncated: {} bytes",
            bytes.len()
        )));
    }
    let mut len_bytes = [0u8; LEN_SIZE];
    len_bytes.copy_from_slice(&bytes[..LEN_SIZE]);
    let len = u32::from_le_bytes(len_bytes) as usize;

    let body = bytes.get(LEN_SIZE..LEN_SIZE + len).ok_or_else(|| {
        StoreError::Persistence(format!(
            "Record frame declares {} bytes but chain holds {}",
            len,
            bytes.len() - LEN_SIZE
        ))
    })?;

    let raw = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| StoreError::Persistence(format!("Failed to decompress record: {}", e)))?;
    bincode::deserialize(&raw)
        .map_err(|e| StoreError::Persistence(format!("Failed to decode record: {}", e)))
}
