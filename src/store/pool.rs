//! Content pool layout
//!
//! Each distinct content is stored once per partition under `blob:<hex>`,
//! with its reference count under `refs:<hex>`. Stored bytes carry a one-byte
//! marker: 0x00 for raw content, 0x01 for LZ4 (size-prepended).

use super::{StoreError, StoreResult};
use crate::model::ContentHash;

const MARKER_RAW: u8 = 0x00;
const MARKER_LZ4: u8 = 0x01;

/// Engine key holding the content bytes
pub(crate) fn blob_key(hash: &ContentHash) -> Vec<u8> {
    format!("blob:{}", hash.to_hex()).into_bytes()
}

/// Engine key holding the reference count
pub(crate) fn refs_key(hash: &ContentHash) -> Vec<u8> {
    format!("refs:{}", hash.to_hex()).into_bytes()
}

/// Encode content for the pool, compressing only when it helps
pub(crate) fn encode(data: &[u8]) -> Vec<u8> {
    let compressed = lz4_flex::compress_prepend_size(data);
    if compressed.len() < data.len() {
        let mut stored = Vec::with_capacity(compressed.len() + 1);
        stored.push(MARKER_LZ4);
        stored.extend_from_slice(&compressed);
        stored
    } else {
        let mut stored = Vec::with_capacity(data.len() + 1);
        stored.push(MARKER_RAW);
        stored.extend_from_slice(data);
        stored
    }
}

/// Decode pool bytes and check them against the expected hash
pub(crate) fn decode(hash: &ContentHash, stored: &[u8]) -> StoreResult<Vec<u8>> {
    let (&marker, payload) = stored
        .split_first()
        .ok_or_else(|| StoreError::Corrupted(format!("empty pool entry {}", hash)))?;

    let data = match marker {
        MARKER_RAW => payload.to_vec(),
        MARKER_LZ4 => lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| StoreError::Corrupted(format!("pool entry {}: {}", hash, e)))?,
        other => {
            return Err(StoreError::Corrupted(format!(
                "pool entry {} has unknown marker {:#04x}",
                hash, other
            )))
        }
    };

    if ContentHash::of(&data) != *hash {
        return Err(StoreError::Corrupted(format!("hash mismatch for {}", hash)));
    }
    Ok(data)
}
