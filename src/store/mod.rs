//! Versioned blob storage
//!
//! Defines the BlobStore trait each partition exposes to the dispatcher, and
//! its implementation on top of a [`KvEngine`](crate::engine::KvEngine).

mod pool;
mod versioned;

pub use versioned::VersionedStore;

use crate::engine::EngineError;
use crate::model::{ContentHash, Id, Version, VersionId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Blob store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("version {version} not found for key {key}")]
    VersionNotFound { key: String, version: VersionId },

    #[error("content {0} is referenced but missing from the pool")]
    MissingContent(ContentHash),

    #[error("data corruption detected: {0}")]
    Corrupted(String),

    #[error("failed to encode version entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("too many concurrent modifications of key {0}")]
    Conflict(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result type for blob store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Blob store trait - versioned, content-addressed storage for one partition
pub trait BlobStore: Send + Sync {
    /// Backend name of the underlying engine
    fn kind(&self) -> &'static str;

    /// Keys in this partition matching a glob pattern.
    ///
    /// The scan gives up early once `cancel` fires.
    fn keys(&self, pattern: &str, cancel: &CancellationToken) -> StoreResult<Vec<Id>>;

    /// Record `content` as the newest version of `id`.
    ///
    /// Returns false when the content equals the current head, in which case
    /// nothing is written.
    fn add(&self, id: &Id, content: &[u8]) -> StoreResult<bool>;

    /// Content of the newest version
    fn get(&self, id: &Id) -> StoreResult<Vec<u8>>;

    /// Content of a specific version
    fn get_version(&self, id: &Id, version: VersionId) -> StoreResult<Vec<u8>>;

    /// Full history, newest first. Empty for unknown keys.
    fn versions(&self, id: &Id) -> StoreResult<Vec<Version>>;

    /// Remove a key's history, releasing its content
    fn delete(&self, id: &Id) -> StoreResult<()>;

    /// Remove a single version, releasing its content
    fn delete_version(&self, id: &Id, version: VersionId) -> StoreResult<()>;

    /// Content address of `content`
    fn hash(&self, content: &[u8]) -> ContentHash {
        ContentHash::of(content)
    }

    /// Sync any pending writes.
    fn flush(&self) -> StoreResult<()>;
}
