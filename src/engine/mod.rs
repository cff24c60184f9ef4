//! Raw storage engines
//!
//! A partition's blob store is built on a small key-value primitive with
//! Redis-like semantics: scalar values, ordered lists with prepend and
//! indexed reads, and atomic write batches. Scalars and lists live in
//! separate keyspaces.

mod disk;
mod memory;
mod pattern;

pub use disk::SledEngine;
pub use memory::MemoryEngine;
pub use pattern::glob_match;

use std::collections::VecDeque;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("corrupt list value for key {0}")]
    CorruptList(String),

    #[error("counter {key} holds a non-integer value")]
    NotACounter { key: String },

    #[error("scan cancelled")]
    Cancelled,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// A single write inside a [`Batch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Unconditional scalar write
    Set { key: Vec<u8>, value: Vec<u8> },
    /// Scalar write that leaves an existing value untouched
    SetIfAbsent { key: Vec<u8>, value: Vec<u8> },
    /// Add `delta` to a decimal counter, treating a missing key as 0
    IncrBy { key: Vec<u8>, delta: i64 },
    /// Decrement `counter`; once it reaches zero, delete it and every `reap` key
    Release { counter: Vec<u8>, reap: Vec<Vec<u8>> },
    /// Prepend to a list, creating it if needed
    ListPush { key: Vec<u8>, value: Vec<u8> },
    /// Remove the element at `index` (negative counts from the tail)
    ListRemoveAt { key: Vec<u8>, index: i64 },
    /// Delete a whole list
    ListDel { key: Vec<u8> },
}

/// Precondition on a list, checked atomically with the batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListGuard {
    /// Head element (`None` for an empty or missing list) and length.
    ///
    /// Only sound for batches whose writes do not depend on the list body.
    Head {
        key: Vec<u8>,
        head: Option<Vec<u8>>,
        len: usize,
    },
    /// Every element, head first
    Exact { key: Vec<u8>, items: Vec<Vec<u8>> },
}

impl ListGuard {
    pub fn key(&self) -> &[u8] {
        match self {
            ListGuard::Head { key, .. } | ListGuard::Exact { key, .. } => key,
        }
    }

    /// Whether `list` (empty when missing) still satisfies the guard
    pub(crate) fn holds(&self, list: &VecDeque<Vec<u8>>) -> bool {
        match self {
            ListGuard::Head { head, len, .. } => list.front() == head.as_ref() && list.len() == *len,
            ListGuard::Exact { items, .. } => list.len() == items.len() && list.iter().eq(items),
        }
    }
}

/// Writes applied as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub guard: Option<ListGuard>,
    pub ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only apply the batch if the list still looks like `guard`
    pub fn guarded(guard: ListGuard) -> Self {
        Self {
            guard: Some(guard),
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }
}

/// Key-value primitive backing one partition
pub trait KvEngine: Send + Sync {
    /// Short backend name reported by `MANAGE PARTITIONS`
    fn kind(&self) -> &'static str;

    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()>;

    fn exists(&self, key: &[u8]) -> EngineResult<bool>;

    /// Delete a scalar. Returns true if it existed.
    fn del(&self, key: &[u8]) -> EngineResult<bool>;

    /// Read one list element; negative indices count from the tail
    fn list_index(&self, key: &[u8], index: i64) -> EngineResult<Option<Vec<u8>>>;

    /// Read an inclusive range of list elements (`LRANGE` semantics)
    fn list_range(&self, key: &[u8], start: i64, stop: i64) -> EngineResult<Vec<Vec<u8>>>;

    fn list_len(&self, key: &[u8]) -> EngineResult<usize>;

    /// Delete a whole list. Returns true if it existed.
    fn list_del(&self, key: &[u8]) -> EngineResult<bool>;

    /// Names of all lists matching a glob pattern.
    ///
    /// Stops with [`EngineError::Cancelled`] once `cancel` fires.
    fn list_keys(&self, pattern: &str, cancel: &CancellationToken)
        -> EngineResult<Vec<Vec<u8>>>;

    /// Apply a batch atomically.
    ///
    /// Returns false, without writing anything, when the batch's guard does
    /// not match the current state of its list.
    fn apply(&self, batch: Batch) -> EngineResult<bool>;

    /// Flush pending writes to stable storage
    fn flush(&self) -> EngineResult<()>;
}

/// Resolve a possibly negative index against a list length
pub(crate) fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { len + index } else { index };
    if idx < 0 || idx >= len {
        None
    } else {
        Some(idx as usize)
    }
}

/// Resolve an inclusive `LRANGE` pair into a half-open range
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<std::ops::Range<usize>> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some(start as usize..(stop + 1) as usize)
}

/// Parse a stored counter value
pub(crate) fn parse_counter(key: &[u8], raw: Option<&[u8]>) -> EngineResult<i64> {
    match raw {
        None => Ok(0),
        Some(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| EngineError::NotACounter {
                key: String::from_utf8_lossy(key).into_owned(),
            }),
    }
}
