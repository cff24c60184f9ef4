//! Keys

use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// A caller-chosen key
///
/// The routing hash is computed once at construction. It is only used to
/// pick a partition; it is not a content address and may collide.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Id {
    value: Vec<u8>,
    routing_hash: u64,
}

impl Id {
    /// Create a key from raw bytes or text
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        let routing_hash = xxh3_64(&value);
        Self {
            value,
            routing_hash,
        }
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Precomputed routing hash
    pub fn routing_hash(&self) -> u64 {
        self.routing_hash
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.value
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::new(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::new(value)
    }
}

impl From<&[u8]> for Id {
    fn from(value: &[u8]) -> Self {
        Id::new(value)
    }
}

impl From<Vec<u8>> for Id {
    fn from(value: Vec<u8>) -> Self {
        Id::new(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.value))
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({:?}, {:016x})", String::from_utf8_lossy(&self.value), self.routing_hash)
    }
}
