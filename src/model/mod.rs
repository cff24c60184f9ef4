//! Identifier and version model
//!
//! Value types shared by every layer: keys, content hashes, version tokens
//! and version records.

mod hash;
mod id;
mod version;

pub use hash::ContentHash;
pub use id::Id;
pub use version::{ParseVersionError, Version, VersionId};
