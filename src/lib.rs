//! Partitioned blob store with versioned history and content deduplication
//!
//! Clients write binary values under their own keys over a Redis-style (RESP)
//! protocol. Keys are spread over independent partitions; every distinct
//! write to a key becomes a new version, and identical content is stored once
//! per partition.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod model;
pub mod protocol;
pub mod router;
pub mod server;
pub mod store;

pub use config::Config;
pub use dispatch::{Command, CommandError, Dispatcher};
pub use router::{PartitionRegistry, PartitionStrategy};
pub use store::{BlobStore, StoreError};
