//! Command dispatch
//!
//! Turns decoded requests into store calls on the owning partition and
//! formats the replies. Blob stores are synchronous, so every store call runs
//! on the blocking pool. KEYS is the only command touching several
//! partitions: it scans each target concurrently, bounded by a per-partition
//! timeout, and merges whatever answered.

mod command;

pub use command::{Command, ManageCommand};

use crate::model::{Id, VersionId};
use crate::protocol::Reply;
use crate::router::{Partition, PartitionId, PartitionRegistry, RouterError};
use crate::store::{BlobStore, StoreError, StoreResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Default bound on a single partition's KEYS scan
pub const DEFAULT_FANOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("wrong number of arguments for '{command}' command")]
    Arity { command: String },

    #[error("partition {0} not found")]
    PartitionNotFound(PartitionId),

    #[error("{0}")]
    Parse(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("version {version} not found for key {key}")]
    VersionNotFound { key: String, version: VersionId },

    #[error("partition {partition}: {message}")]
    Backend {
        partition: PartitionId,
        message: String,
    },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

impl CommandError {
    /// Classify a store failure on `partition`
    fn from_store(partition: PartitionId, err: StoreError) -> Self {
        match err {
            StoreError::KeyNotFound(key) => CommandError::KeyNotFound(key),
            StoreError::VersionNotFound { key, version } => {
                CommandError::VersionNotFound { key, version }
            }
            other => {
                log::error!("Partition {} backend failure: {}", partition, other);
                CommandError::Backend {
                    partition,
                    message: other.to_string(),
                }
            }
        }
    }
}

impl From<RouterError> for CommandError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::PartitionNotFound(id) => CommandError::PartitionNotFound(id),
            RouterError::AlreadyRegistered(id) => CommandError::Backend {
                partition: id,
                message: err.to_string(),
            },
        }
    }
}

/// Executes commands against the routing table
pub struct Dispatcher {
    registry: Arc<PartitionRegistry>,
    fanout_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<PartitionRegistry>, fanout_timeout: Duration) -> Self {
        Self {
            registry,
            fanout_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// Decode and execute one request
    pub async fn handle(&self, request: &[Vec<u8>]) -> Reply {
        match Command::parse(request) {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                log::warn!("Rejected request: {}", e);
                Reply::err(e)
            }
        }
    }

    /// Execute a decoded command; failures become error replies
    pub async fn execute(&self, command: Command) -> Reply {
        let name = command.name();
        log::debug!("Executing {}", name);
        match self.run(command).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("{} failed: {}", name, e);
                Reply::err(e)
            }
        }
    }

    async fn run(&self, command: Command) -> Result<Reply, CommandError> {
        match command {
            Command::Keys {
                pattern,
                partitions,
            } => self.keys(pattern, partitions).await,
            Command::Set { key, value } => {
                let added = self
                    .on_partition(key, move |store, key| store.add(key, &value))
                    .await?;
                if !added {
                    log::debug!("SET unchanged content, no new version");
                }
                Ok(Reply::ok())
            }
            Command::Get { key } => self
                .on_partition(key, |store, key| store.get(key))
                .await
                .map(Reply::Bulk),
            Command::GetV { key, version } => self
                .on_partition(key, move |store, key| store.get_version(key, version))
                .await
                .map(Reply::Bulk),
            Command::Delete { key, version } => {
                self.on_partition(key, move |store, key| match version {
                    Some(version) => store.delete_version(key, version),
                    None => store.delete(key),
                })
                .await?;
                Ok(Reply::ok())
            }
            Command::Versions { key } => {
                let versions = self
                    .on_partition(key, |store, key| store.versions(key))
                    .await?;
                Ok(Reply::Array(
                    versions
                        .iter()
                        .map(|v| v.to_string().into_bytes())
                        .collect(),
                ))
            }
            Command::Manage(manage) => self.manage(manage),
        }
    }

    /// Run a store operation on the partition owning `key`
    async fn on_partition<T, F>(&self, key: Id, op: F) -> Result<T, CommandError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BlobStore, &Id) -> StoreResult<T> + Send + 'static,
    {
        let Partition { id, store } = self.registry.route(&key)?;
        let result = tokio::task::spawn_blocking(move || op(store.as_ref(), &key))
            .await
            .map_err(|e| CommandError::Backend {
                partition: id,
                message: format!("store task failed: {}", e),
            })?;
        result.map_err(|e| CommandError::from_store(id, e))
    }

    /// Scan the target partitions concurrently and merge their keys
    async fn keys(
        &self,
        pattern: String,
        partitions: Option<Vec<PartitionId>>,
    ) -> Result<Reply, CommandError> {
        let table = self.registry.snapshot();
        let targets: Vec<Partition> = match partitions {
            Some(ids) => ids
                .into_iter()
                .map(|id| {
                    table
                        .get(&id)
                        .cloned()
                        .ok_or(CommandError::PartitionNotFound(id))
                })
                .collect::<Result<_, _>>()?,
            None => table.values().cloned().collect(),
        };

        let limit = self.fanout_timeout;
        let mut scans = JoinSet::new();
        for Partition { id, store } in targets {
            let pattern = pattern.clone();
            scans.spawn(async move {
                let cancel = CancellationToken::new();
                let token = cancel.clone();
                let scan = tokio::task::spawn_blocking(move || store.keys(&pattern, &token));
                let outcome = tokio::time::timeout(limit, scan).await;
                if outcome.is_err() {
                    // Stop the abandoned scan instead of letting it hold a blocking thread
                    cancel.cancel();
                }
                (id, outcome)
            });
        }

        let mut keys = Vec::new();
        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok((_, Ok(Ok(Ok(found))))) => keys.extend(found.into_iter().map(Id::into_bytes)),
                Ok((id, Ok(Ok(Err(e))))) => {
                    log::warn!("KEYS: partition {} failed: {}", id, e);
                }
                Ok((id, Ok(Err(e)))) => {
                    log::warn!("KEYS: partition {} scan task failed: {}", id, e);
                }
                Ok((id, Err(_))) => {
                    log::warn!("KEYS: partition {} timed out after {:?}", id, limit);
                }
                Err(e) => log::warn!("KEYS: fan-out task failed: {}", e),
            }
        }

        log::debug!("KEYS {} matched {} key(s)", pattern, keys.len());
        Ok(Reply::Array(keys))
    }

    fn manage(&self, command: ManageCommand) -> Result<Reply, CommandError> {
        match command {
            ManageCommand::Remove(ids) => {
                let removed = self.registry.remove(&ids)?;
                Ok(Reply::Array(
                    removed
                        .iter()
                        .map(|p| format!("removed partition {}", p.id).into_bytes())
                        .collect(),
                ))
            }
            ManageCommand::Partitions => Ok(Reply::Array(
                self.registry
                    .list()
                    .into_iter()
                    .map(|(id, backend)| format!("{} | {}", id, backend).into_bytes())
                    .collect(),
            )),
            ManageCommand::Purge => Ok(Reply::ok()),
            ManageCommand::Rebalance(from) => {
                self.registry.get(from)?;
                log::info!("REBALANCE from partition {} requested, nothing to do", from);
                Ok(Reply::ok())
            }
        }
    }
}
