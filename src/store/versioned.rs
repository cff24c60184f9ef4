//! Versioned store on a key-value engine
//!
//! Each user key owns one engine list of version entries, newest first. An
//! entry is a small JSON document naming the content hash and the time the
//! version was written; the content itself lives in the reference-counted
//! pool (see `pool`).
//!
//! Writes read the list, then submit one batch guarded by what they read:
//! adds by the head and length, deletes by the exact list contents. If
//! another writer got in between, the guard fails and the operation is
//! retried against the fresh state. Concurrent writers to
//! the same key are therefore exactly as safe as the engine's batch
//! atomicity; the store holds no locks of its own.

use super::pool;
use super::{BlobStore, StoreError, StoreResult};
use crate::engine::{resolve_index, Batch, KvEngine, ListGuard, WriteOp};
use crate::model::{ContentHash, Id, Version, VersionId};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Attempts before a contended write gives up
const MAX_ATTEMPTS: usize = 64;

/// Version list element as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionEntry {
    /// Content hash as hex string
    hash: String,
    /// Write time in Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    at: Option<i64>,
}

impl VersionEntry {
    fn new(hash: &ContentHash, at: DateTime<Utc>) -> Self {
        Self {
            hash: hash.to_hex(),
            at: Some(at.timestamp_millis()),
        }
    }

    fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(id: &Id, raw: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| StoreError::Corrupted(format!("version entry of {}: {}", id, e)))
    }

    fn content_hash(&self, id: &Id) -> StoreResult<ContentHash> {
        ContentHash::from_hex(&self.hash)
            .map_err(|e| StoreError::Corrupted(format!("version entry of {}: {}", id, e)))
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.at
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Blob store for one partition
pub struct VersionedStore<E: KvEngine> {
    partition: u32,
    engine: E,
}

impl<E: KvEngine> VersionedStore<E> {
    /// Create a store for `partition` on top of `engine`
    pub fn new(partition: u32, engine: E) -> Self {
        Self { partition, engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Fetch content from the pool
    fn read_content(&self, hash: &ContentHash) -> StoreResult<Vec<u8>> {
        let stored = self
            .engine
            .get(&pool::blob_key(hash))?
            .ok_or(StoreError::MissingContent(*hash))?;
        pool::decode(hash, &stored)
    }

    /// All entries of a key's history, raw and decoded
    fn entries(&self, id: &Id) -> StoreResult<Vec<(Vec<u8>, VersionEntry)>> {
        self.engine
            .list_range(id.as_bytes(), 0, -1)?
            .into_iter()
            .map(|raw| {
                let entry = VersionEntry::decode(id, &raw)?;
                Ok((raw, entry))
            })
            .collect()
    }

    fn release(batch: &mut Batch, hash: &ContentHash) {
        batch.push(WriteOp::Release {
            counter: pool::refs_key(hash),
            reap: vec![pool::blob_key(hash)],
        });
    }
}

impl<E: KvEngine> BlobStore for VersionedStore<E> {
    fn kind(&self) -> &'static str {
        self.engine.kind()
    }

    fn keys(&self, pattern: &str, cancel: &CancellationToken) -> StoreResult<Vec<Id>> {
        let keys = self.engine.list_keys(pattern, cancel)?;
        log::debug!(
            "KEYS {} matched {} key(s) in partition {}",
            pattern,
            keys.len(),
            self.partition
        );
        Ok(keys.into_iter().map(Id::new).collect())
    }

    fn add(&self, id: &Id, content: &[u8]) -> StoreResult<bool> {
        let hash = self.hash(content);
        let stored = pool::encode(content);
        let key = id.as_bytes();

        for attempt in 0..MAX_ATTEMPTS {
            let head = self.engine.list_index(key, 0)?;
            let len = self.engine.list_len(key)?;

            if let Some(raw) = &head {
                let current = VersionEntry::decode(id, raw)?;
                if current.content_hash(id)? == hash {
                    log::debug!("ADD {} unchanged ({}), partition {}", id, hash, self.partition);
                    return Ok(false);
                }
            }

            let entry = VersionEntry::new(&hash, Utc::now());
            let mut batch = Batch::guarded(ListGuard::Head {
                key: key.to_vec(),
                head,
                len,
            });
            batch
                .push(WriteOp::SetIfAbsent {
                    key: pool::blob_key(&hash),
                    value: stored.clone(),
                })
                .push(WriteOp::IncrBy {
                    key: pool::refs_key(&hash),
                    delta: 1,
                })
                .push(WriteOp::ListPush {
                    key: key.to_vec(),
                    value: entry.encode()?,
                });

            if self.engine.apply(batch)? {
                log::debug!(
                    "ADD {} -> {} ({} bytes), partition {}",
                    id,
                    hash,
                    content.len(),
                    self.partition
                );
                return Ok(true);
            }
            log::debug!("ADD {} lost a race (attempt {}), retrying", id, attempt + 1);
        }

        Err(StoreError::Conflict(id.to_string()))
    }

    fn get(&self, id: &Id) -> StoreResult<Vec<u8>> {
        let raw = self
            .engine
            .list_index(id.as_bytes(), 0)?
            .ok_or_else(|| StoreError::KeyNotFound(id.to_string()))?;
        let entry = VersionEntry::decode(id, &raw)?;
        self.read_content(&entry.content_hash(id)?)
    }

    fn get_version(&self, id: &Id, version: VersionId) -> StoreResult<Vec<u8>> {
        let key = id.as_bytes();
        let Some(raw) = self.engine.list_index(key, version.list_index())? else {
            if self.engine.list_len(key)? == 0 {
                return Err(StoreError::KeyNotFound(id.to_string()));
            }
            return Err(StoreError::VersionNotFound {
                key: id.to_string(),
                version,
            });
        };
        let entry = VersionEntry::decode(id, &raw)?;
        self.read_content(&entry.content_hash(id)?)
    }

    fn versions(&self, id: &Id) -> StoreResult<Vec<Version>> {
        self.entries(id)?
            .into_iter()
            .enumerate()
            .map(|(i, (_, entry))| {
                Ok(Version {
                    number: i as u32 + 1,
                    hash: entry.content_hash(id)?,
                    created_at: entry.created_at(),
                    latest: i == 0,
                })
            })
            .collect()
    }

    fn delete(&self, id: &Id) -> StoreResult<()> {
        let key = id.as_bytes();

        for attempt in 0..MAX_ATTEMPTS {
            let entries = self.entries(id)?;
            if entries.is_empty() {
                return Err(StoreError::KeyNotFound(id.to_string()));
            }

            // Releases depend on every entry, so the whole list must be unchanged
            let mut batch = Batch::guarded(ListGuard::Exact {
                key: key.to_vec(),
                items: entries.iter().map(|(raw, _)| raw.clone()).collect(),
            });
            batch.push(WriteOp::ListDel { key: key.to_vec() });
            for (_, entry) in &entries {
                Self::release(&mut batch, &entry.content_hash(id)?);
            }

            if self.engine.apply(batch)? {
                log::debug!(
                    "DELETE {} ({} version(s)), partition {}",
                    id,
                    entries.len(),
                    self.partition
                );
                return Ok(());
            }
            log::debug!("DELETE {} lost a race (attempt {}), retrying", id, attempt + 1);
        }

        Err(StoreError::Conflict(id.to_string()))
    }

    fn delete_version(&self, id: &Id, version: VersionId) -> StoreResult<()> {
        let key = id.as_bytes();

        for attempt in 0..MAX_ATTEMPTS {
            let entries = self.entries(id)?;
            if entries.is_empty() {
                return Err(StoreError::KeyNotFound(id.to_string()));
            }
            let idx = resolve_index(entries.len(), version.list_index()).ok_or_else(|| {
                StoreError::VersionNotFound {
                    key: id.to_string(),
                    version,
                }
            })?;

            // Releases depend on every entry, so the whole list must be unchanged
            let mut batch = Batch::guarded(ListGuard::Exact {
                key: key.to_vec(),
                items: entries.iter().map(|(raw, _)| raw.clone()).collect(),
            });
            batch.push(WriteOp::ListRemoveAt {
                key: key.to_vec(),
                index: idx as i64,
            });
            Self::release(&mut batch, &entries[idx].1.content_hash(id)?);

            if self.engine.apply(batch)? {
                log::debug!(
                    "DELETE {} version {}, partition {}",
                    id,
                    version,
                    self.partition
                );
                return Ok(());
            }
            log::debug!("DELETE {} {} lost a race (attempt {}), retrying", id, version, attempt + 1);
        }

        Err(StoreError::Conflict(id.to_string()))
    }

    fn flush(&self) -> StoreResult<()> {
        Ok(self.engine.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineResult, MemoryEngine, SledEngine};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;

    fn store() -> VersionedStore<MemoryEngine> {
        VersionedStore::new(0, MemoryEngine::new())
    }

    fn refs(store: &VersionedStore<MemoryEngine>, content: &[u8]) -> Option<Vec<u8>> {
        store
            .engine()
            .get(&pool::refs_key(&ContentHash::of(content)))
            .unwrap()
    }

    fn has_blob(store: &VersionedStore<MemoryEngine>, content: &[u8]) -> bool {
        store
            .engine()
            .exists(&pool::blob_key(&ContentHash::of(content)))
            .unwrap()
    }

    #[test]
    fn test_add_same_content_twice_is_noop() {
        let store = store();
        let id = Id::from("a");

        assert!(store.add(&id, b"hello").unwrap());
        assert!(!store.add(&id, b"hello").unwrap());

        assert_eq!(store.versions(&id).unwrap().len(), 1);
        assert_eq!(refs(&store, b"hello"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_history_is_newest_first() {
        let store = store();
        let id = Id::from("a");
        store.add(&id, b"hello").unwrap();
        store.add(&id, b"world").unwrap();

        let versions = store.versions(&id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].hash, ContentHash::of(b"world"));
        assert!(versions[0].latest);
        assert_eq!(versions[0].number, 1);
        assert!(!versions[1].latest);
        assert_eq!(versions[1].number, 2);
        assert!(versions[0].created_at.is_some());

        assert_eq!(store.get(&id).unwrap(), b"world");
        assert_eq!(store.get_version(&id, VersionId::Latest).unwrap(), b"world");
        assert_eq!(store.get_version(&id, VersionId::Oldest).unwrap(), b"hello");
        assert_eq!(store.get_version(&id, VersionId::Position(1)).unwrap(), b"hello");
    }

    #[test]
    fn test_dedup_is_scoped_to_the_key_head() {
        let store = store();
        let a = Id::from("a");
        let b = Id::from("b");

        store.add(&a, b"shared").unwrap();
        // Same content under another key still records a version
        assert!(store.add(&b, b"shared").unwrap());
        assert_eq!(store.versions(&b).unwrap().len(), 1);

        // Returning to older content of the same key is a new version too
        store.add(&a, b"other").unwrap();
        assert!(store.add(&a, b"shared").unwrap());
        assert_eq!(store.versions(&a).unwrap().len(), 3);

        // One physical copy, three references
        assert_eq!(refs(&store, b"shared"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_get_missing_key() {
        let store = store();
        let id = Id::from("nope");
        assert!(matches!(store.get(&id), Err(StoreError::KeyNotFound(_))));
        assert!(matches!(
            store.get_version(&id, VersionId::Oldest),
            Err(StoreError::KeyNotFound(_))
        ));
        assert!(store.versions(&id).unwrap().is_empty());
    }

    #[test]
    fn test_get_version_out_of_range() {
        let store = store();
        let id = Id::from("a");
        store.add(&id, b"only").unwrap();

        let result = store.get_version(&id, VersionId::Position(1));
        assert!(matches!(result, Err(StoreError::VersionNotFound { .. })));
    }

    #[test]
    fn test_delete_removes_history_and_content() {
        let store = store();
        let id = Id::from("a");
        store.add(&id, b"hello").unwrap();
        store.delete(&id).unwrap();

        assert!(matches!(store.get(&id), Err(StoreError::KeyNotFound(_))));
        assert!(!has_blob(&store, b"hello"));
        assert_eq!(refs(&store, b"hello"), None);
        assert!(matches!(store.delete(&id), Err(StoreError::KeyNotFound(_))));
    }

    #[test]
    fn test_delete_keeps_content_shared_with_other_keys() {
        let store = store();
        let a = Id::from("a");
        let b = Id::from("b");
        store.add(&a, b"shared").unwrap();
        store.add(&b, b"shared").unwrap();

        store.delete(&a).unwrap();
        assert!(has_blob(&store, b"shared"));
        assert_eq!(store.get(&b).unwrap(), b"shared");

        store.delete(&b).unwrap();
        assert!(!has_blob(&store, b"shared"));
    }

    #[test]
    fn test_delete_version() {
        let store = store();
        let id = Id::from("a");
        store.add(&id, b"v1").unwrap();
        store.add(&id, b"v2").unwrap();
        store.add(&id, b"v3").unwrap();

        store.delete_version(&id, VersionId::Position(1)).unwrap();
        let versions = store.versions(&id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(store.get_version(&id, VersionId::Latest).unwrap(), b"v3");
        assert_eq!(store.get_version(&id, VersionId::Oldest).unwrap(), b"v1");
        assert!(!has_blob(&store, b"v2"));

        store.delete_version(&id, VersionId::Oldest).unwrap();
        assert_eq!(store.versions(&id).unwrap().len(), 1);

        assert!(matches!(
            store.delete_version(&id, VersionId::Position(5)),
            Err(StoreError::VersionNotFound { .. })
        ));

        store.delete_version(&id, VersionId::Latest).unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::KeyNotFound(_))));
        assert!(matches!(
            store.delete_version(&id, VersionId::Latest),
            Err(StoreError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_delete_version_keeps_content_referenced_elsewhere() {
        let store = store();
        let id = Id::from("a");
        store.add(&id, b"x").unwrap();
        store.add(&id, b"y").unwrap();
        store.add(&id, b"x").unwrap();

        store.delete_version(&id, VersionId::Oldest).unwrap();
        assert!(has_blob(&store, b"x"));
        assert_eq!(store.get(&id).unwrap(), b"x");
    }

    #[test]
    fn test_keys_lists_only_user_keys() {
        let store = store();
        store.add(&Id::from("user:1"), b"a").unwrap();
        store.add(&Id::from("user:2"), b"b").unwrap();
        store.add(&Id::from("order:1"), b"c").unwrap();

        let mut keys: Vec<String> = store
            .keys("*", &CancellationToken::new())
            .unwrap()
            .iter()
            .map(|id| id.to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["order:1", "user:1", "user:2"]);
        assert_eq!(store.keys("user:*", &CancellationToken::new()).unwrap().len(), 2);
    }

    #[test]
    fn test_binary_content_round_trips() {
        let store = store();
        let id = Id::new(vec![0u8, 159, 146, 150]);
        let content: Vec<u8> = (0..=255).collect();
        store.add(&id, &content).unwrap();
        assert_eq!(store.get(&id).unwrap(), content);
    }

    #[test]
    fn test_concurrent_adds_to_same_key() {
        let store = Arc::new(store());
        let id = Id::from("contended");

        let handles: Vec<_> = (0..4)
            .map(|writer| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    let mut accepted = 0usize;
                    for i in 0..25 {
                        let content = format!("writer {} write {}", writer, i);
                        if let Ok(true) = store.add(&id, content.as_bytes()) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let versions = store.versions(&id).unwrap();
        assert_eq!(versions.len(), accepted);
        for pair in versions.windows(2) {
            assert_ne!(pair[0].hash, pair[1].hash);
        }
    }

    /// Engine that lets another client run just before its next batch lands
    struct Racing {
        inner: Arc<MemoryEngine>,
        before_apply: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    }

    impl Racing {
        fn new(inner: Arc<MemoryEngine>) -> Self {
            Self {
                inner,
                before_apply: Mutex::new(None),
            }
        }
    }

    impl KvEngine for Racing {
        fn kind(&self) -> &'static str {
            self.inner.kind()
        }
        fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
        fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
            self.inner.set(key, value)
        }
        fn exists(&self, key: &[u8]) -> EngineResult<bool> {
            self.inner.exists(key)
        }
        fn del(&self, key: &[u8]) -> EngineResult<bool> {
            self.inner.del(key)
        }
        fn list_index(&self, key: &[u8], index: i64) -> EngineResult<Option<Vec<u8>>> {
            self.inner.list_index(key, index)
        }
        fn list_range(&self, key: &[u8], start: i64, stop: i64) -> EngineResult<Vec<Vec<u8>>> {
            self.inner.list_range(key, start, stop)
        }
        fn list_len(&self, key: &[u8]) -> EngineResult<usize> {
            self.inner.list_len(key)
        }
        fn list_del(&self, key: &[u8]) -> EngineResult<bool> {
            self.inner.list_del(key)
        }
        fn list_keys(
            &self,
            pattern: &str,
            cancel: &CancellationToken,
        ) -> EngineResult<Vec<Vec<u8>>> {
            self.inner.list_keys(pattern, cancel)
        }
        fn apply(&self, batch: Batch) -> EngineResult<bool> {
            let hook = self.before_apply.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            self.inner.apply(batch)
        }
        fn flush(&self) -> EngineResult<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn test_delete_detects_rewritten_history() {
        let shared = Arc::new(MemoryEngine::new());
        let store = VersionedStore::new(0, Racing::new(Arc::clone(&shared)));
        let other = Arc::new(VersionedStore::new(0, Racing::new(Arc::clone(&shared))));
        let k = Id::from("k");

        for content in [b"O", b"M", b"X"] {
            store.add(&k, content).unwrap();
        }
        other.add(&Id::from("other"), b"M").unwrap();
        let x_entry = shared.list_index(b"k", 0).unwrap().unwrap();

        // Between the delete's read and its batch, another client turns
        // k = [X, M, O] into [X, Y, O]: same head bytes, same length.
        let racer = Arc::clone(&other);
        *store.engine().before_apply.lock().unwrap() = Some(Box::new(move || {
            let k = Id::from("k");
            racer.delete_version(&k, VersionId::Latest).unwrap();
            racer.delete_version(&k, VersionId::Latest).unwrap();
            racer.add(&k, b"Y").unwrap();

            let x = ContentHash::of(b"X");
            let mut batch = Batch::new();
            batch
                .push(WriteOp::SetIfAbsent {
                    key: pool::blob_key(&x),
                    value: pool::encode(b"X"),
                })
                .push(WriteOp::IncrBy {
                    key: pool::refs_key(&x),
                    delta: 1,
                })
                .push(WriteOp::ListPush {
                    key: b"k".to_vec(),
                    value: x_entry,
                });
            assert!(racer.engine().apply(batch).unwrap());
        }));

        store.delete(&k).unwrap();

        assert_eq!(other.get(&Id::from("other")).unwrap(), b"M");
        let m = ContentHash::of(b"M");
        assert_eq!(shared.get(&pool::refs_key(&m)).unwrap(), Some(b"1".to_vec()));
        for content in [b"O", b"X", b"Y"] {
            let hash = ContentHash::of(content);
            assert_eq!(shared.get(&pool::refs_key(&hash)).unwrap(), None);
            assert!(!shared.exists(&pool::blob_key(&hash)).unwrap());
        }
        assert_eq!(shared.list_len(b"k").unwrap(), 0);
    }

    #[test]
    fn test_delete_version_detects_rewritten_history() {
        let shared = Arc::new(MemoryEngine::new());
        let store = VersionedStore::new(0, Racing::new(Arc::clone(&shared)));
        let other = Arc::new(VersionedStore::new(0, Racing::new(Arc::clone(&shared))));
        let k = Id::from("k");

        for content in [b"O", b"M", b"X"] {
            store.add(&k, content).unwrap();
        }
        other.add(&Id::from("other"), b"M").unwrap();
        let x_entry = shared.list_index(b"k", 0).unwrap().unwrap();

        // Version 2 is M when the delete reads the list, Y when it writes
        let racer = Arc::clone(&other);
        *store.engine().before_apply.lock().unwrap() = Some(Box::new(move || {
            let k = Id::from("k");
            racer.delete_version(&k, VersionId::Latest).unwrap();
            racer.delete_version(&k, VersionId::Latest).unwrap();
            racer.add(&k, b"Y").unwrap();

            let x = ContentHash::of(b"X");
            let mut batch = Batch::new();
            batch
                .push(WriteOp::IncrBy {
                    key: pool::refs_key(&x),
                    delta: 1,
                })
                .push(WriteOp::SetIfAbsent {
                    key: pool::blob_key(&x),
                    value: pool::encode(b"X"),
                })
                .push(WriteOp::ListPush {
                    key: b"k".to_vec(),
                    value: x_entry,
                });
            assert!(racer.engine().apply(batch).unwrap());
        }));

        store.delete_version(&k, VersionId::Position(1)).unwrap();

        assert_eq!(other.get(&Id::from("other")).unwrap(), b"M");
        assert_eq!(store.get_version(&k, VersionId::Latest).unwrap(), b"X");
        assert_eq!(store.get_version(&k, VersionId::Oldest).unwrap(), b"O");
        assert_eq!(store.versions(&k).unwrap().len(), 2);
        let y = ContentHash::of(b"Y");
        assert_eq!(shared.get(&pool::refs_key(&y)).unwrap(), None);
        assert!(!shared.exists(&pool::blob_key(&y)).unwrap());
    }

    #[test]
    fn test_entry_encoding() {
        let hash = ContentHash::of(b"x");
        let entry = VersionEntry {
            hash: hash.to_hex(),
            at: None,
        };
        let raw = entry.encode().unwrap();
        assert_eq!(raw, format!(r#"{{"hash":"{}"}}"#, hash).into_bytes());

        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let decoded =
            VersionEntry::decode(&Id::from("a"), &VersionEntry::new(&hash, at).encode().unwrap())
                .unwrap();
        assert_eq!(decoded.created_at(), Some(at));
        assert_eq!(decoded.content_hash(&Id::from("a")).unwrap(), hash);
    }

    #[test]
    fn test_sled_backed_store() {
        let temp = TempDir::new().unwrap();
        let store = VersionedStore::new(1, SledEngine::open(temp.path()).unwrap());
        let id = Id::from("a");

        store.add(&id, b"hello").unwrap();
        store.add(&id, b"world").unwrap();
        assert!(!store.add(&id, b"world").unwrap());
        store.flush().unwrap();

        assert_eq!(store.kind(), "sled");
        assert_eq!(store.get_version(&id, VersionId::Oldest).unwrap(), b"hello");
        store.delete(&id).unwrap();
        assert!(store.keys("*", &CancellationToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_entry_without_timestamp_reports_unknown() {
        let store = store();
        let id = Id::from("legacy");
        let hash = ContentHash::of(b"old");

        let mut batch = Batch::new();
        batch
            .push(WriteOp::Set {
                key: pool::blob_key(&hash),
                value: pool::encode(b"old"),
            })
            .push(WriteOp::IncrBy {
                key: pool::refs_key(&hash),
                delta: 1,
            })
            .push(WriteOp::ListPush {
                key: b"legacy".to_vec(),
                value: format!(r#"{{"hash":"{}"}}"#, hash).into_bytes(),
            });
        store.engine().apply(batch).unwrap();

        let versions = store.versions(&id).unwrap();
        assert_eq!(versions[0].created_at, None);
        assert_eq!(store.get(&id).unwrap(), b"old");
    }
}
