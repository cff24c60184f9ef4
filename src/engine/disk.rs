//! Persistent engine on sled
//!
//! Scalars and lists are kept in two trees of one sled database. A list is
//! stored as a single value: a sequence of `[u32 big-endian length][bytes]`
//! entries, head first. Batches run as one transaction across both trees.

use super::{
    glob_match, parse_counter, resolve_index, resolve_range, Batch, EngineError, EngineResult,
    KvEngine, WriteOp,
};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;

type TxResult<T> = Result<T, ConflictableTransactionError<EngineError>>;

/// Engine persisted in a sled database directory
pub struct SledEngine {
    db: Db,
    scalars: Tree,
    lists: Tree,
}

impl SledEngine {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let db = sled::open(path)?;
        let scalars = db.open_tree("scalars")?;
        let lists = db.open_tree("lists")?;
        log::debug!("Opened sled engine with {} list(s)", lists.len());
        Ok(Self { db, scalars, lists })
    }

    fn read_list(&self, key: &[u8]) -> EngineResult<VecDeque<Vec<u8>>> {
        match self.lists.get(key)? {
            Some(raw) => decode_list(key, &raw),
            None => Ok(VecDeque::new()),
        }
    }
}

fn encode_list(list: &VecDeque<Vec<u8>>) -> Vec<u8> {
    let size = list.iter().map(|e| e.len() + 4).sum();
    let mut out = Vec::with_capacity(size);
    for entry in list {
        // Writing into a Vec cannot fail
        let _ = out.write_u32::<BigEndian>(entry.len() as u32);
        out.extend_from_slice(entry);
    }
    out
}

fn decode_list(key: &[u8], raw: &[u8]) -> EngineResult<VecDeque<Vec<u8>>> {
    let corrupt = || EngineError::CorruptList(String::from_utf8_lossy(key).into_owned());
    let mut cursor = Cursor::new(raw);
    let mut list = VecDeque::new();
    while (cursor.position() as usize) < raw.len() {
        let len = cursor.read_u32::<BigEndian>().map_err(|_| corrupt())? as usize;
        let mut entry = vec![0u8; len];
        cursor.read_exact(&mut entry).map_err(|_| corrupt())?;
        list.push_back(entry);
    }
    Ok(list)
}

fn tx_read_list(lists: &TransactionalTree, key: &[u8]) -> TxResult<VecDeque<Vec<u8>>> {
    match lists.get(key)? {
        Some(raw) => decode_list(key, &raw).map_err(ConflictableTransactionError::Abort),
        None => Ok(VecDeque::new()),
    }
}

fn tx_write_list(lists: &TransactionalTree, key: &[u8], list: &VecDeque<Vec<u8>>) -> TxResult<()> {
    if list.is_empty() {
        lists.remove(key)?;
    } else {
        lists.insert(key, encode_list(list))?;
    }
    Ok(())
}

fn tx_counter(scalars: &TransactionalTree, key: &[u8]) -> TxResult<i64> {
    let raw = scalars.get(key)?;
    parse_counter(key, raw.as_deref()).map_err(ConflictableTransactionError::Abort)
}

fn tx_apply_op(scalars: &TransactionalTree, lists: &TransactionalTree, op: &WriteOp) -> TxResult<()> {
    match op {
        WriteOp::Set { key, value } => {
            scalars.insert(key.as_slice(), value.as_slice())?;
        }
        WriteOp::SetIfAbsent { key, value } => {
            if scalars.get(key)?.is_none() {
                scalars.insert(key.as_slice(), value.as_slice())?;
            }
        }
        WriteOp::IncrBy { key, delta } => {
            let current = tx_counter(scalars, key)?;
            scalars.insert(key.as_slice(), (current + delta).to_string().into_bytes())?;
        }
        WriteOp::Release { counter, reap } => {
            let current = tx_counter(scalars, counter)?;
            if current <= 1 {
                scalars.remove(counter.as_slice())?;
                for key in reap {
                    scalars.remove(key.as_slice())?;
                }
            } else {
                scalars.insert(counter.as_slice(), (current - 1).to_string().into_bytes())?;
            }
        }
        WriteOp::ListPush { key, value } => {
            let mut list = tx_read_list(lists, key)?;
            list.push_front(value.clone());
            tx_write_list(lists, key, &list)?;
        }
        WriteOp::ListRemoveAt { key, index } => {
            let mut list = tx_read_list(lists, key)?;
            if let Some(idx) = resolve_index(list.len(), *index) {
                list.remove(idx);
                tx_write_list(lists, key, &list)?;
            }
        }
        WriteOp::ListDel { key } => {
            lists.remove(key.as_slice())?;
        }
    }
    Ok(())
}

impl KvEngine for SledEngine {
    fn kind(&self) -> &'static str {
        "sled"
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.scalars.get(key)?.map(|v| v.to_vec()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.scalars.insert(key, value)?;
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.scalars.contains_key(key)?)
    }

    fn del(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.scalars.remove(key)?.is_some())
    }

    fn list_index(&self, key: &[u8], index: i64) -> EngineResult<Option<Vec<u8>>> {
        let mut list = self.read_list(key)?;
        Ok(resolve_index(list.len(), index).and_then(|i| list.remove(i)))
    }

    fn list_range(&self, key: &[u8], start: i64, stop: i64) -> EngineResult<Vec<Vec<u8>>> {
        let list = self.read_list(key)?;
        Ok(match resolve_range(list.len(), start, stop) {
            Some(range) => list.range(range).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn list_len(&self, key: &[u8]) -> EngineResult<usize> {
        Ok(self.read_list(key)?.len())
    }

    fn list_del(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.lists.remove(key)?.is_some())
    }

    fn list_keys(&self, pattern: &str, cancel: &CancellationToken) -> EngineResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        for key in self.lists.iter().keys() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let key = key?;
            if glob_match(pattern.as_bytes(), &key) {
                keys.push(key.to_vec());
            }
        }
        Ok(keys)
    }

    fn apply(&self, batch: Batch) -> EngineResult<bool> {
        let result = (&self.scalars, &self.lists).transaction(|(scalars, lists)| {
            if let Some(guard) = &batch.guard {
                let list = tx_read_list(lists, guard.key())?;
                if !guard.holds(&list) {
                    return Ok(false);
                }
            }
            for op in &batch.ops {
                tx_apply_op(scalars, lists, op)?;
            }
            Ok(true)
        });

        match result {
            Ok(applied) => Ok(applied),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn flush(&self) -> EngineResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
