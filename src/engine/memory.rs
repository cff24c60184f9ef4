//! In-memory engine
//!
//! Everything sits behind one mutex, so every batch is trivially atomic.
//! Contents are lost on restart.

use super::{
    glob_match, parse_counter, resolve_index, resolve_range, Batch, EngineError, EngineResult,
    KvEngine, WriteOp,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    scalars: HashMap<Vec<u8>, Vec<u8>>,
    lists: HashMap<Vec<u8>, VecDeque<Vec<u8>>>,
}

/// Previous values of everything a batch touched, for rollback
#[derive(Default)]
struct UndoLog {
    scalars: HashMap<Vec<u8>, Option<Vec<u8>>>,
    lists: HashMap<Vec<u8>, Option<VecDeque<Vec<u8>>>>,
}

impl UndoLog {
    fn scalar(&mut self, state: &State, key: &[u8]) {
        if !self.scalars.contains_key(key) {
            self.scalars
                .insert(key.to_vec(), state.scalars.get(key).cloned());
        }
    }

    fn list(&mut self, state: &State, key: &[u8]) {
        if !self.lists.contains_key(key) {
            self.lists.insert(key.to_vec(), state.lists.get(key).cloned());
        }
    }

    fn restore(self, state: &mut State) {
        for (key, value) in self.scalars {
            match value {
                Some(v) => state.scalars.insert(key, v),
                None => state.scalars.remove(&key),
            };
        }
        for (key, value) in self.lists {
            match value {
                Some(v) => state.lists.insert(key, v),
                None => state.lists.remove(&key),
            };
        }
    }
}

/// Volatile engine backed by hash maps
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_op(state: &mut State, undo: &mut UndoLog, op: WriteOp) -> EngineResult<()> {
        match op {
            WriteOp::Set { key, value } => {
                undo.scalar(state, &key);
                state.scalars.insert(key, value);
            }
            WriteOp::SetIfAbsent { key, value } => {
                if !state.scalars.contains_key(&key) {
                    undo.scalar(state, &key);
                    state.scalars.insert(key, value);
                }
            }
            WriteOp::IncrBy { key, delta } => {
                let current = parse_counter(&key, state.scalars.get(&key).map(Vec::as_slice))?;
                undo.scalar(state, &key);
                state
                    .scalars
                    .insert(key, (current + delta).to_string().into_bytes());
            }
            WriteOp::Release { counter, reap } => {
                let current =
                    parse_counter(&counter, state.scalars.get(&counter).map(Vec::as_slice))?;
                undo.scalar(state, &counter);
                if current <= 1 {
                    state.scalars.remove(&counter);
                    for key in reap {
                        undo.scalar(state, &key);
                        state.scalars.remove(&key);
                    }
                } else {
                    state
                        .scalars
                        .insert(counter, (current - 1).to_string().into_bytes());
                }
            }
            WriteOp::ListPush { key, value } => {
                undo.list(state, &key);
                state.lists.entry(key).or_default().push_front(value);
            }
            WriteOp::ListRemoveAt { key, index } => {
                undo.list(state, &key);
                if let Some(list) = state.lists.get_mut(&key) {
                    if let Some(idx) = resolve_index(list.len(), index) {
                        list.remove(idx);
                    }
                    if list.is_empty() {
                        state.lists.remove(&key);
                    }
                }
            }
            WriteOp::ListDel { key } => {
                undo.list(state, &key);
                state.lists.remove(&key);
            }
        }
        Ok(())
    }
}

impl KvEngine for MemoryEngine {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.state().scalars.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        self.state().scalars.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.state().scalars.contains_key(key))
    }

    fn del(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.state().scalars.remove(key).is_some())
    }

    fn list_index(&self, key: &[u8], index: i64) -> EngineResult<Option<Vec<u8>>> {
        let state = self.state();
        Ok(state
            .lists
            .get(key)
            .and_then(|list| resolve_index(list.len(), index).map(|i| list[i].clone())))
    }

    fn list_range(&self, key: &[u8], start: i64, stop: i64) -> EngineResult<Vec<Vec<u8>>> {
        let state = self.state();
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some(range) => list.range(range).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn list_len(&self, key: &[u8]) -> EngineResult<usize> {
        Ok(self.state().lists.get(key).map_or(0, VecDeque::len))
    }

    fn list_del(&self, key: &[u8]) -> EngineResult<bool> {
        Ok(self.state().lists.remove(key).is_some())
    }

    fn list_keys(&self, pattern: &str, cancel: &CancellationToken) -> EngineResult<Vec<Vec<u8>>> {
        let state = self.state();
        let mut keys = Vec::new();
        for key in state.lists.keys() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if glob_match(pattern.as_bytes(), key) {
                keys.push(key.clone());
            }
        }
        Ok(keys)
    }

    fn apply(&self, batch: Batch) -> EngineResult<bool> {
        let mut state = self.state();

        if let Some(guard) = &batch.guard {
            let empty = VecDeque::new();
            let list = state.lists.get(guard.key()).unwrap_or(&empty);
            if !guard.holds(list) {
                return Ok(false);
            }
        }

        let mut undo = UndoLog::default();
        for op in batch.ops {
            if let Err(e) = Self::apply_op(&mut state, &mut undo, op) {
                undo.restore(&mut state);
                return Err(e);
            }
        }
        Ok(true)
    }

    fn flush(&self) -> EngineResult<()> {
        Ok(())
    }
}
