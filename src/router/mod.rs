//! Partition routing
//!
//! Maps keys to partitions and owns the routing table: which blob store
//! serves which partition. The table is replaced wholesale on every change,
//! so readers work on a consistent snapshot without holding the lock.

use crate::model::Id;
use crate::store::BlobStore;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Partition index
pub type PartitionId = u32;

/// Routing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("no blob store registered for partition {0}")]
    PartitionNotFound(PartitionId),

    #[error("partition {0} is already registered")]
    AlreadyRegistered(PartitionId),
}

/// How keys are spread over partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// Every key lives in partition 0
    Single,
    /// Routing hash modulo the partition count
    Multi(u32),
}

impl PartitionStrategy {
    /// Partition owning `id`.
    ///
    /// Pure: the same key and strategy always give the same partition.
    pub fn route(&self, id: &Id) -> PartitionId {
        match self {
            PartitionStrategy::Single => 0,
            // A zero count is rejected by config validation; treat it as single
            PartitionStrategy::Multi(0) => 0,
            PartitionStrategy::Multi(n) => (id.routing_hash() % u64::from(*n)) as PartitionId,
        }
    }
}

/// A registered partition
#[derive(Clone)]
pub struct Partition {
    pub id: PartitionId,
    pub store: Arc<dyn BlobStore>,
}

impl Partition {
    /// Backend name of the partition's engine
    pub fn backend(&self) -> &'static str {
        self.store.kind()
    }
}

type Table = BTreeMap<PartitionId, Partition>;

/// Owned routing table
pub struct PartitionRegistry {
    strategy: PartitionStrategy,
    table: RwLock<Arc<Table>>,
}

impl PartitionRegistry {
    /// Create an empty registry
    pub fn new(strategy: PartitionStrategy) -> Self {
        Self {
            strategy,
            table: RwLock::new(Arc::new(Table::new())),
        }
    }

    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    /// Current routing table
    pub fn snapshot(&self) -> Arc<Table> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*table)
    }

    /// Register a store for a partition
    pub fn add(&self, id: PartitionId, store: Arc<dyn BlobStore>) -> Result<(), RouterError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.contains_key(&id) {
            return Err(RouterError::AlreadyRegistered(id));
        }
        let mut next = (**table).clone();
        next.insert(id, Partition { id, store });
        *table = Arc::new(next);
        log::info!("Added partition {}", id);
        Ok(())
    }

    /// Drop partitions from the routing table.
    ///
    /// Either every id is removed or, if any is unknown, none is. Data held
    /// by the removed stores is neither checked nor migrated.
    pub fn remove(&self, ids: &[PartitionId]) -> Result<Vec<Partition>, RouterError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(missing) = ids.iter().find(|id| !table.contains_key(*id)) {
            return Err(RouterError::PartitionNotFound(*missing));
        }

        let mut next = (**table).clone();
        let removed: Vec<Partition> = ids.iter().filter_map(|id| next.remove(id)).collect();
        *table = Arc::new(next);

        for partition in &removed {
            log::warn!(
                "Removed partition {} ({}) from the routing table",
                partition.id,
                partition.backend()
            );
        }
        Ok(removed)
    }

    /// Look up a partition by id
    pub fn get(&self, id: PartitionId) -> Result<Partition, RouterError> {
        self.snapshot()
            .get(&id)
            .cloned()
            .ok_or(RouterError::PartitionNotFound(id))
    }

    /// Partition that owns `key`
    pub fn route(&self, key: &Id) -> Result<Partition, RouterError> {
        self.get(self.strategy.route(key))
    }

    /// Registered partition ids, ascending
    pub fn ids(&self) -> Vec<PartitionId> {
        self.snapshot().keys().copied().collect()
    }

    /// Registered partitions with their backend names, ascending
    pub fn list(&self) -> Vec<(PartitionId, &'static str)> {
        self.snapshot()
            .values()
            .map(|p| (p.id, p.backend()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::store::VersionedStore;

    fn memory_store(id: PartitionId) -> Arc<dyn BlobStore> {
        Arc::new(VersionedStore::new(id, MemoryEngine::new()))
    }

    fn registry(strategy: PartitionStrategy, count: u32) -> PartitionRegistry {
        let registry = PartitionRegistry::new(strategy);
        for id in 0..count {
            registry.add(id, memory_store(id)).unwrap();
        }
        registry
    }

    #[test]
    fn test_single_strategy_routes_everything_to_zero() {
        for key in ["a", "b", "user:1", ""] {
            assert_eq!(PartitionStrategy::Single.route(&Id::from(key)), 0);
        }
    }

    #[test]
    fn test_multi_strategy_is_deterministic() {
        let strategy = PartitionStrategy::Multi(2);
        let id = Id::from("some key");
        let first = strategy.route(&id);
        for _ in 0..100 {
            assert_eq!(strategy.route(&Id::from("some key")), first);
        }
        assert_eq!(u64::from(first), id.routing_hash() % 2);
    }

    #[test]
    fn test_multi_strategy_spreads_keys_evenly() {
        let strategy = PartitionStrategy::Multi(2);
        let samples = 10_000;
        let mut counts = [0usize; 2];
        for i in 0..samples {
            counts[strategy.route(&Id::from(format!("key-{}", i))) as usize] += 1;
        }
        // Within 5% of an even split
        for count in counts {
            assert!(
                (4_500..=5_500).contains(&count),
                "skewed distribution: {:?}",
                counts
            );
        }
    }

    #[test]
    fn test_multi_strategy_random_keys_stay_in_range() {
        use rand::Rng;

        let strategy = PartitionStrategy::Multi(3);
        let mut rng = rand::thread_rng();
        for _ in 0..1_000 {
            let len = rng.gen_range(0..32);
            let key: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            assert!(strategy.route(&Id::new(key)) < 3);
        }
    }

    #[test]
    fn test_route_to_unregistered_partition() {
        let registry = PartitionRegistry::new(PartitionStrategy::Multi(2));
        registry.add(0, memory_store(0)).unwrap();

        // Find a key that routes to partition 1
        let key = (0..)
            .map(|i| Id::from(format!("k{}", i)))
            .find(|id| PartitionStrategy::Multi(2).route(id) == 1)
            .unwrap();
        assert_eq!(
            registry.route(&key).err(),
            Some(RouterError::PartitionNotFound(1))
        );
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let registry = registry(PartitionStrategy::Single, 1);
        assert_eq!(
            registry.add(0, memory_store(0)).err(),
            Some(RouterError::AlreadyRegistered(0))
        );
    }

    #[test]
    fn test_remove_is_all_or_nothing() {
        let registry = registry(PartitionStrategy::Multi(3), 3);

        assert_eq!(
            registry.remove(&[1, 7]).err(),
            Some(RouterError::PartitionNotFound(7))
        );
        assert_eq!(registry.ids(), vec![0, 1, 2]);

        let removed = registry.remove(&[2, 0]).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.ids(), vec![1]);
        assert_eq!(registry.list(), vec![(1, "memory")]);
    }

    #[test]
    fn test_snapshot_survives_removal() {
        let registry = registry(PartitionStrategy::Multi(2), 2);
        let before = registry.snapshot();
        registry.remove(&[0]).unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(0).is_err());
    }
}
