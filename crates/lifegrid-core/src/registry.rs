//! Process-wide population index.
//!
//! One explicitly constructed instance is shared by the coordinator and every
//! agent. Id allocation and living/dead transitions are serialized by a single
//! lock; the freeze flag and the running count are lock-free.

use crate::agent::AgentRecord;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Monotonically allocated agent identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct Population {
    next_id: u64,
    living: BTreeMap<AgentId, Arc<AgentRecord>>,
    dead: BTreeMap<AgentId, Arc<AgentRecord>>,
}

/// Sizes of both partitions, read under one lock acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PopulationCounts {
    pub living: usize,
    pub dead: usize,
    /// Number of ids ever handed out.
    pub allocated: u64,
}

#[derive(Default)]
pub struct PopulationRegistry {
    population: Mutex<Population>,
    frozen: AtomicBool,
    running: AtomicUsize,
}

impl PopulationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id and insert the record built for it into the living partition.
    ///
    /// `build` runs under the registry lock, so ids and anything it derives from
    /// shared state (such as the birth timestamp) are allocated in the same order.
    pub fn allocate_and_register(
        &self,
        build: impl FnOnce(AgentId) -> AgentRecord,
    ) -> Arc<AgentRecord> {
        let mut population = self.population.lock();
        let id = AgentId(population.next_id);
        population.next_id += 1;
        let record = Arc::new(build(id));
        assert_eq!(record.id(), id, "record built with a foreign id");
        assert!(
            !population.dead.contains_key(&id),
            "registry inconsistency: fresh id {id} already dead"
        );
        let previous = population.living.insert(id, Arc::clone(&record));
        assert!(
            previous.is_none(),
            "registry inconsistency: id {id} allocated twice"
        );
        record
    }

    /// Move `id` from the living to the dead partition.
    ///
    /// Returns `false` when the id is already dead. Panics on an id the
    /// registry never allocated.
    pub fn mark_dead(&self, id: AgentId) -> bool {
        let mut population = self.population.lock();
        match population.living.remove(&id) {
            Some(record) => {
                population.dead.insert(id, record);
                true
            }
            None => {
                assert!(
                    population.dead.contains_key(&id),
                    "registry inconsistency: unknown agent {id}"
                );
                false
            }
        }
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<AgentRecord>> {
        let population = self.population.lock();
        population
            .living
            .get(&id)
            .or_else(|| population.dead.get(&id))
            .cloned()
    }

    pub fn is_living(&self, id: AgentId) -> bool {
        self.population.lock().living.contains_key(&id)
    }

    /// Living agents ordered by id, as of one instant during the call.
    pub fn snapshot_living(&self) -> Vec<Arc<AgentRecord>> {
        self.population.lock().living.values().cloned().collect()
    }

    pub fn snapshot_dead(&self) -> Vec<Arc<AgentRecord>> {
        self.population.lock().dead.values().cloned().collect()
    }

    /// Every agent ever registered, ordered by id.
    pub fn snapshot_all(&self) -> Vec<Arc<AgentRecord>> {
        let population = self.population.lock();
        let mut all: Vec<_> = population
            .living
            .values()
            .chain(population.dead.values())
            .cloned()
            .collect();
        all.sort_by_key(|r| r.id());
        all
    }

    pub fn counts(&self) -> PopulationCounts {
        let population = self.population.lock();
        PopulationCounts {
            living: population.living.len(),
            dead: population.dead.len(),
            allocated: population.next_id,
        }
    }

    /// Ask every agent loop to stop. Idempotent.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Agents currently in the `Running` state (including those still parked
    /// on the start barrier).
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Count one more running agent until the returned guard drops.
    pub(crate) fn enter_running(self: &Arc<Self>) -> RunningGuard {
        self.running.fetch_add(1, Ordering::AcqRel);
        RunningGuard {
            registry: Arc::clone(self),
        }
    }
}

pub(crate) struct RunningGuard {
    registry: Arc<PopulationRegistry>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let prev = self.registry.running.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "running count underflow");
    }
}
