//! Agents: the unit of concurrency.
//!
//! An [`Agent`] owns its mutable state (energy, position cache, policy, logs)
//! and is moved onto its own thread by [`Agent::start`]. The registry and the
//! coordinator only ever hold the shared [`AgentRecord`], which carries the
//! immutable identity plus the few fields published for observers.

pub mod lifecycle;

pub use lifecycle::StepOutcome;

use crate::barrier::StartBarrier;
use crate::clock::Timestamp;
use crate::phenome::Phenome;
use crate::policy::{Action, DecisionPolicy};
use crate::position::Position;
use crate::registry::{AgentId, RunningGuard};
use crate::universe::Universe;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Spawned,
    Running,
    Dead,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Spawned,
            1 => LifecycleState::Running,
            _ => LifecycleState::Dead,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Energy fell below the minimum threshold.
    Starvation,
    /// The birth cell was occupied, or the agent's thread could not be started.
    Stillborn,
    /// The freeze signal was observed.
    Frozen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Death {
    pub at: Timestamp,
    pub cause: DeathCause,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub generation: u32,
    /// Empty for founders.
    pub parents: Vec<AgentId>,
}

impl Lineage {
    pub fn founder() -> Self {
        Self::default()
    }

    pub fn child_of(parent: AgentId, parent_generation: u32) -> Self {
        Self {
            generation: parent_generation.saturating_add(1),
            parents: vec![parent],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub at: Timestamp,
    pub action: Action,
    pub success: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub at: Timestamp,
    pub position: Position,
}

/// Private agent state, published once when the agent dies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHistory {
    pub log: Vec<ActionRecord>,
    /// Starts with the spawn cell; one entry per successful move.
    pub path: Vec<PathEntry>,
    pub children: Vec<AgentId>,
    pub final_energy: i64,
}

/// Shared handle stored in the registry.
#[derive(Debug)]
pub struct AgentRecord {
    id: AgentId,
    lineage: Lineage,
    birth: Timestamp,
    birth_energy: i64,
    color: [u8; 3],
    state: AtomicU8,
    position: Mutex<Position>,
    death: OnceLock<Death>,
    history: OnceLock<AgentHistory>,
}

impl AgentRecord {
    pub fn new(
        id: AgentId,
        lineage: Lineage,
        birth: Timestamp,
        position: Position,
        birth_energy: i64,
        color: [u8; 3],
    ) -> Self {
        Self {
            id,
            lineage,
            birth,
            birth_energy,
            color,
            state: AtomicU8::new(LifecycleState::Spawned as u8),
            position: Mutex::new(position),
            death: OnceLock::new(),
            history: OnceLock::new(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn generation(&self) -> u32 {
        self.lineage.generation
    }

    pub fn parents(&self) -> &[AgentId] {
        &self.lineage.parents
    }

    pub fn birth(&self) -> Timestamp {
        self.birth
    }

    pub fn birth_energy(&self) -> i64 {
        self.birth_energy
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Last committed cell. Matches the grid when read under that cell's lock.
    pub fn position(&self) -> Position {
        *self.position.lock()
    }

    pub fn death(&self) -> Option<Death> {
        self.death.get().copied()
    }

    /// Present once the agent has died.
    pub fn history(&self) -> Option<&AgentHistory> {
        self.history.get()
    }

    pub(crate) fn set_position(&self, position: Position) {
        *self.position.lock() = position;
    }

    fn enter_running(&self) -> bool {
        self.state
            .compare_exchange(
                LifecycleState::Spawned as u8,
                LifecycleState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Everything needed to bring an agent into the world.
pub struct AgentSeed {
    pub position: Position,
    pub lineage: Lineage,
    pub phenome: Phenome,
    pub policy: Box<dyn DecisionPolicy>,
    /// Clamped to `[0, phenome.energy_capacity]`.
    pub energy: i64,
    pub rng_seed: u64,
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("agent scope {scope} exceeds the grid's perception scope {max}")]
    ScopeTooLarge { scope: usize, max: usize },
    #[error("energy capacity {capacity} outside the accepted range [{min}, {max}]")]
    InvalidEnergyCapacity { capacity: i64, min: i64, max: i64 },
    #[error("agent {0} is no longer in the spawned state")]
    NotSpawned(AgentId),
    #[error("failed to start thread for agent {id}: {source}")]
    Thread {
        id: AgentId,
        #[source]
        source: std::io::Error,
    },
}

/// Result of [`Agent::spawn`].
pub enum Spawned {
    Alive(Agent),
    /// Registered, but the birth cell was taken; already in the dead partition.
    Stillborn(Arc<AgentRecord>),
}

impl Spawned {
    pub fn record(&self) -> &Arc<AgentRecord> {
        match self {
            Spawned::Alive(agent) => agent.record(),
            Spawned::Stillborn(record) => record,
        }
    }

    pub fn into_alive(self) -> Option<Agent> {
        match self {
            Spawned::Alive(agent) => Some(agent),
            Spawned::Stillborn(_) => None,
        }
    }
}

pub struct Agent {
    record: Arc<AgentRecord>,
    universe: Arc<Universe>,
    phenome: Phenome,
    policy: Box<dyn DecisionPolicy>,
    rng: ChaCha12Rng,
    position: Position,
    energy: i64,
    log: Vec<ActionRecord>,
    path: Vec<PathEntry>,
    children: Vec<AgentId>,
}

impl Agent {
    /// Register a new agent and place it on the grid.
    ///
    /// Registration always happens; if the cell is already occupied the agent
    /// dies on the spot and is returned as [`Spawned::Stillborn`].
    pub fn spawn(universe: &Arc<Universe>, seed: AgentSeed) -> Result<Spawned, SpawnError> {
        let grid = universe.grid();
        if seed.phenome.scope > grid.perception_scope() {
            return Err(SpawnError::ScopeTooLarge {
                scope: seed.phenome.scope,
                max: grid.perception_scope(),
            });
        }
        check_energy_capacity(&seed.phenome, universe.energy().min_energy)?;
        let position = grid
            .extent()
            .wrap(seed.position.row as isize, seed.position.col as isize);
        let energy = seed.energy.clamp(0, seed.phenome.energy_capacity);
        let color = seed.phenome.color;
        let lineage = seed.lineage;
        let record = universe.registry().allocate_and_register(|id| {
            AgentRecord::new(id, lineage, universe.clock().now(), position, energy, color)
        });

        if !grid.place(position, record.id()) {
            debug!(agent = %record.id(), %position, "stillborn: birth cell occupied");
            bury(universe, &record, DeathCause::Stillborn);
            let _ = record.history.set(AgentHistory {
                final_energy: energy,
                ..AgentHistory::default()
            });
            return Ok(Spawned::Stillborn(record));
        }

        debug!(
            agent = %record.id(),
            generation = record.generation(),
            %position,
            energy,
            "agent born"
        );
        let path = vec![PathEntry {
            at: record.birth(),
            position,
        }];
        Ok(Spawned::Alive(Agent {
            record,
            universe: Arc::clone(universe),
            phenome: seed.phenome,
            policy: seed.policy,
            rng: ChaCha12Rng::seed_from_u64(seed.rng_seed),
            position,
            energy,
            log: Vec::new(),
            path,
            children: Vec::new(),
        }))
    }

    /// Move the agent onto its own thread and enter `Running`.
    ///
    /// With a barrier the loop begins only once it is released; the agent
    /// counts as running from this call on.
    pub fn start(
        self,
        barrier: Option<Arc<StartBarrier>>,
    ) -> Result<JoinHandle<()>, SpawnError> {
        let id = self.id();
        if !self.record.enter_running() {
            return Err(SpawnError::NotSpawned(id));
        }
        let guard = self.universe.registry().enter_running();
        let universe = Arc::clone(&self.universe);
        let record = Arc::clone(&self.record);
        thread::Builder::new()
            .name(format!("agent-{}", id.0))
            .spawn(move || self.run(barrier, guard))
            .map_err(|source| {
                warn!(agent = %id, error = %source, "agent thread failed to start");
                bury(&universe, &record, DeathCause::Stillborn);
                let _ = record.history.set(AgentHistory {
                    final_energy: record.birth_energy(),
                    ..AgentHistory::default()
                });
                SpawnError::Thread { id, source }
            })
    }

    /// Death bookkeeping. A second call is a no-op.
    pub fn die(&mut self, cause: DeathCause) {
        if !bury(&self.universe, &self.record, cause) {
            return;
        }
        debug!(
            agent = %self.id(),
            ?cause,
            energy = self.energy,
            actions = self.log.len(),
            "agent died"
        );
        let history = AgentHistory {
            log: std::mem::take(&mut self.log),
            path: std::mem::take(&mut self.path),
            children: std::mem::take(&mut self.children),
            final_energy: self.energy,
        };
        let published = self.record.history.set(history);
        assert!(
            published.is_ok(),
            "history for agent {} published twice",
            self.id()
        );
    }

    pub fn id(&self) -> AgentId {
        self.record.id()
    }

    pub fn record(&self) -> &Arc<AgentRecord> {
        &self.record
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn phenome(&self) -> &Phenome {
        &self.phenome
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn energy(&self) -> i64 {
        self.energy
    }

    pub fn log(&self) -> &[ActionRecord] {
        &self.log
    }

    pub fn path(&self) -> &[PathEntry] {
        &self.path
    }

    pub fn children(&self) -> &[AgentId] {
        &self.children
    }

    pub fn is_dead(&self) -> bool {
        self.record.state() == LifecycleState::Dead
    }
}

/// Capacity must admit a living agent and stay below the overflow bound.
pub(crate) fn check_energy_capacity(phenome: &Phenome, min_energy: i64) -> Result<(), SpawnError> {
    let capacity = phenome.energy_capacity;
    if (min_energy..=Phenome::MAX_ENERGY_CAPACITY).contains(&capacity) {
        return Ok(());
    }
    Err(SpawnError::InvalidEnergyCapacity {
        capacity,
        min: min_energy,
        max: Phenome::MAX_ENERGY_CAPACITY,
    })
}

/// Vacate the agent's cell, move it to the dead partition and stamp its death.
///
/// Returns `false` if the agent was already dead. The cell is cleared before
/// the registry transition so that every grid occupant is always living.
fn bury(universe: &Universe, record: &AgentRecord, cause: DeathCause) -> bool {
    let death = Death {
        at: universe.clock().now(),
        cause,
    };
    if record.death.set(death).is_err() {
        return false;
    }
    universe.grid().vacate_if(record.position(), record.id());
    let moved = universe.registry().mark_dead(record.id());
    assert!(
        moved,
        "registry inconsistency: agent {} was dead before its first death",
        record.id()
    );
    record
        .state
        .store(LifecycleState::Dead as u8, Ordering::Release);
    true
}
