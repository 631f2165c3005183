//! Run orchestration: seed founders, release them together, sample the grid,
//! freeze, drain, report.

use crate::agent::{check_energy_capacity, Agent, AgentSeed, Lineage, Spawned, SpawnError};
use crate::barrier::StartBarrier;
use crate::config::{PlacementStrategy, SimConfig, SimConfigError};
use crate::phenome::Phenome;
use crate::policy::{DecisionPolicy, WeightedPolicy};
use crate::position::{Extent, Position};
use crate::registry::AgentId;
use crate::report::{self, OccupancyFrame, RunReport};
use crate::universe::Universe;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// An explicitly placed founder. Missing traits are drawn from the config's
/// founder template; missing energy starts the founder at full capacity.
pub struct FounderSpec {
    pub position: Position,
    pub policy: Box<dyn DecisionPolicy>,
    pub phenome: Option<Phenome>,
    pub energy: Option<i64>,
}

impl FounderSpec {
    pub fn new(position: Position, policy: impl DecisionPolicy + 'static) -> Self {
        Self {
            position,
            policy: Box::new(policy),
            phenome: None,
            energy: None,
        }
    }

    pub fn with_phenome(mut self, phenome: Phenome) -> Self {
        self.phenome = Some(phenome);
        self
    }

    pub fn with_energy(mut self, energy: i64) -> Self {
        self.energy = Some(energy);
        self
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Config(#[from] SimConfigError),
    #[error("{count} founders do not fit on a grid of {cells} cells")]
    TooManyFounders { count: usize, cells: usize },
    #[error("more than one founder placed at {0}")]
    DuplicateFounderPosition(Position),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

pub struct Coordinator {
    config: SimConfig,
    universe: Arc<Universe>,
    rng: ChaCha12Rng,
}

impl Coordinator {
    pub fn new(config: SimConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: SimConfig) -> Result<Self, CoordinatorError> {
        let universe = Arc::new(Universe::from_config(&config)?);
        let rng = ChaCha12Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            universe,
            rng,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Shared state, for observers running alongside [`Coordinator::run`].
    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    /// Distinct cells for `initial_population` founders under the configured strategy.
    pub fn founder_positions(&mut self) -> Vec<Position> {
        let extent = self.config.extent();
        let n = self.config.initial_population;
        match self.config.placement {
            PlacementStrategy::Diagonal => diagonal_positions(extent, n, &mut self.rng),
            PlacementStrategy::Random => random_positions(extent, n, &mut self.rng),
        }
    }

    /// Run with randomly weighted founder policies.
    pub fn run(self) -> Result<RunReport, CoordinatorError> {
        self.run_with(|rng| Box::new(WeightedPolicy::random(rng)))
    }

    /// Run with founders at the configured positions, each given a policy
    /// built by `policy`.
    pub fn run_with(
        mut self,
        mut policy: impl FnMut(&mut ChaCha12Rng) -> Box<dyn DecisionPolicy>,
    ) -> Result<RunReport, CoordinatorError> {
        let founders: Vec<FounderSpec> = self
            .founder_positions()
            .into_iter()
            .map(|position| FounderSpec {
                position,
                policy: policy(&mut self.rng),
                phenome: None,
                energy: None,
            })
            .collect();
        self.run_founders(founders)
    }

    /// Run with an explicit founder list; `initial_population` and `placement`
    /// are ignored.
    pub fn run_founders(
        mut self,
        founders: Vec<FounderSpec>,
    ) -> Result<RunReport, CoordinatorError> {
        self.check_founders(&founders)?;

        let agents = self.spawn_founders(founders)?;
        let founder_count = agents.len();
        let barrier = Arc::new(StartBarrier::new());
        let mut handles: Vec<(AgentId, JoinHandle<()>)> = Vec::with_capacity(founder_count);
        for agent in agents {
            let id = agent.id();
            match agent.start(Some(Arc::clone(&barrier))) {
                Ok(handle) => handles.push((id, handle)),
                Err(err) => warn!(agent = %id, error = %err, "founder did not start"),
            }
        }

        let clock = self.universe.clock();
        let started = clock.now();
        barrier.release();
        info!(
            founders = founder_count,
            started = handles.len(),
            "founders released"
        );

        let mut population_map = self.sample_until_deadline();
        population_map.push(self.sample());

        let stopped = clock.now();
        self.universe.freeze();
        info!(
            living = self.universe.registry().counts().living,
            "freeze signalled"
        );

        let drained = self.drain();
        if drained {
            for (id, handle) in handles {
                if handle.join().is_err() {
                    error!(agent = %id, "agent thread panicked");
                }
            }
        }

        let agents = report::summarize(&self.universe.registry().snapshot_all());
        let counts = self.universe.registry().counts();
        let births = agents.iter().filter(|s| !s.parents.is_empty()).count();
        let deaths = report::tally_deaths(&agents);
        info!(
            agents = agents.len(),
            births,
            starved = deaths.starvation,
            stillborn = deaths.stillborn,
            drained,
            "run complete"
        );

        Ok(RunReport {
            schema_version: 1,
            seed: self.config.seed,
            height: self.config.height,
            width: self.config.width,
            started,
            stopped,
            drained,
            founders: founder_count,
            births,
            counts,
            deaths,
            population_map,
            agents,
        })
    }

    fn check_founders(&self, founders: &[FounderSpec]) -> Result<(), CoordinatorError> {
        let extent = self.config.extent();
        if founders.len() > extent.cell_count() {
            return Err(CoordinatorError::TooManyFounders {
                count: founders.len(),
                cells: extent.cell_count(),
            });
        }
        let max = self.universe.grid().perception_scope();
        let min_energy = self.universe.energy().min_energy;
        let mut taken = HashSet::with_capacity(founders.len());
        for spec in founders {
            let position = extent.wrap(spec.position.row as isize, spec.position.col as isize);
            if !taken.insert(position) {
                return Err(CoordinatorError::DuplicateFounderPosition(position));
            }
            if let Some(phenome) = &spec.phenome {
                check_energy_capacity(phenome, min_energy)?;
                if phenome.scope > max {
                    return Err(SpawnError::ScopeTooLarge {
                        scope: phenome.scope,
                        max,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn spawn_founders(&mut self, founders: Vec<FounderSpec>) -> Result<Vec<Agent>, CoordinatorError> {
        let mut agents = Vec::with_capacity(founders.len());
        for spec in founders {
            let phenome = spec
                .phenome
                .unwrap_or_else(|| Phenome::founder(&self.config.founder, &mut self.rng));
            let energy = spec.energy.unwrap_or(phenome.energy_capacity);
            let seed = AgentSeed {
                position: spec.position,
                lineage: Lineage::founder(),
                phenome,
                policy: spec.policy,
                energy,
                rng_seed: self.rng.random(),
            };
            match Agent::spawn(&self.universe, seed)? {
                Spawned::Alive(agent) => agents.push(agent),
                Spawned::Stillborn(record) => {
                    warn!(agent = %record.id(), "founder stillborn");
                }
            }
        }
        debug!(count = agents.len(), "founders spawned");
        Ok(agents)
    }

    fn sample(&self) -> OccupancyFrame {
        OccupancyFrame {
            at: self.universe.clock().now(),
            cells: self.universe.grid().occupancy_map(),
        }
    }

    /// Sleep through the run, taking a frame every sample interval.
    fn sample_until_deadline(&self) -> Vec<OccupancyFrame> {
        let deadline = Instant::now() + Duration::from_millis(self.config.run_duration_ms);
        let every = Duration::from_millis(self.config.sample_interval_ms);
        let mut frames = Vec::new();
        if every.is_zero() {
            thread::sleep(deadline.saturating_duration_since(Instant::now()));
            return frames;
        }
        let mut next = Instant::now() + every;
        while next < deadline {
            thread::sleep(next.saturating_duration_since(Instant::now()));
            frames.push(self.sample());
            next += every;
        }
        thread::sleep(deadline.saturating_duration_since(Instant::now()));
        frames
    }

    /// Poll until no agent thread is running. `false` on timeout.
    fn drain(&self) -> bool {
        let poll = Duration::from_millis(self.config.drain_poll_interval_ms);
        let deadline = Instant::now() + Duration::from_millis(self.config.drain_timeout_ms);
        let registry = self.universe.registry();
        loop {
            let running = registry.running_count();
            if running == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(running, "drain timed out; agent threads left detached");
                return false;
            }
            thread::sleep(poll);
        }
    }
}

/// Founder `i` gets row `i·h/n` and column `i·w/n`; rows and columns are
/// shuffled independently. Requires `n <= min(h, w)`.
fn diagonal_positions<R: Rng + ?Sized>(extent: Extent, n: usize, rng: &mut R) -> Vec<Position> {
    let mut rows: Vec<usize> = (0..n).map(|i| i * extent.height / n).collect();
    let mut cols: Vec<usize> = (0..n).map(|i| i * extent.width / n).collect();
    rows.shuffle(rng);
    cols.shuffle(rng);
    rows.into_iter()
        .zip(cols)
        .map(|(row, col)| Position::new(row, col))
        .collect()
}

fn random_positions<R: Rng + ?Sized>(extent: Extent, n: usize, rng: &mut R) -> Vec<Position> {
    rand::seq::index::sample(rng, extent.cell_count(), n)
        .into_iter()
        .map(|index| extent.position_of(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::DeathCause;
    use crate::policy::{Action, FixedPolicy};

    fn small_config() -> SimConfig {
        SimConfig {
            height: 8,
            width: 8,
            initial_population: 4,
            run_duration_ms: 60,
            sample_interval_ms: 20,
            ..SimConfig::default()
        }
    }

    #[test]
    fn diagonal_positions_use_distinct_rows_and_columns() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let extent = Extent::new(10, 20);
        let positions = diagonal_positions(extent, 5, &mut rng);
        let mut rows: Vec<_> = positions.iter().map(|p| p.row).collect();
        let mut cols: Vec<_> = positions.iter().map(|p| p.col).collect();
        rows.sort_unstable();
        cols.sort_unstable();
        assert_eq!(rows, vec![0, 2, 4, 6, 8]);
        assert_eq!(cols, vec![0, 4, 8, 12, 16]);
    }

    #[test]
    fn random_positions_are_distinct_and_in_bounds() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        let extent = Extent::new(3, 3);
        let positions = random_positions(extent, 9, &mut rng);
        let unique: HashSet<_> = positions.iter().copied().collect();
        assert_eq!(unique.len(), 9);
        assert!(positions.iter().all(|&p| extent.contains(p)));
    }

    #[test]
    fn placement_is_deterministic_per_seed() {
        let a = Coordinator::new(small_config()).founder_positions();
        let b = Coordinator::new(small_config()).founder_positions();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            height: 0,
            ..small_config()
        };
        assert!(matches!(
            Coordinator::try_new(config),
            Err(CoordinatorError::Config(SimConfigError::EmptyGrid { .. }))
        ));
    }

    #[test]
    #[should_panic(expected = "grid dimensions must be positive")]
    fn new_panics_on_invalid_config() {
        let _ = Coordinator::new(SimConfig {
            width: 0,
            ..small_config()
        });
    }

    #[test]
    fn duplicate_founders_are_rejected() {
        let founders = vec![
            FounderSpec::new(Position::new(1, 1), FixedPolicy(Action::Idle)),
            FounderSpec::new(Position::new(9, 1), FixedPolicy(Action::Idle)),
        ];
        let err = Coordinator::new(small_config())
            .run_founders(founders)
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::DuplicateFounderPosition(p) if p == Position::new(1, 1)
        ));
    }

    #[test]
    fn oversized_founder_scope_is_rejected() {
        let phenome = Phenome {
            scope: 2,
            ..Phenome::default()
        };
        let founders =
            vec![FounderSpec::new(Position::new(0, 0), FixedPolicy(Action::Idle)).with_phenome(phenome)];
        let err = Coordinator::new(small_config())
            .run_founders(founders)
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Spawn(SpawnError::ScopeTooLarge { scope: 2, max: 1 })
        ));
    }

    #[test]
    fn founder_capacity_is_checked_before_anything_spawns() {
        let coordinator = Coordinator::new(small_config());
        let universe = Arc::clone(coordinator.universe());
        let broke = Phenome {
            energy_capacity: -5,
            ..Phenome::default()
        };
        let founders = vec![
            FounderSpec::new(Position::new(0, 0), FixedPolicy(Action::Idle)),
            FounderSpec::new(Position::new(1, 1), FixedPolicy(Action::Idle)).with_phenome(broke),
        ];
        let err = coordinator.run_founders(founders).unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Spawn(SpawnError::InvalidEnergyCapacity { capacity: -5, .. })
        ));
        assert_eq!(universe.registry().counts().allocated, 0);
        assert_eq!(universe.grid().occupied_count(), 0);
    }

    #[test]
    fn oversized_founder_capacity_is_rejected() {
        let huge = Phenome {
            energy_capacity: i64::MAX,
            ..Phenome::default()
        };
        let founders =
            vec![FounderSpec::new(Position::new(0, 0), FixedPolicy(Action::Reproduce)).with_phenome(huge)];
        let err = Coordinator::new(small_config())
            .run_founders(founders)
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Spawn(SpawnError::InvalidEnergyCapacity { .. })
        ));
    }

    #[test]
    fn empty_run_reports_nothing() {
        let report = Coordinator::new(SimConfig {
            initial_population: 0,
            ..small_config()
        })
        .run()
        .unwrap();
        assert!(report.drained);
        assert_eq!(report.founders, 0);
        assert!(report.agents.is_empty());
        assert!(report.population_map.iter().all(|f| f.cells.iter().all(|&c| c == 0)));
    }

    #[test]
    fn idle_founders_survive_until_freeze() {
        let report = Coordinator::new(small_config())
            .run_with(|_| Box::new(FixedPolicy(Action::Idle)))
            .unwrap();

        assert!(report.drained);
        assert_eq!(report.founders, 4);
        assert_eq!(report.births, 0);
        assert_eq!(report.counts.living, 0);
        assert_eq!(report.counts.dead, 4);
        assert_eq!(report.deaths.frozen, 4);
        assert!(report.started < report.stopped);
        for agent in &report.agents {
            assert_eq!(agent.cause, Some(DeathCause::Frozen));
            assert_eq!(agent.final_energy, Some(100));
            assert!(agent.death.is_some_and(|d| d >= report.stopped));
        }

        // Periodic frames plus the final one taken before freeze.
        assert!(report.population_map.len() >= 2);
        let last = report.population_map.last().unwrap();
        assert_eq!(last.cells.iter().filter(|&&c| c != 0).count(), 4);
        assert!(last.at <= report.stopped);
    }

    #[test]
    fn explicit_founders_keep_their_traits() {
        let phenome = Phenome {
            color: [10, 20, 30],
            ..Phenome::default()
        };
        let founders = vec![
            FounderSpec::new(Position::new(2, 3), FixedPolicy(Action::Idle))
                .with_phenome(phenome)
                .with_energy(40),
        ];
        let report = Coordinator::new(small_config())
            .run_founders(founders)
            .unwrap();
        let founder = &report.agents[0];
        assert_eq!(founder.color, [10, 20, 30]);
        assert_eq!(founder.birth_energy, 40);
        assert_eq!(founder.path[0].position, Position::new(2, 3));
    }
}
