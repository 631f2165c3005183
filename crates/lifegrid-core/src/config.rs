use crate::phenome::{MutationRates, Phenome};
use crate::position::Extent;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-iteration energy accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyModel {
    /// Charged at the start of every loop iteration.
    pub tick_cost: i64,
    /// Credited back when the agent idles.
    pub idle_refund: i64,
    /// Charged when a move actually happens.
    pub move_success_cost: i64,
    /// Charged when the destination was occupied.
    pub move_failure_cost: i64,
    /// Agents with less energy than this die at the end of the iteration.
    pub min_energy: i64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            tick_cost: 1,
            idle_refund: 1,
            move_success_cost: 2,
            move_failure_cost: 1,
            min_energy: 1,
        }
    }
}

/// How the coordinator picks founder cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Founder `i` gets row `i·h/n` and column `i·w/n`, rows and columns shuffled independently.
    #[default]
    Diagonal,
    /// Uniformly random distinct cells.
    Random,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deterministic seed for founder placement, policies and agent RNGs.
    pub seed: u64,
    pub height: usize,
    pub width: usize,
    /// Largest perception radius the grid must support.
    pub perception_scope: usize,
    pub initial_population: usize,
    pub placement: PlacementStrategy,
    /// Wall-clock duration between barrier release and freeze.
    pub run_duration_ms: u64,
    /// Occupancy-map sampling period during a run. 0 disables periodic sampling.
    pub sample_interval_ms: u64,
    pub drain_poll_interval_ms: u64,
    /// Upper bound on waiting for running agents after freeze.
    pub drain_timeout_ms: u64,
    pub energy: EnergyModel,
    /// Trait template for founders.
    pub founder: Phenome,
    pub mutation: MutationRates,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            height: 64,
            width: 64,
            perception_scope: 1,
            initial_population: 32,
            placement: PlacementStrategy::Diagonal,
            run_duration_ms: 2_000,
            sample_interval_ms: 250,
            drain_poll_interval_ms: 2,
            drain_timeout_ms: 10_000,
            energy: EnergyModel::default(),
            founder: Phenome::default(),
            mutation: MutationRates::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimConfigError {
    #[error("grid dimensions must be positive (got {height}x{width})")]
    EmptyGrid { height: usize, width: usize },
    #[error("scope {scope} needs a grid of at least {needed}x{needed} (got {height}x{width})")]
    ScopeTooLarge {
        scope: usize,
        needed: usize,
        height: usize,
        width: usize,
    },
    #[error("founder scope {founder} exceeds perception scope {perception}")]
    FounderScopeTooLarge { founder: usize, perception: usize },
    #[error("initial population {population} exceeds cell count {cells}")]
    TooManyFounders { population: usize, cells: usize },
    #[error("diagonal placement needs population <= min(height, width) = {max} (got {population})")]
    DiagonalOvercrowded { population: usize, max: usize },
    #[error("energy capacity must be at least min_energy ({min_energy}), got {capacity}")]
    InvalidEnergyCapacity { capacity: i64, min_energy: i64 },
    #[error("energy capacity {capacity} exceeds the maximum {max}")]
    EnergyCapacityTooLarge { capacity: i64, max: i64 },
    #[error("min_energy must be at least 1 (got {0})")]
    InvalidMinEnergy(i64),
    #[error("energy costs must be non-negative")]
    NegativeEnergyCost,
    #[error("drain_poll_interval_ms must be positive")]
    InvalidDrainPollInterval,
    #[error("mutation rates must be finite, with point_rate in [0, 1] and positive value_limit")]
    InvalidMutationRates,
}

impl SimConfig {
    pub fn extent(&self) -> Extent {
        Extent::new(self.height, self.width)
    }

    pub fn validate(&self) -> Result<(), SimConfigError> {
        let extent = self.extent();
        if extent.cell_count() == 0 {
            return Err(SimConfigError::EmptyGrid {
                height: self.height,
                width: self.width,
            });
        }
        if !extent.supports_scope(self.perception_scope) {
            return Err(SimConfigError::ScopeTooLarge {
                scope: self.perception_scope,
                needed: 2 * self.perception_scope + 1,
                height: self.height,
                width: self.width,
            });
        }
        if self.founder.scope > self.perception_scope {
            return Err(SimConfigError::FounderScopeTooLarge {
                founder: self.founder.scope,
                perception: self.perception_scope,
            });
        }
        if self.initial_population > extent.cell_count() {
            return Err(SimConfigError::TooManyFounders {
                population: self.initial_population,
                cells: extent.cell_count(),
            });
        }
        let diagonal_max = self.height.min(self.width);
        if self.placement == PlacementStrategy::Diagonal && self.initial_population > diagonal_max
        {
            return Err(SimConfigError::DiagonalOvercrowded {
                population: self.initial_population,
                max: diagonal_max,
            });
        }
        if self.energy.min_energy < 1 {
            return Err(SimConfigError::InvalidMinEnergy(self.energy.min_energy));
        }
        if self.founder.energy_capacity < self.energy.min_energy {
            return Err(SimConfigError::InvalidEnergyCapacity {
                capacity: self.founder.energy_capacity,
                min_energy: self.energy.min_energy,
            });
        }
        if self.founder.energy_capacity > Phenome::MAX_ENERGY_CAPACITY {
            return Err(SimConfigError::EnergyCapacityTooLarge {
                capacity: self.founder.energy_capacity,
                max: Phenome::MAX_ENERGY_CAPACITY,
            });
        }
        let e = &self.energy;
        if [e.tick_cost, e.idle_refund, e.move_success_cost, e.move_failure_cost]
            .iter()
            .any(|&c| c < 0)
        {
            return Err(SimConfigError::NegativeEnergyCost);
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(SimConfigError::InvalidDrainPollInterval);
        }
        if !self.mutation.is_valid() {
            return Err(SimConfigError::InvalidMutationRates);
        }
        Ok(())
    }
}
