use crate::clock::Clock;
use crate::config::{EnergyModel, SimConfig, SimConfigError};
use crate::grid::Grid;
use crate::phenome::MutationRates;
use crate::position::Position;
use crate::registry::{AgentId, PopulationRegistry};
use std::sync::Arc;

/// Everything agents share: the grid, the population registry and the clock,
/// plus the rule constants every agent loop reads.
pub struct Universe {
    grid: Grid,
    registry: Arc<PopulationRegistry>,
    clock: Clock,
    energy: EnergyModel,
    mutation: MutationRates,
}

/// A broken occupancy invariant found by [`Universe::occupancy_violations`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OccupancyViolation {
    UnknownOccupant { cell: Position, id: AgentId },
    DeadOccupant { cell: Position, id: AgentId },
    PositionMismatch {
        cell: Position,
        id: AgentId,
        recorded: Position,
    },
}

impl Universe {
    pub fn new(grid: Grid, energy: EnergyModel, mutation: MutationRates) -> Self {
        Self {
            grid,
            registry: Arc::new(PopulationRegistry::new()),
            clock: Clock::new(),
            energy,
            mutation,
        }
    }

    pub fn from_config(config: &SimConfig) -> Result<Self, SimConfigError> {
        config.validate()?;
        let grid = Grid::new(config.extent(), config.perception_scope);
        Ok(Self::new(grid, config.energy, config.mutation))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn registry(&self) -> &Arc<PopulationRegistry> {
        &self.registry
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn energy(&self) -> &EnergyModel {
        &self.energy
    }

    pub fn mutation(&self) -> &MutationRates {
        &self.mutation
    }

    pub fn is_frozen(&self) -> bool {
        self.registry.is_frozen()
    }

    pub fn freeze(&self) {
        self.registry.freeze();
    }

    /// Walk the grid and report every cell whose occupant is not a living
    /// agent recorded at that cell.
    ///
    /// Each cell is checked under its own lock, so the check is meaningful
    /// while agents are running.
    pub fn occupancy_violations(&self) -> Vec<OccupancyViolation> {
        let extent = self.grid.extent();
        let mut violations = Vec::new();
        for index in 0..extent.cell_count() {
            let cell = extent.position_of(index);
            let found = self.grid.inspect(cell, |occupant| {
                let id = occupant?;
                match self.registry.get(id) {
                    None => Some(OccupancyViolation::UnknownOccupant { cell, id }),
                    Some(_) if !self.registry.is_living(id) => {
                        Some(OccupancyViolation::DeadOccupant { cell, id })
                    }
                    Some(record) if record.position() != cell => {
                        Some(OccupancyViolation::PositionMismatch {
                            cell,
                            id,
                            recorded: record.position(),
                        })
                    }
                    Some(_) => None,
                }
            });
            violations.extend(found);
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRecord, Lineage};
    use crate::clock::Timestamp;
    use crate::position::Extent;

    fn universe() -> Universe {
        Universe::new(
            Grid::new(Extent::new(4, 4), 1),
            EnergyModel::default(),
            MutationRates::DISABLED,
        )
    }

    fn register(universe: &Universe, at: Position) -> AgentId {
        universe
            .registry()
            .allocate_and_register(|id| {
                AgentRecord::new(id, Lineage::founder(), Timestamp(id.0 + 1), at, 10, [0, 0, 0])
            })
            .id()
    }

    #[test]
    fn from_config_validates() {
        let config = SimConfig {
            height: 0,
            ..SimConfig::default()
        };
        assert!(matches!(
            Universe::from_config(&config),
            Err(SimConfigError::EmptyGrid { .. })
        ));
        let universe = Universe::from_config(&SimConfig::default()).unwrap();
        assert_eq!(universe.grid().extent(), Extent::new(64, 64));
        assert!(!universe.is_frozen());
    }

    #[test]
    fn consistent_grid_has_no_violations() {
        let universe = universe();
        let at = Position::new(2, 3);
        let id = register(&universe, at);
        assert!(universe.grid().place(at, id));
        assert!(universe.occupancy_violations().is_empty());
    }

    #[test]
    fn each_kind_of_violation_is_reported() {
        let universe = universe();
        let grid = universe.grid();

        let stranger = AgentId(99);
        assert!(grid.place(Position::new(0, 0), stranger));

        let misplaced = register(&universe, Position::new(1, 1));
        assert!(grid.place(Position::new(1, 2), misplaced));

        let ghost = register(&universe, Position::new(3, 3));
        assert!(grid.place(Position::new(3, 3), ghost));
        assert!(universe.registry().mark_dead(ghost));

        assert_eq!(
            universe.occupancy_violations(),
            vec![
                OccupancyViolation::UnknownOccupant {
                    cell: Position::new(0, 0),
                    id: stranger,
                },
                OccupancyViolation::PositionMismatch {
                    cell: Position::new(1, 2),
                    id: misplaced,
                    recorded: Position::new(1, 1),
                },
                OccupancyViolation::DeadOccupant {
                    cell: Position::new(3, 3),
                    id: ghost,
                },
            ]
        );
    }

    #[test]
    fn freeze_is_shared_with_the_registry() {
        let universe = universe();
        universe.freeze();
        assert!(universe.is_frozen());
        assert!(universe.registry().is_frozen());
    }
}
