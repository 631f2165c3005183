//! Concurrent agent simulation on a toroidal grid.
//!
//! Every agent runs its own observe-decide-act loop on a dedicated thread.
//! Agents share a [`grid::Grid`] of individually locked cells, a
//! [`registry::PopulationRegistry`] and a monotonic [`clock::Clock`], bundled
//! together as a [`universe::Universe`]. A [`coordinator::Coordinator`] seeds
//! the founders, releases them together, freezes the world after a bounded
//! duration and collects a [`report::RunReport`].

pub mod agent;
pub mod barrier;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod grid;
pub mod phenome;
pub mod policy;
pub mod position;
pub mod registry;
pub mod report;
pub mod universe;

pub use agent::{Agent, AgentRecord, AgentSeed, DeathCause, Lineage, Spawned};
pub use config::{EnergyModel, PlacementStrategy, SimConfig};
pub use coordinator::{Coordinator, CoordinatorError, FounderSpec};
pub use policy::{Action, DecisionPolicy, FixedPolicy, WeightedPolicy};
pub use position::{Direction, Extent, Position};
pub use registry::AgentId;
pub use report::RunReport;
pub use universe::Universe;
