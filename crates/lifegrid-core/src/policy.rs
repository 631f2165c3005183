//! Decision policies: perceived neighborhood in, one action out.

use crate::grid::Neighborhood;
use crate::phenome::MutationRates;
use crate::position::Direction;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed action set. New behaviours are new variants, matched exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Idle,
    Move(Direction),
    Reproduce,
}

impl Action {
    pub const COUNT: usize = 6;

    pub const ALL: [Action; Action::COUNT] = [
        Action::Idle,
        Action::Move(Direction::North),
        Action::Move(Direction::South),
        Action::Move(Direction::East),
        Action::Move(Direction::West),
        Action::Reproduce,
    ];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Idle => write!(f, "idle"),
            Action::Move(dir) => write!(f, "move_{}", format!("{dir:?}").to_lowercase()),
            Action::Reproduce => write!(f, "reproduce"),
        }
    }
}

/// Pluggable decision function run on the agent's own thread.
///
/// `decide` must not touch shared resources. Internal parameters may be read
/// but only `mutate` changes them, and only on a fresh copy for an offspring.
pub trait DecisionPolicy: Send {
    fn decide(&self, view: &Neighborhood, rng: &mut dyn RngCore) -> Action;

    /// Independent instance with identical parameters.
    fn copy(&self) -> Box<dyn DecisionPolicy>;

    /// Perturb internal parameters by a bounded random amount.
    fn mutate(&mut self, _rates: &MutationRates, _rng: &mut dyn RngCore) {}

    fn name(&self) -> &'static str;

    fn offspring(&self, rates: &MutationRates, rng: &mut dyn RngCore) -> Box<dyn DecisionPolicy> {
        let mut child = self.copy();
        if rates.enabled {
            child.mutate(rates, rng);
        }
        child
    }
}

impl fmt::Debug for dyn DecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DecisionPolicy({})", self.name())
    }
}

/// Always chooses the same action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPolicy(pub Action);

impl DecisionPolicy for FixedPolicy {
    fn decide(&self, _view: &Neighborhood, _rng: &mut dyn RngCore) -> Action {
        self.0
    }

    fn copy(&self) -> Box<dyn DecisionPolicy> {
        Box::new(*self)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Samples an action from normalised per-action weights, ignoring the view.
#[derive(Clone, Debug)]
pub struct WeightedPolicy {
    weights: [f32; Action::COUNT],
    sampler: WeightedIndex<f32>,
}

impl WeightedPolicy {
    /// Weights are indexed like [`Action::ALL`]. Negative or non-finite weights
    /// count as zero; an all-zero vector falls back to uniform.
    pub fn new(weights: [f32; Action::COUNT]) -> Self {
        let mut weights = weights.map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
        let total: f32 = weights.iter().sum();
        if total > 0.0 {
            for w in &mut weights {
                *w /= total;
            }
        } else {
            weights = [1.0 / Action::COUNT as f32; Action::COUNT];
        }
        let sampler = WeightedIndex::new(weights)
            .unwrap_or_else(|_| Self::uniform_sampler());
        Self { weights, sampler }
    }

    pub fn uniform() -> Self {
        Self::new([1.0; Action::COUNT])
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(std::array::from_fn(|_| rng.random::<f32>()))
    }

    fn uniform_sampler() -> WeightedIndex<f32> {
        WeightedIndex::new([1.0f32; Action::COUNT])
            .unwrap_or_else(|e| unreachable!("uniform weights rejected: {e}"))
    }

    /// Normalised weights, summing to 1.
    pub fn weights(&self) -> &[f32; Action::COUNT] {
        &self.weights
    }
}

impl DecisionPolicy for WeightedPolicy {
    fn decide(&self, _view: &Neighborhood, rng: &mut dyn RngCore) -> Action {
        Action::ALL[self.sampler.sample(rng)]
    }

    fn copy(&self) -> Box<dyn DecisionPolicy> {
        Box::new(self.clone())
    }

    fn mutate(&mut self, rates: &MutationRates, rng: &mut dyn RngCore) {
        let mut weights = self.weights;
        rates.perturb(rng, &mut weights);
        *self = Self::new(weights);
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
