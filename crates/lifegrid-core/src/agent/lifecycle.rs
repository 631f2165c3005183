use super::{ActionRecord, Agent, AgentSeed, DeathCause, Lineage, PathEntry};
use crate::barrier::StartBarrier;
use crate::policy::Action;
use crate::position::Direction;
use crate::registry::RunningGuard;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// What happened to the agent during one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Alive,
    Died,
}

impl Agent {
    /// Thread body: wait for the start signal, then observe-decide-act until
    /// death or freeze. `_running` keeps the agent counted until the thread ends.
    pub(crate) fn run(mut self, barrier: Option<Arc<StartBarrier>>, _running: RunningGuard) {
        if let Some(barrier) = barrier {
            barrier.wait();
        }
        let interval = self.phenome.tick_interval();
        loop {
            if self.freeze_observed() {
                break;
            }
            if interval.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(interval);
            }
            if self.freeze_observed() {
                break;
            }
            if self.step() == StepOutcome::Died {
                break;
            }
        }
    }

    fn freeze_observed(&mut self) -> bool {
        if !self.universe.is_frozen() {
            return false;
        }
        self.die(DeathCause::Frozen);
        true
    }

    /// One observe-decide-act iteration, without the reaction-time sleep.
    pub fn step(&mut self) -> StepOutcome {
        if self.is_dead() {
            return StepOutcome::Died;
        }
        let rules = *self.universe.energy();
        self.energy = self.energy.saturating_sub(rules.tick_cost);

        let view = self
            .universe
            .grid()
            .neighborhood(self.position, self.phenome.scope);
        let action = self.policy.decide(&view, &mut self.rng);
        let success = match action {
            Action::Idle => self.idle(),
            Action::Move(direction) => self.try_move(direction),
            Action::Reproduce => self.reproduce(),
        };
        self.log.push(ActionRecord {
            at: self.universe.clock().now(),
            action,
            success,
        });

        self.energy = self.energy.clamp(0, self.phenome.energy_capacity);
        if self.energy < rules.min_energy {
            self.die(DeathCause::Starvation);
            return StepOutcome::Died;
        }
        StepOutcome::Alive
    }

    fn idle(&mut self) -> bool {
        self.energy = self.energy.saturating_add(self.universe.energy().idle_refund);
        true
    }

    fn try_move(&mut self, direction: Direction) -> bool {
        let grid = self.universe.grid();
        let from = self.position;
        let to = grid.extent().step(from, direction);
        let record = &self.record;
        let moved = grid.move_occupant_with(from, to, |_| record.set_position(to));
        let rules = self.universe.energy();
        if moved {
            self.energy = self.energy.saturating_sub(rules.move_success_cost);
            self.position = to;
            self.path.push(PathEntry {
                at: self.universe.clock().now(),
                position: to,
            });
        } else {
            self.energy = self.energy.saturating_sub(rules.move_failure_cost);
        }
        moved
    }

    /// Pay half the energy up front, then try to place a child on a random
    /// free 8-neighbor. The payment is kept whether or not a child is placed.
    fn reproduce(&mut self) -> bool {
        // energy * 2 < capacity, without the multiplication.
        if self.energy < self.phenome.energy_capacity.saturating_sub(self.energy) {
            return false;
        }
        self.energy /= 2;

        let free = self.universe.grid().free_neighbors(self.position);
        let Some(&target) = free.choose(&mut self.rng) else {
            debug!(agent = %self.id(), "reproduction failed: no free neighbor");
            return false;
        };

        let policy = self
            .policy
            .offspring(self.universe.mutation(), &mut self.rng);
        let seed = AgentSeed {
            position: target,
            lineage: Lineage::child_of(self.id(), self.record.generation()),
            phenome: self.phenome.offspring(),
            policy,
            energy: self.energy / 2,
            rng_seed: self.rng.random(),
        };
        let child = match Agent::spawn(&self.universe, seed) {
            Ok(child) => child,
            Err(err) => {
                warn!(agent = %self.id(), error = %err, "offspring rejected");
                return false;
            }
        };
        self.children.push(child.record().id());
        let Some(child) = child.into_alive() else {
            return false;
        };
        // Offspring start immediately; their handles are detached and the
        // coordinator tracks them through the registry's running count.
        child.start(None).is_ok()
    }
}
