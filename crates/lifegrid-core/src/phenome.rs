use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hereditary numeric traits consumed by the agent loop.
///
/// Traits are copied at birth and owned by the agent afterwards; the decision
/// policy travels separately because it is not plain data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phenome {
    /// Minimum "thinking time" slept at the top of every loop iteration.
    pub reaction_time: Duration,
    /// Maximum loop iterations per second. 0 leaves the rate uncapped.
    pub speed: u32,
    /// Upper clamp for the energy budget; newborn founders start full.
    pub energy_capacity: i64,
    /// Perception radius in cells.
    pub scope: usize,
    pub color: [u8; 3],
}

impl Default for Phenome {
    fn default() -> Self {
        Self {
            reaction_time: Duration::from_millis(1),
            speed: 1000,
            energy_capacity: 100,
            scope: 1,
            color: [128, 128, 128],
        }
    }
}

impl Phenome {
    /// Largest accepted `energy_capacity`. Keeps every energy sum and the
    /// reproduction threshold far from `i64` overflow.
    pub const MAX_ENERGY_CAPACITY: i64 = 1 << 52;

    /// Founder traits with a freshly drawn color.
    pub fn founder<R: Rng + ?Sized>(template: &Phenome, rng: &mut R) -> Self {
        Self {
            color: [
                rng.random_range(5..=252),
                rng.random_range(5..=252),
                rng.random_range(5..=252),
            ],
            ..template.clone()
        }
    }

    /// Sleep between two loop iterations: the slower of reaction time and speed cap.
    pub fn tick_interval(&self) -> Duration {
        if self.speed == 0 {
            return self.reaction_time;
        }
        let per_action = Duration::from_secs(1) / self.speed;
        self.reaction_time.max(per_action)
    }

    pub fn offspring(&self) -> Self {
        self.clone()
    }
}

/// Bounded random perturbation applied to a child's policy parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationRates {
    pub enabled: bool,
    /// Probability that each parameter is perturbed.
    pub point_rate: f32,
    /// Half-width of the uniform perturbation.
    pub point_scale: f32,
    /// Parameters are clamped to `[0, value_limit]` after perturbation.
    pub value_limit: f32,
}

impl Default for MutationRates {
    fn default() -> Self {
        Self {
            enabled: true,
            point_rate: 0.2,
            point_scale: 0.1,
            value_limit: 1.0,
        }
    }
}

impl MutationRates {
    pub const DISABLED: MutationRates = MutationRates {
        enabled: false,
        point_rate: 0.0,
        point_scale: 0.0,
        value_limit: 1.0,
    };

    pub fn is_valid(&self) -> bool {
        let finite = self.point_rate.is_finite()
            && self.point_scale.is_finite()
            && self.value_limit.is_finite();
        finite
            && (0.0..=1.0).contains(&self.point_rate)
            && self.point_scale >= 0.0
            && self.value_limit > 0.0
    }

    /// Perturb every value in place, keeping each within `[0, value_limit]`.
    pub fn perturb<R: Rng + ?Sized>(&self, rng: &mut R, values: &mut [f32]) {
        if !self.enabled || self.point_rate <= 0.0 {
            return;
        }
        for v in values {
            if rng.random::<f32>() < self.point_rate {
                let delta = if self.point_scale > 0.0 {
                    rng.random_range(-self.point_scale..=self.point_scale)
                } else {
                    0.0
                };
                *v = (*v + delta).clamp(0.0, self.value_limit);
            }
        }
    }
}
