//! Momentum Scorer
//!
//! Turns a windowed delta into per-team attack, territory and pressure
//! indicators on a 0-100 scale, plus a weighted `overall` blend.

use serde::Serialize;

use super::window_tracker::WindowedDelta;
use crate::config::MomentumWeights;
use crate::types::{Stat, Team};

/// Momentum indicators for one team, each in [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MomentumIndicators {
    pub attack: f64,
    pub territory: f64,
    pub pressure: f64,
    pub overall: f64,
}

/// Indicators for both sides of a fixture
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TeamMomentum {
    pub home: MomentumIndicators,
    pub away: MomentumIndicators,
}

impl TeamMomentum {
    pub fn get(&self, team: Team) -> MomentumIndicators {
        match team {
            Team::Home => self.home,
            Team::Away => self.away,
        }
    }
}

/// Scores a windowed delta. Implementations must be pure.
pub trait MomentumScorer: Send + Sync {
    fn score(&self, delta: &WindowedDelta, window_mins: u32) -> TeamMomentum;
}

/// Clamp to [0, 100]; non-finite input scores zero
fn bounded(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Fixed linear-weight scorer
#[derive(Debug, Clone, Default)]
pub struct WeightedMomentumScorer {
    weights: MomentumWeights,
}

impl WeightedMomentumScorer {
    pub fn new(weights: MomentumWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &MomentumWeights {
        &self.weights
    }

    fn score_team(&self, delta: &WindowedDelta, window_mins: u32, team: Team) -> MomentumIndicators {
        let w = &self.weights;
        let v = |stat: Stat| delta.value(stat, team);
        let minutes = f64::from(window_mins.max(1));

        let attack = bounded(
            (v(Stat::DangerousAttacks) * w.dangerous_attacks
                + v(Stat::ShotsOnTarget) * w.shots_on_target
                + v(Stat::KeyPasses) * w.key_passes)
                / minutes
                * w.attack_scale,
        );

        let territory = if w.territory_divisor > 0.0 {
            bounded(
                (v(Stat::Possession) * w.possession
                    + v(Stat::SuccessfulDribbles) * w.successful_dribbles
                    + v(Stat::Territory) * w.territory)
                    / w.territory_divisor,
            )
        } else {
            0.0
        };

        let pressure = bounded(
            (v(Stat::ShotsBlocked) * w.shots_blocked + v(Stat::Crosses) * w.crosses) / minutes
                * w.pressure_scale,
        );

        let overall = bounded(
            attack * w.blend.attack + territory * w.blend.territory + pressure * w.blend.pressure,
        );

        MomentumIndicators {
            attack,
            territory,
            pressure,
            overall,
        }
    }
}

impl MomentumScorer for WeightedMomentumScorer {
    fn score(&self, delta: &WindowedDelta, window_mins: u32) -> TeamMomentum {
        TeamMomentum {
            home: self.score_team(delta, window_mins, Team::Home),
            away: self.score_team(delta, window_mins, Team::Away),
        }
    }
}
