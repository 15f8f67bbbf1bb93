//! Synthetic training label.
//!
//! There is no ground-truth win data, so the model learns this hand-made
//! desirability score (0–100). Weights and breakpoints are part of the
//! artifact contract: they are written into every artifact as a
//! `TargetSpec`, and changing any of them requires a `TARGET_SPEC_VERSION`
//! bump.

use serde::{Deserialize, Serialize};

use super::features::FeatureVector;

pub const TARGET_SPEC_VERSION: u32 = 1;

pub const EV_WEIGHT: f64 = 0.40;
pub const CONCENTRATION_WEIGHT: f64 = 0.30;
pub const ACTIVITY_WEIGHT: f64 = 0.15;
pub const FRESHNESS_WEIGHT: f64 = 0.10;
pub const AGE_PENALTY_WEIGHT: f64 = 0.05;

/// An ev of 2.0 or more saturates the ev component.
pub const EV_SCALE: f64 = 50.0;
/// Depletion below this is a slow or brand-new game.
pub const ACTIVITY_LOW_BREAK: f64 = 0.2;
/// Depletion above this is a game running out of top prizes.
pub const ACTIVITY_HIGH_BREAK: f64 = 0.6;
/// Freshness points lost per day since the last refresh.
pub const FRESHNESS_DECAY_PER_DAY: f64 = 10.0;
/// Games older than this start to accrue an age penalty.
pub const AGE_PENALTY_START_DAYS: f64 = 180.0;
pub const AGE_PENALTY_DAYS_PER_POINT: f64 = 10.0;
pub const AGE_PENALTY_CAP: f64 = 50.0;

/// Heuristic constants as recorded in artifact metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub version: u32,
    pub ev_weight: f64,
    pub concentration_weight: f64,
    pub activity_weight: f64,
    pub freshness_weight: f64,
    pub age_penalty_weight: f64,
    pub ev_scale: f64,
    pub activity_breaks: [f64; 2],
    pub freshness_decay_per_day: f64,
    pub age_penalty_start_days: f64,
    pub age_penalty_days_per_point: f64,
    pub age_penalty_cap: f64,
}

impl TargetSpec {
    pub fn current() -> Self {
        TargetSpec {
            version: TARGET_SPEC_VERSION,
            ev_weight: EV_WEIGHT,
            concentration_weight: CONCENTRATION_WEIGHT,
            activity_weight: ACTIVITY_WEIGHT,
            freshness_weight: FRESHNESS_WEIGHT,
            age_penalty_weight: AGE_PENALTY_WEIGHT,
            ev_scale: EV_SCALE,
            activity_breaks: [ACTIVITY_LOW_BREAK, ACTIVITY_HIGH_BREAK],
            freshness_decay_per_day: FRESHNESS_DECAY_PER_DAY,
            age_penalty_start_days: AGE_PENALTY_START_DAYS,
            age_penalty_days_per_point: AGE_PENALTY_DAYS_PER_POINT,
            age_penalty_cap: AGE_PENALTY_CAP,
        }
    }
}

/// Individual components, kept for reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetBreakdown {
    pub ev_score: f64,
    pub concentration_score: f64,
    pub activity_score: f64,
    pub freshness_score: f64,
    pub age_penalty: f64,
    pub target: f64,
}

pub fn ev_score(ev: f64) -> f64 {
    (ev * EV_SCALE).min(100.0)
}

/// Piecewise in depletion: rises 0→40 below the low break, 80→100 up to the
/// high break, then falls to 0.
pub fn activity_score(depletion_rate: f64) -> f64 {
    if depletion_rate < ACTIVITY_LOW_BREAK {
        depletion_rate * 200.0
    } else if depletion_rate < ACTIVITY_HIGH_BREAK {
        80.0 + (depletion_rate - ACTIVITY_LOW_BREAK) * 50.0
    } else {
        (100.0 - (depletion_rate - ACTIVITY_HIGH_BREAK) * 200.0).max(0.0)
    }
}

pub fn freshness_score(recency: f64) -> f64 {
    (100.0 - recency * FRESHNESS_DECAY_PER_DAY).max(0.0)
}

pub fn age_penalty(days_since_launch: f64) -> f64 {
    if days_since_launch > AGE_PENALTY_START_DAYS {
        ((days_since_launch - AGE_PENALTY_START_DAYS) / AGE_PENALTY_DAYS_PER_POINT)
            .min(AGE_PENALTY_CAP)
    } else {
        0.0
    }
}

pub fn target_breakdown(f: &FeatureVector) -> TargetBreakdown {
    let ev_score = ev_score(f.ev);
    let concentration_score = f.prize_concentration * 100.0;
    let activity_score = activity_score(f.depletion_rate);
    let freshness_score = freshness_score(f.recency);
    let age_penalty = age_penalty(f.days_since_launch);

    let raw = ev_score * EV_WEIGHT
        + concentration_score * CONCENTRATION_WEIGHT
        + activity_score * ACTIVITY_WEIGHT
        + freshness_score * FRESHNESS_WEIGHT
        - age_penalty * AGE_PENALTY_WEIGHT;

    TargetBreakdown {
        ev_score,
        concentration_score,
        activity_score,
        freshness_score,
        age_penalty,
        target: raw.clamp(0.0, 100.0),
    }
}

/// Training label in [0, 100].
pub fn synthesize_target(f: &FeatureVector) -> f64 {
    target_breakdown(f).target
}
