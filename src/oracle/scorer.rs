//! Inference: score live games with a loaded artifact, derive a
//! data-quality confidence, map both to a recommendation tier and explain
//! it in a short sentence list.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use super::artifact::ModelArtifact;
use super::features::{engineer_features, FeatureVector};
use crate::db::models::{Prediction, Recommendation, RawGameRecord};
use crate::error::{OracleError, Result};

// ── Confidence ───────────────────────────────────────────────────────────────

pub const RECENCY_SAME_DAY: f64 = 1.0;
pub const RECENCY_WEEK: f64 = 7.0;
pub const RECENCY_MONTH: f64 = 30.0;

/// Freshness of the upstream snapshot, 20–100.
pub fn recency_factor(recency: f64) -> f64 {
    if recency <= RECENCY_SAME_DAY {
        100.0
    } else if recency <= RECENCY_WEEK {
        80.0
    } else if recency <= RECENCY_MONTH {
        50.0
    } else {
        20.0
    }
}

/// 100 when both prize counts are present and positive, else 30.
pub fn completeness_factor(f: &FeatureVector) -> f64 {
    if f.remaining_prizes > 0.0 && f.total_prizes > 0.0 {
        100.0
    } else {
        30.0
    }
}

/// Validation R² as a 0–100 factor.
pub fn model_quality_factor(validation_r2: f64) -> f64 {
    if validation_r2.is_finite() {
        (validation_r2 * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

pub fn confidence(f: &FeatureVector, validation_r2: f64) -> f64 {
    (recency_factor(f.recency) + completeness_factor(f) + model_quality_factor(validation_r2)) / 3.0
}

/// Simplified estimate derived from ev and prize concentration. Not a
/// calibrated probability.
pub fn win_probability(f: &FeatureVector) -> f64 {
    (f.ev * f.prize_concentration / 10.0).clamp(0.0, 1.0)
}

// ── Recommendation ───────────────────────────────────────────────────────────

/// Below this confidence every game is neutral.
pub const MIN_CONFIDENCE: f64 = 50.0;

/// Decision table, first match wins.
pub fn recommend(ai_score: f64, confidence: f64) -> Recommendation {
    if confidence < MIN_CONFIDENCE {
        Recommendation::Neutral
    } else if ai_score >= 75.0 && confidence >= 70.0 {
        Recommendation::StrongBuy
    } else if ai_score >= 60.0 && confidence >= 60.0 {
        Recommendation::Buy
    } else if ai_score >= 40.0 {
        Recommendation::Neutral
    } else if ai_score >= 25.0 && confidence >= 60.0 {
        Recommendation::Avoid
    } else if ai_score < 25.0 && confidence >= 70.0 {
        Recommendation::StrongAvoid
    } else {
        Recommendation::Neutral
    }
}

// ── Reasoning ────────────────────────────────────────────────────────────────

const EV_STRONG: f64 = 1.0;
const EV_DECENT: f64 = 0.7;
const EV_LOW: f64 = 0.3;
const CONCENTRATION_HIGH: f64 = 0.8;
const CONCENTRATION_MODERATE: f64 = 0.5;
const CONCENTRATION_LOW: f64 = 0.2;
const TURNOVER_LOW: f64 = 0.2;
const TURNOVER_HIGH: f64 = 0.6;
const DEPLETION_SLOW: f64 = 0.1;
const DEPLETION_ENDING: f64 = 0.8;
const RECENCY_FRESH: f64 = 1.0;
const RECENCY_STALE: f64 = 7.0;
const CONFIDENCE_NOTE_BELOW: f64 = 60.0;

pub const REASON_SEPARATOR: &str = " | ";
pub const GENERIC_REASON: &str = "Based on mathematical analysis";

pub fn reasons(f: &FeatureVector, confidence: f64) -> Vec<String> {
    let mut out = Vec::new();

    if f.ev > EV_STRONG {
        out.push(format!("Strong expected value ({:.2}x)", f.ev));
    } else if f.ev > EV_DECENT {
        out.push(format!("Decent expected value ({:.2}x)", f.ev));
    } else if f.ev < EV_LOW {
        out.push(format!("Low expected value ({:.2}x)", f.ev));
    }

    let pct = f.prize_concentration * 100.0;
    if f.prize_concentration > CONCENTRATION_HIGH {
        out.push(format!("High prize availability ({:.0}%)", pct));
    } else if f.prize_concentration > CONCENTRATION_MODERATE {
        out.push(format!("Moderate prize availability ({:.0}%)", pct));
    } else if f.prize_concentration < CONCENTRATION_LOW {
        out.push(format!("Low prize availability ({:.0}%)", pct));
    }

    if f.depletion_rate > TURNOVER_LOW && f.depletion_rate < TURNOVER_HIGH {
        out.push("Active game with good turnover".to_string());
    } else if f.depletion_rate < DEPLETION_SLOW {
        out.push("New or slow-moving game".to_string());
    } else if f.depletion_rate > DEPLETION_ENDING {
        out.push("Game nearing end of life".to_string());
    }

    if f.recency <= RECENCY_FRESH {
        out.push("Fresh data (updated today)".to_string());
    } else if f.recency > RECENCY_STALE {
        out.push(format!("Data is {} days old", f.recency as i64));
    }

    if confidence < CONFIDENCE_NOTE_BELOW {
        out.push(format!("Low confidence ({:.0}%) - limited data", confidence));
    }

    if out.is_empty() {
        out.push(GENERIC_REASON.to_string());
    }
    out
}

pub fn reasoning(f: &FeatureVector, confidence: f64) -> String {
    reasons(f, confidence).join(REASON_SEPARATOR)
}

// ── Scoring ──────────────────────────────────────────────────────────────────

fn round_to(x: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (x * scale).round() / scale
}

/// Score one game. A non-finite feature or model output is a `Data` error
/// for this record only.
pub fn score_game(
    artifact: &ModelArtifact,
    game: &RawGameRecord,
    as_of: DateTime<Utc>,
    prediction_date: NaiveDate,
) -> Result<Prediction> {
    let data_error = |reason: String| OracleError::Data {
        game_id: game.id.clone(),
        reason,
    };

    let features = engineer_features(game, as_of);
    let ordered = features.values_for(&artifact.feature_names).ok_or_else(|| {
        OracleError::Configuration(format!(
            "artifact {} names a feature the engineer does not produce",
            artifact.version
        ))
    })?;
    if let Some(pos) = ordered.iter().position(|v| !v.is_finite()) {
        return Err(data_error(format!(
            "feature {} is not finite",
            artifact.feature_names[pos]
        )));
    }

    let raw_score = artifact.raw_score(&ordered);
    if !raw_score.is_finite() {
        return Err(data_error(format!("model returned {}", raw_score)));
    }
    let ai_score = raw_score.clamp(0.0, 100.0);
    let confidence = confidence(&features, artifact.metrics.validation.r2);
    let recommendation = recommend(ai_score, confidence);

    debug!(
        "{}: raw {:.2} -> score {:.2}, confidence {:.1}, {}",
        game.display_name(),
        raw_score,
        ai_score,
        confidence,
        recommendation
    );

    Ok(Prediction {
        game_id: game.id.clone(),
        prediction_date,
        ai_score: round_to(ai_score, 2),
        win_probability: round_to(win_probability(&features), 6),
        expected_value: round_to(features.ev, 4),
        confidence: round_to(confidence, 2),
        model_version: artifact.version.clone(),
        features_used: artifact.feature_names.clone(),
        recommendation,
        reasoning: reasoning(&features, confidence),
    })
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub predictions: Vec<Prediction>,
    /// Ids of records that failed and were left out
    pub skipped: Vec<String>,
}

/// Score every game, skipping (and logging) records with data errors.
/// Configuration errors abort the batch.
pub fn score_batch(
    artifact: &ModelArtifact,
    games: &[RawGameRecord],
    as_of: DateTime<Utc>,
) -> Result<BatchOutcome> {
    let prediction_date = as_of.date_naive();
    let mut outcome = BatchOutcome::default();
    for game in games {
        match score_game(artifact, game, as_of, prediction_date) {
            Ok(p) => outcome.predictions.push(p),
            Err(e @ OracleError::Data { .. }) => {
                warn!("Skipping game {} ({}): {}", game.id, game.display_name(), e);
                outcome.skipped.push(game.id.clone());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcome)
}
