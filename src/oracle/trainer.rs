use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::artifact::ModelArtifact;
use super::features::{engineer_features, FeatureVector, FEATURE_NAMES};
use super::metrics::{evaluate, ModelMetrics};
use super::regressor::{fit_ridge, Regressor, RidgeParams, TrainedModel};
use super::target::synthesize_target;
use crate::db::models::RawGameRecord;
use crate::error::{OracleError, Result};

/// Seed for the train/validation shuffle. Fixed so a retrain on the same
/// records reproduces the same split and the same model.
pub const SPLIT_SEED: u64 = 42;
pub const VALIDATION_FRACTION: f64 = 0.2;
pub const MIN_TRAINING_EXAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub game_id: String,
    pub features: FeatureVector,
    pub target: f64,
}

#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub model_version: String,
    pub ridge: RidgeParams,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    /// Records dropped for a missing or non-positive price or prize count,
    /// or for features that overflowed
    pub excluded: usize,
}

/// A record can be a training example only with a positive price and a
/// positive top-prize count. Missing values do not qualify.
pub fn is_trainable(game: &RawGameRecord) -> bool {
    game.ticket_price.is_some_and(|p| p > 0.0) && game.total_top_prizes.is_some_and(|t| t > 0.0)
}

/// Trainable records as labelled examples. A record whose features or
/// label are not finite is skipped with a warning.
pub fn build_training_set(games: &[RawGameRecord], as_of: DateTime<Utc>) -> Vec<TrainingExample> {
    games
        .iter()
        .filter(|g| is_trainable(g))
        .filter_map(|g| {
            let features = engineer_features(g, as_of);
            let target = synthesize_target(&features);
            if features.to_array().iter().any(|v| !v.is_finite()) || !target.is_finite() {
                warn!("Skipping game {} ({}): non-finite features", g.id, g.display_name());
                return None;
            }
            Some(TrainingExample {
                game_id: g.id.clone(),
                target,
                features,
            })
        })
        .collect()
}

/// Shuffle `0..n` with the fixed seed and cut off `ceil(n * 0.2)` indices
/// for validation. Returns `(train, validation)`.
pub fn split_indices(n: usize) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    idx.shuffle(&mut rng);
    let n_validation = ((n as f64) * VALIDATION_FRACTION).ceil() as usize;
    let train = idx.split_off(n_validation.min(n));
    (train, idx)
}

/// Engineer, label, split, fit and package. The artifact is returned, not
/// written; see `save_artifact`.
pub fn train(
    games: &[RawGameRecord],
    as_of: DateTime<Utc>,
    settings: &TrainerSettings,
) -> Result<TrainingOutcome> {
    let examples = build_training_set(games, as_of);
    let excluded = games.len() - examples.len();
    if excluded > 0 {
        info!("Excluded {} game(s) without usable price, prize or feature values", excluded);
    }
    if examples.len() < MIN_TRAINING_EXAMPLES {
        return Err(OracleError::Configuration(format!(
            "insufficient training data: {} valid example(s), need at least {}",
            examples.len(),
            MIN_TRAINING_EXAMPLES
        )));
    }

    let (lo, hi) = examples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
            (lo.min(e.target), hi.max(e.target))
        });
    info!(
        "Training set: {} samples, {} features, target range [{:.2}, {:.2}]",
        examples.len(),
        FEATURE_NAMES.len(),
        lo,
        hi
    );

    let (train_idx, validation_idx) = split_indices(examples.len());
    let rows = |idx: &[usize]| -> Vec<Vec<f64>> {
        idx.iter()
            .map(|&i| examples[i].features.to_array().to_vec())
            .collect()
    };
    let targets = |idx: &[usize]| -> Vec<f64> { idx.iter().map(|&i| examples[i].target).collect() };
    let (x_train, y_train) = (rows(&train_idx), targets(&train_idx));
    let (x_valid, y_valid) = (rows(&validation_idx), targets(&validation_idx));
    info!("Train size: {}, validation size: {}", x_train.len(), x_valid.len());

    let model = TrainedModel::Ridge(fit_ridge(&x_train, &y_train, settings.ridge)?);

    let predict_all = |xs: &[Vec<f64>]| -> Vec<f64> { xs.iter().map(|x| model.predict(x)).collect() };
    let train_metrics = evaluate(&predict_all(&x_train), &y_train);
    let validation_metrics = evaluate(&predict_all(&x_valid), &y_valid);
    let metrics = ModelMetrics::new(train_metrics, validation_metrics, FEATURE_NAMES.len());

    info!(
        "Train: MAE {:.2}, RMSE {:.2}, R² {:.4}",
        metrics.train.mae, metrics.train.rmse, metrics.train.r2
    );
    info!(
        "Validation: MAE {:.2}, RMSE {:.2}, R² {:.4}",
        metrics.validation.mae, metrics.validation.rmse, metrics.validation.r2
    );
    if metrics.overfitting {
        warn!(
            "Possible overfitting: train R² {:.4} exceeds validation R² {:.4} by more than 0.3",
            metrics.train.r2, metrics.validation.r2
        );
    }

    let mut importance: Vec<(&str, f64)> = FEATURE_NAMES
        .iter()
        .copied()
        .zip(model.importance())
        .collect();
    importance.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, weight) in &importance {
        debug!("  {:<22} {:.4}", name, weight);
    }

    Ok(TrainingOutcome {
        artifact: ModelArtifact::new(settings.model_version.clone(), model, metrics, as_of),
        excluded,
    })
}
