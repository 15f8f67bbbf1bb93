use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::db::models::{games_from_json, PredictionSummary};
use crate::db::Database;
use crate::oracle::artifact::{load_artifact, save_artifact, ModelArtifact};
use crate::oracle::scorer::score_batch;
use crate::oracle::trainer::{train, TrainerSettings};
use crate::store::{GameFilter, RecordStore};

/// Fetch every game, fit a model and write the artifact to `model_path`.
pub async fn run_training(
    store: &dyn RecordStore,
    settings: &TrainerSettings,
    model_path: &Path,
    as_of: DateTime<Utc>,
) -> Result<ModelArtifact> {
    info!("Fetching training data from {}", store.name());
    let games = store
        .fetch_games(&GameFilter::all())
        .await
        .context("Failed to fetch games for training")?;
    info!("Fetched {} game(s)", games.len());

    let outcome = train(&games, as_of, settings).context("Training failed")?;
    save_artifact(&outcome.artifact, model_path).context("Failed to save model artifact")?;

    let m = &outcome.artifact.metrics;
    info!(
        "Model {} trained on {} samples ({} excluded): validation MAE {:.2}, R² {:.4}{}",
        outcome.artifact.version,
        m.n_samples,
        outcome.excluded,
        m.validation.mae,
        m.validation.r2,
        if m.overfitting { " (overfitting flagged)" } else { "" }
    );
    Ok(outcome.artifact)
}

#[derive(Debug, Clone)]
pub struct InferenceReport {
    pub summary: PredictionSummary,
    /// Rows sent to the store
    pub written: usize,
    /// Ids of games left out because of data errors
    pub skipped: Vec<String>,
}

/// Load the artifact, score the selected games and upsert the predictions
/// in one batch.
pub async fn run_inference(
    store: &dyn RecordStore,
    model_path: &Path,
    filter: GameFilter,
    as_of: DateTime<Utc>,
) -> Result<InferenceReport> {
    let artifact = load_artifact(model_path).context("Failed to load model artifact")?;
    info!(
        "Loaded model {} ({}, trained {})",
        artifact.version,
        artifact.framework,
        artifact.created_at.format("%Y-%m-%d %H:%M")
    );

    let games = store
        .fetch_games(&filter)
        .await
        .context("Failed to fetch games for scoring")?;
    if games.is_empty() {
        warn!("No games to score");
    }

    let batch = score_batch(&artifact, &games, as_of)?;
    let written = store
        .upsert_predictions(&batch.predictions)
        .await
        .with_context(|| format!("Failed to save predictions to {}", store.name()))?;

    let summary = PredictionSummary::from_predictions(Some(as_of.date_naive()), &batch.predictions);
    log_summary(&summary, batch.skipped.len());
    Ok(InferenceReport {
        summary,
        written,
        skipped: batch.skipped,
    })
}

fn log_summary(summary: &PredictionSummary, skipped: usize) {
    info!(
        "Scored {} game(s) ({} skipped) for {}",
        summary.count,
        skipped,
        summary
            .prediction_date
            .map(|d| d.to_string())
            .unwrap_or_default()
    );
    if let (Some(mean), Some(min), Some(max)) =
        (summary.mean_score, summary.min_score, summary.max_score)
    {
        info!("AI score mean {:.2}, min {:.2}, max {:.2}", mean, min, max);
    }
    for (tier, count) in &summary.tiers {
        info!("  {:<13} {}", tier.as_str(), count);
    }
}

/// Load a JSON array of game records into the local database.
pub fn run_import(db: &Database, file: &Path) -> Result<usize> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let raw: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let games = games_from_json(raw)?;
    let written = db.upsert_games(&games)?;
    info!("Imported {} game(s) from {}", written, file.display());
    Ok(written)
}

/// The instant features are computed at. A past date is scored as of the
/// end of that day; today or no date means now.
pub fn as_of_for(date: Option<NaiveDate>, now: DateTime<Utc>) -> DateTime<Utc> {
    date.and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|end| end.and_utc().min(now))
        .unwrap_or(now)
}
