use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::models::{Prediction, PredictionSummary};
use crate::db::Database;
use crate::error::OracleError;
use crate::oracle::artifact::{load_artifact, ArtifactSummary};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub model_path: PathBuf,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Build the Axum router for the dashboard.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/health", get(health_handler))
        .route("/api/predictions", get(predictions_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/model", get(model_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn internal(e: OracleError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Default, Deserialize)]
pub struct PredictionQuery {
    /// Defaults to the most recent prediction date
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub date: Option<NaiveDate>,
    pub predictions: Vec<Prediction>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub predictions: i64,
    pub latest_prediction_date: Option<NaiveDate>,
}

async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /api/health
async fn health_handler(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok",
        predictions: state.db.count_predictions().map_err(internal)?,
        latest_prediction_date: state.db.latest_prediction_date().map_err(internal)?,
    }))
}

fn resolve_date(db: &Database, date: Option<NaiveDate>) -> Result<Option<NaiveDate>, (StatusCode, String)> {
    match date {
        Some(d) => Ok(Some(d)),
        None => db.latest_prediction_date().map_err(internal),
    }
}

/// GET /api/predictions?date=2024-06-10&limit=50
async fn predictions_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PredictionQuery>,
) -> ApiResult<PredictionsResponse> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let date = resolve_date(&state.db, q.date)?;
    let predictions = match date {
        Some(d) => state.db.list_predictions(d, limit).map_err(internal)?,
        None => Vec::new(),
    };
    Ok(Json(PredictionsResponse { date, predictions }))
}

/// GET /api/summary?date=2024-06-10
async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<PredictionQuery>,
) -> ApiResult<PredictionSummary> {
    match resolve_date(&state.db, q.date)? {
        Some(d) => state.db.prediction_summary(d).map(Json).map_err(internal),
        None => Ok(Json(PredictionSummary::from_predictions(None, &[]))),
    }
}

/// GET /api/model
///
/// 404 when no artifact has been written yet, 409 when the file exists but
/// does not match this build (stale or malformed).
async fn model_handler(State(state): State<Arc<AppState>>) -> ApiResult<ArtifactSummary> {
    if !state.model_path.is_file() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("no model artifact at {}", state.model_path.display()),
        ));
    }
    match load_artifact(&state.model_path) {
        Ok(artifact) => Ok(Json(artifact.summary())),
        Err(e @ OracleError::Configuration(_)) => Err((StatusCode::CONFLICT, e.to_string())),
        Err(e) => Err(internal(e)),
    }
}

/// Embedded single-file dashboard (HTML + CSS + JS)
const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Scratch Oracle</title>
<style>
  :root { --bg: #101418; --card: #1b2128; --border: #2c343d; --text: #e4e7ea; --muted: #8b96a3; }
  body { background: var(--bg); color: var(--text); font-family: system-ui, sans-serif; margin: 0; }
  header { padding: 1rem 2rem; border-bottom: 1px solid var(--border); display: flex; gap: 1rem; align-items: baseline; }
  header span { color: var(--muted); font-size: .9rem; }
  main { padding: 1.5rem 2rem; }
  #tiers { display: flex; gap: .75rem; margin-bottom: 1.5rem; flex-wrap: wrap; }
  .tier { background: var(--card); border: 1px solid var(--border); border-radius: 8px; padding: .6rem 1rem; }
  .tier b { display: block; font-size: 1.4rem; }
  table { width: 100%; border-collapse: collapse; background: var(--card); }
  th, td { text-align: left; padding: .5rem .75rem; border-bottom: 1px solid var(--border); font-size: .9rem; }
  th { color: var(--muted); font-weight: 600; }
  .strong_buy { color: #2fd27a; } .buy { color: #8fd14f; } .neutral { color: #c9c9c9; }
  .avoid { color: #f2a33a; } .strong_avoid { color: #ef5350; }
</style>
</head>
<body>
<header><h1>Scratch Oracle</h1><span id="meta">loading…</span></header>
<main>
  <div id="tiers"></div>
  <table>
    <thead><tr><th>Game</th><th>Score</th><th>Confidence</th><th>EV</th><th>Recommendation</th><th>Reasoning</th></tr></thead>
    <tbody id="rows"></tbody>
  </table>
</main>
<script>
const esc = v => String(v).replace(/[&<>"']/g,
  c => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;' })[c]);
const label = tier => esc(tier.replace('_', ' '));
async function load() {
  const [preds, summary] = await Promise.all([
    fetch('/api/predictions?limit=200').then(r => r.json()),
    fetch('/api/summary').then(r => r.json()),
  ]);
  document.getElementById('meta').textContent =
    preds.date ? `${preds.date} · ${summary.count} games` : 'no predictions yet';
  document.getElementById('tiers').innerHTML = summary.tiers
    .map(([tier, n]) => `<div class="tier ${esc(tier)}">${label(tier)}<b>${esc(n)}</b></div>`).join('');
  document.getElementById('rows').innerHTML = preds.predictions.map(p => `<tr>
      <td>${esc(p.game_id)}</td><td>${p.ai_score.toFixed(1)}</td><td>${p.confidence_level.toFixed(0)}</td>
      <td>${p.expected_value.toFixed(3)}</td><td class="${esc(p.recommendation)}">${label(p.recommendation)}</td>
      <td>${esc(p.reasoning)}</td></tr>`).join('');
}
load();
</script>
</body>
</html>
"#;
