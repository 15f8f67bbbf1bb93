use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{OracleError, Result};

pub mod models;
use models::*;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.lock()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| OracleError::Persistence("database mutex poisoned".into()))
    }

    // ── Games ─────────────────────────────────────────────────────────────────

    /// Insert or refresh game records by id. Returns the number written.
    pub fn upsert_games(&self, games: &[RawGameRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO games (
                    id, game_name, game_number, ticket_price, top_prize_amount,
                    remaining_top_prizes, total_top_prizes, game_start_date,
                    last_scraped_at, overall_odds, is_active
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                 ON CONFLICT(id) DO UPDATE SET
                    game_name=excluded.game_name,
                    game_number=excluded.game_number,
                    ticket_price=excluded.ticket_price,
                    top_prize_amount=excluded.top_prize_amount,
                    remaining_top_prizes=excluded.remaining_top_prizes,
                    total_top_prizes=excluded.total_top_prizes,
                    game_start_date=excluded.game_start_date,
                    last_scraped_at=excluded.last_scraped_at,
                    overall_odds=excluded.overall_odds,
                    is_active=excluded.is_active",
            )?;
            for g in games {
                stmt.execute(params![
                    g.id,
                    g.game_name,
                    g.game_number,
                    g.ticket_price,
                    g.top_prize_amount,
                    g.remaining_top_prizes,
                    g.total_top_prizes,
                    g.game_start_date.as_ref().map(timestamp_to_sql),
                    g.last_scraped_at.as_ref().map(timestamp_to_sql),
                    g.overall_odds.as_ref().map(odds_to_sql),
                    g.is_active,
                ])?;
            }
        }
        tx.commit()?;
        Ok(games.len())
    }

    /// All games, or only those flagged active.
    pub fn list_games(&self, active_only: bool) -> Result<Vec<RawGameRecord>> {
        let conn = self.lock()?;
        let sql = if active_only {
            "SELECT id, game_name, game_number, ticket_price, top_prize_amount,
                    remaining_top_prizes, total_top_prizes, game_start_date,
                    last_scraped_at, overall_odds, is_active
             FROM games WHERE is_active = 1 ORDER BY id"
        } else {
            "SELECT id, game_name, game_number, ticket_price, top_prize_amount,
                    remaining_top_prizes, total_top_prizes, game_start_date,
                    last_scraped_at, overall_odds, is_active
             FROM games ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let games = stmt
            .query_map([], map_game)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(games)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Upsert a batch on (game_id, prediction_date, model_version) in one
    /// transaction. Returns the number written.
    pub fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO predictions (
                    game_id, prediction_date, ai_score, win_probability,
                    expected_value, confidence_level, model_version,
                    features_used, recommendation, reasoning
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
                 ON CONFLICT(game_id, prediction_date, model_version) DO UPDATE SET
                    ai_score=excluded.ai_score,
                    win_probability=excluded.win_probability,
                    expected_value=excluded.expected_value,
                    confidence_level=excluded.confidence_level,
                    features_used=excluded.features_used,
                    recommendation=excluded.recommendation,
                    reasoning=excluded.reasoning",
            )?;
            for p in predictions {
                let features_used = serde_json::to_string(&p.features_used)
                    .map_err(|e| OracleError::Persistence(format!("encode features_used: {}", e)))?;
                stmt.execute(params![
                    p.game_id,
                    p.prediction_date,
                    p.ai_score,
                    p.win_probability,
                    p.expected_value,
                    p.confidence,
                    p.model_version,
                    features_used,
                    p.recommendation.as_str(),
                    p.reasoning,
                ])?;
            }
        }
        tx.commit()?;
        Ok(predictions.len())
    }

    /// Predictions for one day, best score first.
    pub fn list_predictions(&self, date: NaiveDate, limit: i64) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT game_id, prediction_date, ai_score, win_probability,
                    expected_value, confidence_level, model_version,
                    features_used, recommendation, reasoning
             FROM predictions WHERE prediction_date = ?1
             ORDER BY ai_score DESC, game_id LIMIT ?2",
        )?;
        let predictions = stmt
            .query_map(params![date, limit], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(predictions)
    }

    pub fn latest_prediction_date(&self) -> Result<Option<NaiveDate>> {
        let conn = self.lock()?;
        let date = conn
            .query_row("SELECT MAX(prediction_date) FROM predictions", [], |r| {
                r.get::<_, Option<NaiveDate>>(0)
            })
            .optional()?
            .flatten();
        Ok(date)
    }

    pub fn prediction_summary(&self, date: NaiveDate) -> Result<PredictionSummary> {
        let predictions = self.list_predictions(date, i64::MAX)?;
        Ok(PredictionSummary::from_predictions(Some(date), &predictions))
    }

    pub fn count_predictions(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM predictions", [], |r| r.get(0))?)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn timestamp_to_sql(ts: &Timestamp) -> String {
    match ts {
        Timestamp::At(at) => at.to_rfc3339(),
        Timestamp::Text(s) => s.clone(),
    }
}

fn odds_to_sql(odds: &OddsField) -> Value {
    match odds {
        OddsField::Number(n) => Value::Real(*n),
        OddsField::Text(s) => Value::Text(s.clone()),
    }
}

/// Columns are read as dynamic values so a row written by another tool with
/// unexpected types still loads; bad values become `None`.
fn value_to_f64(v: Value) -> Option<f64> {
    let n = match v {
        Value::Integer(i) => Some(i as f64),
        Value::Real(r) => Some(r),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Null | Value::Blob(_) => None,
    };
    n.filter(|x| x.is_finite())
}

fn value_to_text(v: Value) -> Option<String> {
    match v {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn map_game(row: &rusqlite::Row) -> rusqlite::Result<RawGameRecord> {
    let f = |i: usize| -> rusqlite::Result<Option<f64>> { Ok(value_to_f64(row.get(i)?)) };
    let t = |i: usize| -> rusqlite::Result<Option<String>> { Ok(value_to_text(row.get(i)?)) };
    let overall_odds = match row.get::<_, Value>(9)? {
        Value::Integer(i) => Some(OddsField::Number(i as f64)),
        Value::Real(r) => Some(OddsField::Number(r)),
        Value::Text(s) => Some(OddsField::Text(s)),
        Value::Null | Value::Blob(_) => None,
    };
    let is_active = match row.get::<_, Value>(10)? {
        Value::Integer(i) => Some(i != 0),
        _ => None,
    };
    Ok(RawGameRecord {
        id: row.get(0)?,
        game_name: t(1)?,
        game_number: t(2)?,
        ticket_price: f(3)?,
        top_prize_amount: f(4)?,
        remaining_top_prizes: f(5)?,
        total_top_prizes: f(6)?,
        game_start_date: t(7)?.map(Timestamp::Text),
        last_scraped_at: t(8)?.map(Timestamp::Text),
        overall_odds,
        is_active,
    })
}

fn conversion_error(idx: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, reason.into())
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    let features_used: String = row.get(7)?;
    let features_used = serde_json::from_str(&features_used)
        .map_err(|e| conversion_error(7, format!("features_used: {}", e)))?;
    let recommendation: String = row.get(8)?;
    let recommendation = recommendation
        .parse::<Recommendation>()
        .map_err(|e| conversion_error(8, e))?;
    Ok(Prediction {
        game_id: row.get(0)?,
        prediction_date: row.get(1)?,
        ai_score: row.get(2)?,
        win_probability: row.get(3)?,
        expected_value: row.get(4)?,
        confidence: row.get(5)?,
        model_version: row.get(6)?,
        features_used,
        recommendation,
        reasoning: row.get(9)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS games (
    id                   TEXT    PRIMARY KEY,
    game_name            TEXT,
    game_number          TEXT,
    ticket_price         REAL,
    top_prize_amount     REAL,
    remaining_top_prizes REAL,
    total_top_prizes     REAL,
    game_start_date      TEXT,
    last_scraped_at      TEXT,
    overall_odds,
    is_active            INTEGER
);

CREATE TABLE IF NOT EXISTS predictions (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    game_id          TEXT    NOT NULL,
    prediction_date  TEXT    NOT NULL,
    ai_score         REAL    NOT NULL,
    win_probability  REAL    NOT NULL,
    expected_value   REAL    NOT NULL,
    confidence_level REAL    NOT NULL,
    model_version    TEXT    NOT NULL,
    features_used    TEXT    NOT NULL,
    recommendation   TEXT    NOT NULL,
    reasoning        TEXT    NOT NULL,
    UNIQUE (game_id, prediction_date, model_version)
);

CREATE INDEX IF NOT EXISTS idx_games_active ON games(is_active);
CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(prediction_date);
"#;
