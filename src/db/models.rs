use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{OracleError, Result as OracleResult};

/// A scratch game as published by the record store. Every attribute except
/// the id may be missing; malformed values deserialize to `None` instead of
/// failing the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawGameRecord {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub game_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub game_number: Option<String>,
    /// Ticket price in dollars
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ticket_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub top_prize_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub remaining_top_prizes: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_top_prizes: Option<f64>,
    /// Launch date of the game
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub game_start_date: Option<Timestamp>,
    /// When the upstream scraper last refreshed this row
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_scraped_at: Option<Timestamp>,
    /// "1 in 3.52" or a bare number
    #[serde(default, deserialize_with = "lenient_odds")]
    pub overall_odds: Option<OddsField>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_active: Option<bool>,
}

impl RawGameRecord {
    /// Name used in log lines; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.game_name.as_deref().unwrap_or(&self.id)
    }
}

/// A timestamp as it arrives from upstream: either already structured or a
/// free-form ISO-ish string that is parsed at feature time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    At(DateTime<Utc>),
    Text(String),
}

/// Overall odds as published: a number or a "1 in N" string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OddsField {
    Number(f64),
    Text(String),
}

/// Discrete recommendation tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Neutral,
    Avoid,
    StrongAvoid,
}

impl Recommendation {
    pub const ALL: [Recommendation; 5] = [
        Recommendation::StrongBuy,
        Recommendation::Buy,
        Recommendation::Neutral,
        Recommendation::Avoid,
        Recommendation::StrongAvoid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "strong_buy",
            Recommendation::Buy => "buy",
            Recommendation::Neutral => "neutral",
            Recommendation::Avoid => "avoid",
            Recommendation::StrongAvoid => "strong_avoid",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Recommendation::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown recommendation '{}'", s))
    }
}

/// A scored game, keyed by (game_id, prediction_date, model_version).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub game_id: String,
    pub prediction_date: NaiveDate,
    /// Model score clamped to 0–100
    pub ai_score: f64,
    /// Simplified, non-calibrated estimate in 0–1
    pub win_probability: f64,
    /// The `ev` feature
    pub expected_value: f64,
    /// Data-quality confidence in 0–100
    #[serde(rename = "confidence_level")]
    pub confidence: f64,
    pub model_version: String,
    /// Feature names in model input order
    pub features_used: Vec<String>,
    pub recommendation: Recommendation,
    pub reasoning: String,
}

/// Aggregate view of one day's predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub prediction_date: Option<NaiveDate>,
    pub count: usize,
    pub mean_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    /// Count per tier, in `Recommendation::ALL` order
    pub tiers: Vec<(Recommendation, usize)>,
}

impl PredictionSummary {
    pub fn from_predictions(prediction_date: Option<NaiveDate>, predictions: &[Prediction]) -> Self {
        let scores = predictions.iter().map(|p| p.ai_score);
        let count = predictions.len();
        let mean_score = (count > 0).then(|| scores.clone().sum::<f64>() / count as f64);
        let min_score = scores.clone().reduce(f64::min);
        let max_score = scores.reduce(f64::max);
        let tiers = Recommendation::ALL
            .into_iter()
            .map(|r| (r, predictions.iter().filter(|p| p.recommendation == r).count()))
            .collect();
        PredictionSummary {
            prediction_date,
            count,
            mean_score,
            min_score,
            max_score,
            tiers,
        }
    }
}

/// Decode a JSON array of games (the scraper and REST store format),
/// skipping rows that do not deserialize.
pub fn games_from_json(raw: Value) -> OracleResult<Vec<RawGameRecord>> {
    let rows = match raw {
        Value::Array(rows) => rows,
        other => {
            return Err(OracleError::Persistence(format!(
                "expected an array of games, got {}",
                kind_of(&other)
            )))
        }
    };
    let games = rows
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match serde_json::from_value::<RawGameRecord>(row) {
            Ok(game) => Some(game),
            Err(e) => {
                warn!("Skipping game row {}: {}", i, e);
                None
            }
        })
        .collect();
    Ok(games)
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Lenient field decoding ─────────────────────────────────────────────────────

/// Interpret a JSON value as a finite number. Numeric strings are accepted.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "game id must be a string or number, got {}",
            other
        ))),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(value_as_f64(&Value::deserialize(d)?))
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Some(true),
            "false" | "f" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(Timestamp::Text(s)),
        _ => None,
    })
}

fn lenient_odds<'de, D: Deserializer<'de>>(d: D) -> Result<Option<OddsField>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().map(OddsField::Number),
        Value::String(s) => Some(OddsField::Text(s)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_tolerates_malformed_fields() {
        let raw = r#"{
            "id": 17,
            "game_name": "Lucky 7s",
            "ticket_price": "5",
            "top_prize_amount": "lots",
            "remaining_top_prizes": null,
            "total_top_prizes": 4,
            "game_start_date": 20240101,
            "last_scraped_at": "2024-06-01T08:00:00Z",
            "overall_odds": "1 in 3.52",
            "is_active": "t"
        }"#;
        let game: RawGameRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(game.id, "17");
        assert_eq!(game.ticket_price, Some(5.0));
        assert_eq!(game.top_prize_amount, None);
        assert_eq!(game.remaining_top_prizes, None);
        assert_eq!(game.total_top_prizes, Some(4.0));
        assert_eq!(game.game_start_date, None);
        assert_eq!(
            game.last_scraped_at,
            Some(Timestamp::Text("2024-06-01T08:00:00Z".into()))
        );
        assert_eq!(game.overall_odds, Some(OddsField::Text("1 in 3.52".into())));
        assert_eq!(game.is_active, Some(true));
    }

    #[test]
    fn test_raw_record_missing_fields_default_to_none() {
        let game: RawGameRecord = serde_json::from_str(r#"{"id": "g1"}"#).unwrap();
        assert_eq!(game.ticket_price, None);
        assert_eq!(game.overall_odds, None);
        assert_eq!(game.display_name(), "g1");
    }

    #[test]
    fn test_raw_record_requires_id() {
        assert!(serde_json::from_str::<RawGameRecord>(r#"{"game_name": "x"}"#).is_err());
        assert!(serde_json::from_str::<RawGameRecord>(r#"{"id": null}"#).is_err());
    }

    #[test]
    fn test_non_finite_numeric_strings_are_dropped() {
        assert_eq!(value_as_f64(&Value::String("NaN".into())), None);
        assert_eq!(value_as_f64(&Value::String("inf".into())), None);
        assert_eq!(value_as_f64(&Value::String(" 2.5 ".into())), Some(2.5));
    }

    #[test]
    fn test_recommendation_round_trips_through_str() {
        for r in Recommendation::ALL {
            assert_eq!(r.as_str().parse::<Recommendation>().unwrap(), r);
        }
        assert!("hold".parse::<Recommendation>().is_err());
        assert_eq!(
            serde_json::to_string(&Recommendation::StrongAvoid).unwrap(),
            "\"strong_avoid\""
        );
    }

    fn prediction(game_id: &str, ai_score: f64, recommendation: Recommendation) -> Prediction {
        Prediction {
            game_id: game_id.into(),
            prediction_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ai_score,
            win_probability: 0.01,
            expected_value: 0.8,
            confidence: 76.0,
            model_version: "v1.0".into(),
            features_used: vec!["ticket_price".into()],
            recommendation,
            reasoning: "Based on mathematical analysis".into(),
        }
    }

    #[test]
    fn test_summary_counts_tiers_and_scores() {
        let preds = vec![
            prediction("a", 80.0, Recommendation::StrongBuy),
            prediction("b", 50.0, Recommendation::Neutral),
            prediction("c", 20.0, Recommendation::Neutral),
        ];
        let s = PredictionSummary::from_predictions(None, &preds);
        assert_eq!(s.count, 3);
        assert_eq!(s.mean_score, Some(50.0));
        assert_eq!(s.min_score, Some(20.0));
        assert_eq!(s.max_score, Some(80.0));
        assert_eq!(s.tiers[0], (Recommendation::StrongBuy, 1));
        assert_eq!(s.tiers[2], (Recommendation::Neutral, 2));
        assert_eq!(s.tiers[4], (Recommendation::StrongAvoid, 0));

        let empty = PredictionSummary::from_predictions(None, &[]);
        assert_eq!(empty.count, 0);
        assert_eq!(empty.mean_score, None);
        assert_eq!(empty.max_score, None);
    }

    #[test]
    fn test_prediction_serializes_confidence_level() {
        let p = Prediction {
            game_id: "g1".into(),
            prediction_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ai_score: 61.5,
            win_probability: 0.01,
            expected_value: 0.8,
            confidence: 76.0,
            model_version: "v1.0".into(),
            features_used: vec!["ticket_price".into()],
            recommendation: Recommendation::Buy,
            reasoning: "Based on mathematical analysis".into(),
        };
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["confidence_level"], 76.0);
        assert_eq!(json["prediction_date"], "2024-06-01");
        assert_eq!(json["recommendation"], "buy");
    }

    #[test]
    fn test_unparseable_rows_are_skipped() {
        let raw = serde_json::json!([
            {"id": "a", "ticket_price": 5, "overall_odds": "1 in 4"},
            {"game_name": "no id"},
            {"id": 7, "ticket_price": "bad"}
        ]);
        let games = games_from_json(raw).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].id, "a");
        assert_eq!(games[1].id, "7");
        assert_eq!(games[1].ticket_price, None);
    }

    #[test]
    fn test_non_array_response_is_an_error() {
        let err = games_from_json(serde_json::json!({"message": "JWT expired"})).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }
}
