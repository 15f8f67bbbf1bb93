//! Feature engineering shared by training and inference.
//!
//! `engineer_features` is the only place raw game attributes become model
//! inputs. Trained artifacts record `FEATURE_NAMES` and
//! `FEATURE_SET_VERSION`; any change to a name, the order, or a formula here
//! must bump the version so stale artifacts are rejected on load.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::{OddsField, RawGameRecord, Timestamp};

/// Bumped whenever names, order or formulas below change.
pub const FEATURE_SET_VERSION: u32 = 1;

pub const FEATURE_COUNT: usize = 11;

/// Model input order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ticket_price",
    "ev",
    "prize_concentration",
    "depletion_rate",
    "days_since_launch",
    "recency",
    "odds",
    "velocity",
    "prize_to_price",
    "remaining_prizes",
    "total_prizes",
];

/// Day count used when a date is missing or unparseable.
pub const MISSING_DAYS: f64 = 999.0;

const SECONDS_PER_DAY: i64 = 86_400;

const DATETIME_FORMATS_WITH_OFFSET: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%#z",
];

const NAIVE_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub ticket_price: f64,
    pub ev: f64,
    pub prize_concentration: f64,
    pub depletion_rate: f64,
    pub days_since_launch: f64,
    pub recency: f64,
    pub odds: f64,
    /// Same value as `depletion_rate` until historical snapshots exist to
    /// derive a true rate of change.
    pub velocity: f64,
    pub prize_to_price: f64,
    pub remaining_prizes: f64,
    pub total_prizes: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.ticket_price,
            self.ev,
            self.prize_concentration,
            self.depletion_rate,
            self.days_since_launch,
            self.recency,
            self.odds,
            self.velocity,
            self.prize_to_price,
            self.remaining_prizes,
            self.total_prizes,
        ]
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = FEATURE_NAMES.iter().position(|n| *n == name)?;
        Some(self.to_array()[idx])
    }

    /// Values in the caller's order. `None` if a name is unknown.
    pub fn values_for(&self, names: &[String]) -> Option<Vec<f64>> {
        names.iter().map(|n| self.get(n)).collect()
    }
}

/// Map one raw game to its feature vector as of `as_of`.
///
/// Total over all inputs: every missing, non-finite or unparseable field
/// falls back to a fixed value instead of failing.
pub fn engineer_features(game: &RawGameRecord, as_of: DateTime<Utc>) -> FeatureVector {
    let ticket_price = game.ticket_price.unwrap_or(0.0);
    let top_prize = game.top_prize_amount.unwrap_or(0.0);
    let remaining_prizes = game.remaining_top_prizes.unwrap_or(0.0);
    let raw_total = game.total_top_prizes.unwrap_or(0.0);

    let prize_concentration = if raw_total > 0.0 {
        remaining_prizes / raw_total
    } else {
        0.0
    };
    let prize_to_price = if ticket_price > 0.0 {
        top_prize / ticket_price
    } else {
        0.0
    };
    let ev = prize_to_price * prize_concentration;
    let depletion_rate = 1.0 - prize_concentration;

    FeatureVector {
        ticket_price,
        ev,
        prize_concentration,
        depletion_rate,
        days_since_launch: days_since(game.game_start_date.as_ref(), as_of),
        recency: days_since(game.last_scraped_at.as_ref(), as_of),
        odds: parse_odds(game.overall_odds.as_ref()),
        velocity: depletion_rate,
        prize_to_price,
        remaining_prizes,
        total_prizes: if raw_total > 0.0 { raw_total } else { 1.0 },
    }
}

/// Parse published overall odds.
///
/// `"1 in 4"` (any case) yields 0.25. A bare number passes through
/// unchanged. Anything else, including a zero or negative denominator,
/// yields 0.
pub fn parse_odds(odds: Option<&OddsField>) -> f64 {
    let value = match odds {
        None => None,
        Some(OddsField::Number(n)) => Some(*n),
        Some(OddsField::Text(s)) => parse_odds_text(s),
    };
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn parse_odds_text(s: &str) -> Option<f64> {
    let lower = s.to_ascii_lowercase();
    match lower.find("in") {
        Some(idx) => {
            let denominator: f64 = lower[idx + 2..].trim().parse().ok()?;
            if denominator > 0.0 {
                Some(1.0 / denominator)
            } else {
                Some(0.0)
            }
        }
        None => s.trim().parse().ok(),
    }
}

/// Parse a structured or ISO-ish timestamp. Offset-less values are UTC.
pub fn parse_timestamp(ts: &Timestamp) -> Option<DateTime<Utc>> {
    let s = match ts {
        Timestamp::At(at) => return Some(*at),
        Timestamp::Text(s) => s.trim(),
    };
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS_WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

/// Whole days elapsed between `ts` and `as_of`, floored. Missing or
/// unparseable timestamps count as `MISSING_DAYS`.
pub fn days_since(ts: Option<&Timestamp>, as_of: DateTime<Utc>) -> f64 {
    match ts.and_then(parse_timestamp) {
        Some(at) => (as_of - at).num_seconds().div_euclid(SECONDS_PER_DAY) as f64,
        None => MISSING_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn game() -> RawGameRecord {
        RawGameRecord {
            id: "g1".into(),
            game_name: Some("Lucky 7s".into()),
            ticket_price: Some(5.0),
            top_prize_amount: Some(10.0),
            remaining_top_prizes: Some(3.0),
            total_top_prizes: Some(4.0),
            game_start_date: Some(Timestamp::Text("2024-06-01".into())),
            last_scraped_at: Some(Timestamp::Text("2024-06-10T06:00:00Z".into())),
            overall_odds: Some(OddsField::Text("1 in 4".into())),
            ..Default::default()
        }
    }

    #[test]
    fn test_engineer_features_complete_record() {
        let f = engineer_features(&game(), as_of());
        assert_relative_eq!(f.ticket_price, 5.0);
        assert_relative_eq!(f.prize_concentration, 0.75);
        assert_relative_eq!(f.prize_to_price, 2.0);
        assert_relative_eq!(f.ev, 1.5);
        assert_relative_eq!(f.depletion_rate, 0.25);
        assert_relative_eq!(f.velocity, f.depletion_rate);
        assert_relative_eq!(f.days_since_launch, 9.0);
        assert_relative_eq!(f.recency, 0.0);
        assert_relative_eq!(f.odds, 0.25);
        assert_relative_eq!(f.remaining_prizes, 3.0);
        assert_relative_eq!(f.total_prizes, 4.0);
    }

    #[test]
    fn test_zero_or_negative_price_zeroes_ratio_features() {
        for price in [Some(0.0), Some(-2.0), None] {
            let mut g = game();
            g.ticket_price = price;
            let f = engineer_features(&g, as_of());
            assert_eq!(f.ev, 0.0);
            assert_eq!(f.prize_to_price, 0.0);
        }
    }

    #[test]
    fn test_zero_total_prizes_falls_back_to_one() {
        let mut g = game();
        g.total_top_prizes = Some(0.0);
        let f = engineer_features(&g, as_of());
        assert_eq!(f.total_prizes, 1.0);
        assert_eq!(f.prize_concentration, 0.0);
        assert_eq!(f.depletion_rate, 1.0);
        assert_eq!(f.ev, 0.0);

        g.total_top_prizes = None;
        assert_eq!(engineer_features(&g, as_of()).total_prizes, 1.0);
    }

    #[test]
    fn test_empty_record_uses_every_fallback() {
        let g = RawGameRecord {
            id: "empty".into(),
            ..Default::default()
        };
        let f = engineer_features(&g, as_of());
        assert_eq!(
            f.to_array(),
            [0.0, 0.0, 0.0, 1.0, 999.0, 999.0, 0.0, 1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_parse_odds_cases() {
        let text = |s: &str| OddsField::Text(s.to_string());
        assert_relative_eq!(parse_odds(Some(&text("1 in 4"))), 0.25);
        assert_relative_eq!(parse_odds(Some(&text("1 IN 3.5"))), 1.0 / 3.5);
        assert_eq!(parse_odds(Some(&text("1 in 0"))), 0.0);
        assert_eq!(parse_odds(Some(&text("1 in -3"))), 0.0);
        assert_eq!(parse_odds(Some(&text("garbage"))), 0.0);
        assert_eq!(parse_odds(Some(&text("1 in"))), 0.0);
        assert_eq!(parse_odds(Some(&text(""))), 0.0);
        assert_eq!(parse_odds(None), 0.0);
        assert_relative_eq!(parse_odds(Some(&text("0.25"))), 0.25);
        assert_relative_eq!(parse_odds(Some(&OddsField::Number(3.52))), 3.52);
        assert_eq!(parse_odds(Some(&OddsField::Number(f64::NAN))), 0.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
        for s in [
            "2024-06-01T08:30:00Z",
            "2024-06-01T08:30:00+00:00",
            "2024-06-01 08:30:00+00",
            "2024-06-01T08:30:00.000000",
            "2024-06-01 08:30:00",
            "2024-06-01T10:30:00+02:00",
        ] {
            assert_eq!(
                parse_timestamp(&Timestamp::Text(s.into())),
                Some(expected),
                "format {}",
                s
            );
        }
        let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&Timestamp::Text("2024-06-01".into())), Some(midnight));
        assert_eq!(parse_timestamp(&Timestamp::Text("06/01/2024".into())), Some(midnight));
        assert_eq!(parse_timestamp(&Timestamp::At(expected)), Some(expected));
        assert_eq!(parse_timestamp(&Timestamp::Text("soon".into())), None);
        assert_eq!(parse_timestamp(&Timestamp::Text("  ".into())), None);
    }

    #[test]
    fn test_days_since_floors_and_falls_back() {
        let now = as_of();
        let ts = |s: &str| Timestamp::Text(s.to_string());
        assert_eq!(days_since(Some(&ts("2024-06-09T13:00:00Z")), now), 0.0);
        assert_eq!(days_since(Some(&ts("2024-06-09T11:00:00Z")), now), 1.0);
        assert_eq!(days_since(Some(&ts("2024-06-10T18:00:00Z")), now), -1.0);
        assert_eq!(days_since(Some(&ts("not a date")), now), MISSING_DAYS);
        assert_eq!(days_since(None, now), MISSING_DAYS);
    }

    #[test]
    fn test_values_for_follows_requested_order() {
        let f = engineer_features(&game(), as_of());
        let names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        assert_eq!(f.values_for(&names).unwrap(), f.to_array().to_vec());

        let reversed = vec!["total_prizes".to_string(), "ticket_price".to_string()];
        assert_eq!(f.values_for(&reversed).unwrap(), vec![4.0, 5.0]);
        assert!(f.values_for(&["bogus".to_string()]).is_none());
    }

    #[test]
    fn test_same_input_same_vector() {
        let g = game();
        assert_eq!(engineer_features(&g, as_of()), engineer_features(&g, as_of()));
    }
}
