use async_trait::async_trait;

use crate::db::models::{Prediction, RawGameRecord};
use crate::db::Database;
use crate::error::Result;

/// Which games a fetch should return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameFilter {
    /// Only games flagged `is_active = true`
    pub active_only: bool,
}

impl GameFilter {
    pub fn all() -> Self {
        GameFilter { active_only: false }
    }

    pub fn active() -> Self {
        GameFilter { active_only: true }
    }
}

/// Source of game records and sink for predictions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_games(&self, filter: &GameFilter) -> Result<Vec<RawGameRecord>>;

    /// Upsert on (game_id, prediction_date, model_version). Returns the
    /// number of rows sent.
    async fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<usize>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl RecordStore for Database {
    async fn fetch_games(&self, filter: &GameFilter) -> Result<Vec<RawGameRecord>> {
        self.list_games(filter.active_only)
    }

    async fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<usize> {
        Database::upsert_predictions(self, predictions)
    }

    fn name(&self) -> &str {
        "SQLite"
    }
}
