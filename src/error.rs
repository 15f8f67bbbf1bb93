use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    /// One record could not be scored. Recovered locally by skipping it.
    #[error("Data error for game {game_id}: {reason}")]
    Data { game_id: String, reason: String },

    /// Fatal: the run cannot proceed with the given inputs or artifact.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fatal: an artifact or prediction write/read failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Model fit error: {0}")]
    Fit(String),
}

pub type Result<T> = std::result::Result<T, OracleError>;

impl From<rusqlite::Error> for OracleError {
    fn from(e: rusqlite::Error) -> Self {
        OracleError::Persistence(format!("database: {}", e))
    }
}

impl From<std::io::Error> for OracleError {
    fn from(e: std::io::Error) -> Self {
        OracleError::Persistence(format!("io: {}", e))
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Persistence(format!("record store request: {}", e))
    }
}
