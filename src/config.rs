use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Scratch-ticket model trainer and daily predictor
#[derive(Parser, Debug, Clone)]
#[command(name = "scratch-oracle", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Local SQLite database path (local record store)
    #[arg(long, env = "DATABASE_PATH", global = true)]
    pub database_path: Option<String>,

    /// Base URL of the hosted record store (PostgREST table API)
    #[arg(long, env = "STORE_URL", global = true)]
    pub store_url: Option<String>,

    /// Service key for the hosted record store
    #[arg(long, env = "STORE_API_KEY", global = true, hide_env_values = true)]
    pub store_api_key: Option<String>,

    /// Model artifact location
    #[arg(
        long,
        env = "MODEL_PATH",
        default_value = "models/lottery_predictor.json",
        global = true
    )]
    pub model_path: PathBuf,

    /// Version stamped on trained artifacts and their predictions
    #[arg(long, env = "MODEL_VERSION", default_value = "v1.0", global = true)]
    pub model_version: String,

    /// L2 penalty for the ridge fit
    #[arg(long, env = "RIDGE_PENALTY", default_value = "0.01", global = true)]
    pub ridge_penalty: f64,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080", global = true)]
    pub dashboard_addr: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fit a model on every stored game and save the artifact
    Train,
    /// Score games with the saved artifact and upsert the predictions
    Predict {
        /// Prediction date (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Score inactive games too
        #[arg(long)]
        all_games: bool,
    },
    /// Load a JSON array of game records into the local database
    Import {
        file: PathBuf,
    },
    /// Serve the predictions API over the local database
    Serve,
}

/// Where game records come from and predictions go.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    Local { path: String },
    Remote { url: String, api_key: String },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        let store = self.store_location()?;
        if self.model_version.trim().is_empty() {
            anyhow::bail!("MODEL_VERSION must not be empty");
        }
        if !self.ridge_penalty.is_finite() || self.ridge_penalty < 0.0 {
            anyhow::bail!("ridge_penalty must be a finite, non-negative number");
        }
        if let Command::Predict { date: Some(date), .. } = &self.command {
            let today = Utc::now().date_naive();
            if *date > today {
                anyhow::bail!("--date {} is in the future (today is {})", date, today);
            }
        }
        if matches!(self.command, Command::Import { .. } | Command::Serve)
            && !matches!(store, StoreLocation::Local { .. })
        {
            anyhow::bail!("import and serve work on the local database; set DATABASE_PATH");
        }
        Ok(())
    }

    /// Exactly one record store must be configured.
    pub fn store_location(&self) -> anyhow::Result<StoreLocation> {
        let nonempty = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);
        match (
            nonempty(&self.database_path),
            nonempty(&self.store_url),
            nonempty(&self.store_api_key),
        ) {
            (Some(_), Some(_), _) => anyhow::bail!(
                "both DATABASE_PATH and STORE_URL are set; configure exactly one record store"
            ),
            (Some(path), None, _) => Ok(StoreLocation::Local { path }),
            (None, Some(url), Some(api_key)) => Ok(StoreLocation::Remote { url, api_key }),
            (None, Some(_), None) => anyhow::bail!("STORE_API_KEY is required with STORE_URL"),
            (None, None, _) => anyhow::bail!(
                "no record store configured; set DATABASE_PATH or STORE_URL and STORE_API_KEY"
            ),
        }
    }
}
