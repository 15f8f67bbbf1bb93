use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

mod config;
mod dashboard;
mod db;
mod error;
mod oracle;
mod pipeline;
mod store;

use config::{Command, Config, StoreLocation};
use dashboard::AppState;
use db::Database;
use oracle::regressor::RidgeParams;
use oracle::trainer::TrainerSettings;
use store::{GameFilter, RecordStore, RestStore};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;

    match &config.command {
        Command::Train => {
            let store = open_store(&config)?;
            let settings = TrainerSettings {
                model_version: config.model_version.clone(),
                ridge: RidgeParams {
                    penalty: config.ridge_penalty,
                    ..RidgeParams::default()
                },
            };
            pipeline::run_training(store.as_ref(), &settings, &config.model_path, Utc::now())
                .await?;
        }
        Command::Predict { date, all_games } => {
            let store = open_store(&config)?;
            let filter = if *all_games {
                GameFilter::all()
            } else {
                GameFilter::active()
            };
            let as_of = pipeline::as_of_for(*date, Utc::now());
            let report =
                pipeline::run_inference(store.as_ref(), &config.model_path, filter, as_of).await?;
            info!(
                "Saved {} of {} prediction(s) for {} to {}",
                report.written,
                report.summary.count,
                as_of.date_naive(),
                store.name()
            );
            if !report.skipped.is_empty() {
                warn!("Skipped games: {}", report.skipped.join(", "));
            }
        }
        Command::Import { file } => {
            let db = open_database(&config)?;
            pipeline::run_import(&db, file)?;
        }
        Command::Serve => {
            let db = open_database(&config)?;
            let app = dashboard::router(AppState {
                db,
                model_path: config.model_path.clone(),
            });
            let addr: SocketAddr = config
                .dashboard_addr
                .parse()
                .with_context(|| format!("Invalid DASHBOARD_ADDR {}", config.dashboard_addr))?;
            info!("Dashboard listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}

fn open_database(config: &Config) -> Result<Database> {
    match config.store_location()? {
        StoreLocation::Local { path } => {
            let db = Database::open(&path)
                .with_context(|| format!("Failed to open database {}", path))?;
            info!("Database opened: {}", path);
            Ok(db)
        }
        StoreLocation::Remote { .. } => anyhow::bail!("this command needs DATABASE_PATH"),
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn RecordStore>> {
    Ok(match config.store_location()? {
        StoreLocation::Local { .. } => Arc::new(open_database(config)?),
        StoreLocation::Remote { url, api_key } => {
            info!("Using record store at {}", url);
            Arc::new(RestStore::new(&url, &api_key)?)
        }
    })
}
