use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info};
use url::Url;

use super::provider::{GameFilter, RecordStore};
use crate::db::models::{games_from_json, Prediction, RawGameRecord};
use crate::error::{OracleError, Result};

const CONFLICT_KEY: &str = "game_id,prediction_date,model_version";

/// Hosted record store speaking the PostgREST table API
/// (`/rest/v1/<table>`), authenticated with a service key.
#[derive(Clone)]
pub struct RestStore {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        let mut base_url = Url::parse(base_url)
            .map_err(|e| OracleError::Configuration(format!("invalid store URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(RestStore {
            http,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn games_url(&self, filter: &GameFilter) -> Result<Url> {
        let mut url = self.table_url("games")?;
        url.query_pairs_mut().append_pair("select", "*");
        if filter.active_only {
            url.query_pairs_mut().append_pair("is_active", "eq.true");
        }
        Ok(url)
    }

    fn predictions_url(&self) -> Result<Url> {
        let mut url = self.table_url("predictions")?;
        url.query_pairs_mut().append_pair("on_conflict", CONFLICT_KEY);
        Ok(url)
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| OracleError::Configuration(format!("invalid store URL: {}", e)))
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(OracleError::Persistence(format!(
        "{} failed with {}: {}",
        what, status, body
    )))
}

#[async_trait]
impl RecordStore for RestStore {
    async fn fetch_games(&self, filter: &GameFilter) -> Result<Vec<RawGameRecord>> {
        let url = self.games_url(filter)?;
        debug!("Fetching games from {}", url);

        let resp = self.authorized(self.http.get(url)).send().await?;
        let resp = ensure_success(resp, "games fetch").await?;
        let raw: serde_json::Value = resp.json().await?;
        let games = games_from_json(raw)?;
        info!("Fetched {} game(s) from {}", games.len(), self.name());
        Ok(games)
    }

    async fn upsert_predictions(&self, predictions: &[Prediction]) -> Result<usize> {
        if predictions.is_empty() {
            return Ok(0);
        }
        let url = self.predictions_url()?;
        let resp = self
            .authorized(self.http.post(url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(predictions)
            .send()
            .await?;
        ensure_success(resp, "predictions upsert").await?;
        Ok(predictions.len())
    }

    fn name(&self) -> &str {
        "REST store"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = RestStore::new("https://abc.example.co", "key").unwrap();
        assert_eq!(
            store.games_url(&GameFilter::all()).unwrap().as_str(),
            "https://abc.example.co/rest/v1/games?select=*"
        );
        assert_eq!(
            store.games_url(&GameFilter::active()).unwrap().as_str(),
            "https://abc.example.co/rest/v1/games?select=*&is_active=eq.true"
        );
        assert_eq!(
            store.predictions_url().unwrap().as_str(),
            "https://abc.example.co/rest/v1/predictions?on_conflict=game_id%2Cprediction_date%2Cmodel_version"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let store = RestStore::new("http://localhost:8000/proxy", "key").unwrap();
        assert_eq!(
            store.table_url("games").unwrap().as_str(),
            "http://localhost:8000/proxy/rest/v1/games"
        );
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        assert!(matches!(
            RestStore::new("not a url", "key"),
            Err(OracleError::Configuration(_))
        ));
    }
}
