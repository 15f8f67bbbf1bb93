//! Versioned model artifact and its on-disk form.
//!
//! Artifacts are JSON. Writes go to a sibling `.tmp` file that is synced and
//! then renamed over the target, so a reader sees either the previous
//! artifact or the complete new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::features::{FEATURE_NAMES, FEATURE_SET_VERSION};
use super::metrics::ModelMetrics;
use super::regressor::{Regressor, TrainedModel};
use super::target::TargetSpec;
use crate::error::{OracleError, Result};

/// On-disk layout version of [`ModelArtifact`].
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Semantic model version, e.g. "v1.0". Part of the prediction key.
    pub version: String,
    pub framework: String,
    pub created_at: DateTime<Utc>,
    pub feature_set_version: u32,
    /// Model input order
    pub feature_names: Vec<String>,
    pub target_spec: TargetSpec,
    pub metrics: ModelMetrics,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(
        version: impl Into<String>,
        model: TrainedModel,
        metrics: ModelMetrics,
        created_at: DateTime<Utc>,
    ) -> Self {
        ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            version: version.into(),
            framework: model.framework().to_string(),
            created_at,
            feature_set_version: FEATURE_SET_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            target_spec: TargetSpec::current(),
            metrics,
            model,
        }
    }

    /// Fail if this artifact was built for a different feature engineer or
    /// artifact layout than the one compiled into this binary.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(OracleError::Configuration(format!(
                "artifact format version {} is not supported (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if self.feature_set_version != FEATURE_SET_VERSION {
            return Err(OracleError::Configuration(format!(
                "artifact was trained with feature set v{}, engineer is v{}; retrain the model",
                self.feature_set_version, FEATURE_SET_VERSION
            )));
        }
        let matches = self.feature_names.len() == FEATURE_NAMES.len()
            && self
                .feature_names
                .iter()
                .zip(FEATURE_NAMES)
                .all(|(a, b)| a == b);
        if !matches {
            return Err(OracleError::Configuration(format!(
                "artifact expects features [{}] but the engineer produces [{}]; retrain the model",
                self.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            )));
        }
        Ok(())
    }

    /// Raw model output for a vector already in `feature_names` order.
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.model.predict(features)
    }

    /// Metadata without the fitted parameters, for display.
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            version: self.version.clone(),
            framework: self.framework.clone(),
            created_at: self.created_at,
            feature_set_version: self.feature_set_version,
            feature_names: self.feature_names.clone(),
            target_spec: self.target_spec.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub version: String,
    pub framework: String,
    pub created_at: DateTime<Utc>,
    pub feature_set_version: u32,
    pub feature_names: Vec<String>,
    pub target_spec: TargetSpec,
    pub metrics: ModelMetrics,
}

/// Write `artifact` to `path`, replacing any previous file atomically.
pub fn save_artifact(artifact: &ModelArtifact, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            OracleError::Persistence(format!("create {}: {}", dir.display(), e))
        })?;
    }
    let json = serde_json::to_vec_pretty(artifact)
        .map_err(|e| OracleError::Persistence(format!("encode artifact: {}", e)))?;

    let tmp = tmp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(OracleError::Persistence(format!(
            "write artifact {}: {}",
            path.display(),
            e
        )));
    }

    info!(
        "Saved model {} ({} bytes) to {}",
        artifact.version,
        json.len(),
        path.display()
    );
    Ok(())
}

/// Read and validate an artifact. A stale feature list is a configuration
/// error, never silently accepted.
pub fn load_artifact(path: &Path) -> Result<ModelArtifact> {
    let bytes = fs::read(path).map_err(|e| {
        OracleError::Configuration(format!(
            "model artifact {} not readable: {}; train a model first",
            path.display(),
            e
        ))
    })?;
    let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
        OracleError::Configuration(format!("model artifact {} is malformed: {}", path.display(), e))
    })?;
    artifact.validate()?;
    Ok(artifact)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oracle::metrics::SplitMetrics;
    use crate::oracle::regressor::LinearModel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

    /// Fresh directory under the system temp dir.
    pub(crate) fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "scratch-oracle-test-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub(crate) fn sample_artifact(validation_r2: f64) -> ModelArtifact {
        let split = |r2: f64, samples: usize| SplitMetrics {
            mae: 2.0,
            rmse: 3.0,
            r2,
            samples,
        };
        let mut weights = vec![0.0; FEATURE_NAMES.len()];
        weights[1] = 10.0; // ev
        weights[2] = 5.0; // prize_concentration
        let model = TrainedModel::Ridge(LinearModel {
            means: vec![0.0; FEATURE_NAMES.len()],
            scales: vec![1.0; FEATURE_NAMES.len()],
            weights,
            intercept: 40.0,
        });
        ModelArtifact::new(
            "v1.0",
            model,
            ModelMetrics::new(split(0.9, 16), split(validation_r2, 4), FEATURE_NAMES.len()),
            Utc::now(),
        )
    }

    #[test]
    fn test_save_then_load_scores_identically() {
        let dir = scratch_dir();
        let path = dir.join("models").join("lottery_predictor.json");
        let artifact = sample_artifact(0.8);
        save_artifact(&artifact, &path).unwrap();
        let loaded = load_artifact(&path).unwrap();
        assert_eq!(loaded, artifact);

        let sample = [5.0, 1.5, 0.75, 0.25, 9.0, 0.0, 0.25, 0.25, 2.0, 3.0, 4.0];
        assert_eq!(loaded.raw_score(&sample), artifact.raw_score(&sample));
        assert!(!tmp_path(&path).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_save_replaces_existing_artifact() {
        let dir = scratch_dir();
        let path = dir.join("model.json");
        save_artifact(&sample_artifact(0.5), &path).unwrap();
        let mut newer = sample_artifact(0.7);
        newer.version = "v1.1".into();
        save_artifact(&newer, &path).unwrap();
        assert_eq!(load_artifact(&path).unwrap().version, "v1.1");
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_stale_feature_list_is_rejected() {
        let mut artifact = sample_artifact(0.8);
        artifact.feature_names.swap(0, 1);
        assert!(matches!(artifact.validate(), Err(OracleError::Configuration(_))));

        let mut artifact = sample_artifact(0.8);
        artifact.feature_names.pop();
        assert!(matches!(artifact.validate(), Err(OracleError::Configuration(_))));

        let mut artifact = sample_artifact(0.8);
        artifact.feature_set_version += 1;
        assert!(matches!(artifact.validate(), Err(OracleError::Configuration(_))));
    }

    #[test]
    fn test_load_rejects_stale_artifact_on_disk() {
        let dir = scratch_dir();
        let path = dir.join("stale.json");
        let mut artifact = sample_artifact(0.8);
        artifact.feature_names[7] = "claim_velocity".into();
        save_artifact(&artifact, &path).unwrap();
        assert!(matches!(load_artifact(&path), Err(OracleError::Configuration(_))));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_load_missing_or_malformed_file() {
        let dir = scratch_dir();
        assert!(matches!(
            load_artifact(&dir.join("absent.json")),
            Err(OracleError::Configuration(_))
        ));
        let garbage = dir.join("garbage.json");
        fs::write(&garbage, b"{not json").unwrap();
        assert!(matches!(load_artifact(&garbage), Err(OracleError::Configuration(_))));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_summary_omits_parameters() {
        let json = serde_json::to_value(sample_artifact(0.8).summary()).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["feature_names"].as_array().unwrap().len(), 11);
        assert_eq!(json["target_spec"]["version"], 1);
    }
}
