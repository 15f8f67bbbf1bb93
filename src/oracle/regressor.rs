//! The fitted model as seen by the rest of the crate: something that maps
//! an ordered numeric feature vector to a raw score.
//!
//! Trainer and scorer only depend on [`Regressor`]. The concrete technique
//! lives in [`TrainedModel`], which is what artifacts serialize; adding a
//! technique means adding a variant here and a fit function next to
//! [`fit_ridge`].

use linfa::prelude::*;
use linfa::Dataset;
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};

/// Map an ordered feature vector to a raw (unclamped) score.
pub trait Regressor {
    fn predict(&self, features: &[f64]) -> f64;

    /// Short technique name recorded in artifacts and logs.
    fn framework(&self) -> &'static str;
}

/// Linear model over z-scored inputs. The standardisation is part of the
/// model, so callers pass raw feature values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    /// Absolute standardized weights; comparable across features.
    pub fn importance(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.abs()).collect()
    }
}

impl Regressor for LinearModel {
    /// Returns NaN when the input width does not match the model.
    fn predict(&self, features: &[f64]) -> f64 {
        if features.len() != self.weights.len() {
            return f64::NAN;
        }
        let dot: f64 = features
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.weights)
            .map(|(((x, mean), scale), w)| (x - mean) / scale * w)
            .sum();
        self.intercept + dot
    }

    fn framework(&self) -> &'static str {
        "ridge"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    Ridge(LinearModel),
}

impl TrainedModel {
    /// Per-feature importance in model input order.
    pub fn importance(&self) -> Vec<f64> {
        match self {
            TrainedModel::Ridge(m) => m.importance(),
        }
    }
}

impl Regressor for TrainedModel {
    fn predict(&self, features: &[f64]) -> f64 {
        match self {
            TrainedModel::Ridge(m) => m.predict(features),
        }
    }

    fn framework(&self) -> &'static str {
        match self {
            TrainedModel::Ridge(m) => m.framework(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgeParams {
    /// L2 penalty strength on standardized weights
    pub penalty: f64,
    pub max_iterations: u32,
    pub tolerance: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        RidgeParams {
            penalty: 0.01,
            max_iterations: 10_000,
            tolerance: 1e-6,
        }
    }
}

/// Fit a ridge regression (elastic net with no L1 term) on standardized
/// features. Collinear inputs (depletion and velocity are identical) are
/// fine under the L2 penalty.
pub fn fit_ridge(rows: &[Vec<f64>], targets: &[f64], params: RidgeParams) -> Result<LinearModel> {
    let n = rows.len();
    if n == 0 || n != targets.len() {
        return Err(OracleError::Fit(format!(
            "need matching non-empty inputs, got {} rows and {} targets",
            n,
            targets.len()
        )));
    }
    let width = rows[0].len();
    if rows.iter().any(|r| r.len() != width) {
        return Err(OracleError::Fit("feature rows have differing widths".into()));
    }
    if rows.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
        return Err(OracleError::Fit("non-finite feature or target value".into()));
    }

    let (means, scales, active) = standardization(rows, width);
    let mut weights = vec![0.0; width];
    let mean_target = targets.iter().sum::<f64>() / n as f64;
    if active.is_empty() {
        return Ok(LinearModel {
            means,
            scales,
            weights,
            intercept: mean_target,
        });
    }

    let mut flat = Vec::with_capacity(n * active.len());
    for row in rows {
        for &j in &active {
            flat.push((row[j] - means[j]) / scales[j]);
        }
    }
    let x = Array2::from_shape_vec((n, active.len()), flat)
        .map_err(|e| OracleError::Fit(format!("feature matrix: {}", e)))?;
    let y = Array1::from(targets.to_vec());
    let dataset = Dataset::new(x, y);

    let fitted = ElasticNet::<f64>::params()
        .penalty(params.penalty)
        .l1_ratio(0.0)
        .max_iterations(params.max_iterations)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e| OracleError::Fit(e.to_string()))?;

    for (&j, w) in active.iter().zip(fitted.hyperplane().iter()) {
        weights[j] = *w;
    }
    let model = LinearModel {
        means,
        scales,
        weights,
        intercept: fitted.intercept(),
    };
    if model.weights.iter().any(|w| !w.is_finite()) || !model.intercept.is_finite() {
        return Err(OracleError::Fit("fit diverged".into()));
    }
    Ok(model)
}

/// Column means, population standard deviations and the indices of
/// non-constant columns. Constant columns keep a scale of 1 and are left
/// out of the fit with a zero weight.
fn standardization(rows: &[Vec<f64>], width: usize) -> (Vec<f64>, Vec<f64>, Vec<usize>) {
    let n = rows.len() as f64;
    let mut means = vec![0.0; width];
    for row in rows {
        for (j, x) in row.iter().enumerate() {
            means[j] += x / n;
        }
    }
    let mut scales = vec![0.0; width];
    for row in rows {
        for (j, x) in row.iter().enumerate() {
            scales[j] += (x - means[j]).powi(2) / n;
        }
    }
    let mut active = Vec::with_capacity(width);
    for (j, s) in scales.iter_mut().enumerate() {
        *s = s.sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        } else {
            active.push(j);
        }
    }
    (means, scales, active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..40 {
            let a = (i % 7) as f64;
            let b = (i % 5) as f64 * 10.0;
            // third column duplicates the first; fourth is constant
            rows.push(vec![a, b, a, 3.0]);
            targets.push(5.0 + 2.0 * a + 0.5 * b);
        }
        (rows, targets)
    }

    #[test]
    fn test_fit_recovers_linear_relationship() {
        let (rows, targets) = linear_data();
        let params = RidgeParams {
            penalty: 1e-4,
            ..RidgeParams::default()
        };
        let model = fit_ridge(&rows, &targets, params).unwrap();
        for (row, y) in rows.iter().zip(&targets) {
            assert_relative_eq!(model.predict(row), *y, epsilon = 0.5);
        }
        // constant column standardizes to zero and contributes nothing
        assert_relative_eq!(model.scales[3], 1.0);
        assert_relative_eq!(model.weights[3], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let model = LinearModel {
            means: vec![0.0, 0.0],
            scales: vec![1.0, 1.0],
            weights: vec![1.0, 2.0],
            intercept: 3.0,
        };
        assert_relative_eq!(model.predict(&[1.0, 1.0]), 6.0);
        assert!(model.predict(&[1.0]).is_nan());
    }

    #[test]
    fn test_fit_rejects_bad_inputs() {
        assert!(matches!(
            fit_ridge(&[], &[], RidgeParams::default()),
            Err(OracleError::Fit(_))
        ));
        assert!(fit_ridge(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], RidgeParams::default()).is_err());
        assert!(fit_ridge(&[vec![f64::NAN]], &[1.0], RidgeParams::default()).is_err());
    }

    #[test]
    fn test_all_constant_features_predict_the_mean() {
        let rows = vec![vec![1.0, 2.0]; 4];
        let model = fit_ridge(&rows, &[10.0, 20.0, 30.0, 40.0], RidgeParams::default()).unwrap();
        assert_relative_eq!(model.predict(&[1.0, 2.0]), 25.0);
        assert_relative_eq!(model.predict(&[9.0, 9.0]), 25.0);
    }

    #[test]
    fn test_trained_model_serializes_with_kind_tag() {
        let model = TrainedModel::Ridge(LinearModel {
            means: vec![1.0],
            scales: vec![2.0],
            weights: vec![0.5],
            intercept: 10.0,
        });
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["kind"], "ridge");
        let back: TrainedModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
        assert_relative_eq!(back.predict(&[3.0]), 10.5);
        assert_eq!(back.framework(), "ridge");
    }
}
