//! Regression fit-quality measures.

use serde::{Deserialize, Serialize};

/// Train/validation gap in R² above which a fit is flagged as overfitting.
pub const OVERFIT_R2_GAP: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub train: SplitMetrics,
    pub validation: SplitMetrics,
    /// Valid examples used (train + validation)
    pub n_samples: usize,
    pub n_features: usize,
    pub overfitting: bool,
}

impl ModelMetrics {
    pub fn new(train: SplitMetrics, validation: SplitMetrics, n_features: usize) -> Self {
        ModelMetrics {
            n_samples: train.samples + validation.samples,
            n_features,
            overfitting: is_overfitting(train.r2, validation.r2),
            train,
            validation,
        }
    }
}

pub fn is_overfitting(train_r2: f64, validation_r2: f64) -> bool {
    train_r2 - validation_r2 > OVERFIT_R2_GAP
}

pub fn evaluate(predicted: &[f64], actual: &[f64]) -> SplitMetrics {
    debug_assert_eq!(predicted.len(), actual.len());
    if predicted.is_empty() || predicted.len() != actual.len() {
        return SplitMetrics {
            mae: 0.0,
            rmse: 0.0,
            r2: 0.0,
            samples: 0,
        };
    }
    SplitMetrics {
        mae: mean_absolute_error(predicted, actual),
        rmse: root_mean_squared_error(predicted, actual),
        r2: r2_score(predicted, actual),
        samples: predicted.len(),
    }
}

pub fn mean_absolute_error(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = predicted.len() as f64;
    predicted
        .iter()
        .zip(actual)
        .map(|(p, y)| (p - y).abs())
        .sum::<f64>()
        / n
}

pub fn root_mean_squared_error(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = predicted.len() as f64;
    let mse = predicted
        .iter()
        .zip(actual)
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / n;
    mse.sqrt()
}

/// Coefficient of determination. With constant targets the score is 1.0 for
/// an exact fit and 0.0 otherwise.
pub fn r2_score(predicted: &[f64], actual: &[f64]) -> f64 {
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, y)| (y - p).powi(2))
        .sum();
    if ss_tot <= f64::EPSILON {
        return if ss_res <= f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_fit() {
        let y = [10.0, 20.0, 30.0];
        let m = evaluate(&y, &y);
        assert_relative_eq!(m.mae, 0.0);
        assert_relative_eq!(m.rmse, 0.0);
        assert_relative_eq!(m.r2, 1.0);
        assert_eq!(m.samples, 3);
    }

    #[test]
    fn test_known_errors() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [2.0, 2.0, 3.0, 2.0];
        // residuals: -1, 0, 0, 2
        assert_relative_eq!(mean_absolute_error(&predicted, &actual), 0.75);
        assert_relative_eq!(root_mean_squared_error(&predicted, &actual), 1.25f64.sqrt());
        // ss_tot = 5.0, ss_res = 5.0
        assert_relative_eq!(r2_score(&predicted, &actual), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_r2_can_be_negative() {
        let actual = [1.0, 2.0, 3.0];
        let predicted = [3.0, 2.0, 1.0];
        assert!(r2_score(&predicted, &actual) < 0.0);
    }

    #[test]
    fn test_r2_with_constant_targets() {
        assert_relative_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_relative_eq!(r2_score(&[4.0, 6.0], &[5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_empty_split_is_zeroed() {
        let m = evaluate(&[], &[]);
        assert_eq!(m.samples, 0);
        assert_eq!(m.r2, 0.0);
    }

    #[test]
    fn test_overfitting_flag() {
        assert!(is_overfitting(0.95, 0.6));
        assert!(!is_overfitting(0.95, 0.7));
        let train = SplitMetrics { mae: 1.0, rmse: 1.0, r2: 0.99, samples: 8 };
        let validation = SplitMetrics { mae: 9.0, rmse: 9.0, r2: 0.2, samples: 2 };
        let m = ModelMetrics::new(train, validation, 11);
        assert!(m.overfitting);
        assert_eq!(m.n_samples, 10);
    }
}
