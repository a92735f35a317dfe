//! Normal-approximation draws and scalar summaries shared by the model code.
//!
//! The fitted mode and its Laplace covariance define a multivariate normal;
//! draws from it propagate parameter uncertainty into derived quantities such
//! as marginal effects and replicated data.

use faer::Mat;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::models::ordbeta::distribution::sample_standard_normal;
use crate::utils::{cholesky_lower, percentile_interval, usize_to_f64};

/// Errors for approximation draws and their configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InferenceError {
    #[error("draw count must be positive")]
    InvalidDrawCount,
    #[error("interval level alpha must lie strictly between 0 and 1")]
    InvalidAlpha,
    #[error("mean length ({mean}) must match covariance dimension ({covariance})")]
    DimensionMismatch { mean: usize, covariance: usize },
    #[error("covariance matrix is not positive definite")]
    NotPositiveDefinite,
}

/// Schedule for normal-approximation draws.
#[derive(Debug, Clone, Copy)]
pub struct DrawConfig {
    pub draws: usize,
    pub seed: u64,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            draws: 1_000,
            seed: 42,
        }
    }
}

impl DrawConfig {
    /// # Errors
    ///
    /// Returns `InferenceError` if the draw count is zero.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.draws == 0 {
            return Err(InferenceError::InvalidDrawCount);
        }
        Ok(())
    }
}

/// Draw from `Normal(mean, covariance)`.
///
/// A small diagonal jitter is added when the covariance is numerically
/// semi-definite.
///
/// # Errors
///
/// Returns `InferenceError` if the dimensions disagree or no Cholesky factor exists.
pub fn multivariate_normal_draws(
    mean: &Mat<f64>,
    covariance: &Mat<f64>,
    config: DrawConfig,
) -> Result<Vec<Mat<f64>>, InferenceError> {
    config.validate()?;
    let dim = mean.nrows();
    if covariance.nrows() != dim || covariance.ncols() != dim {
        return Err(InferenceError::DimensionMismatch {
            mean: dim,
            covariance: covariance.nrows(),
        });
    }

    let lower = cholesky_with_jitter(covariance).ok_or(InferenceError::NotPositiveDefinite)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut draws = Vec::with_capacity(config.draws);
    for _ in 0..config.draws {
        let noise = Mat::from_fn(dim, 1, |_, _| sample_standard_normal(&mut rng));
        let shifted = &lower * &noise;
        draws.push(Mat::from_fn(dim, 1, |i, _| mean[(i, 0)] + shifted[(i, 0)]));
    }
    Ok(draws)
}

fn cholesky_with_jitter(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let dim = matrix.ncols();
    let scale = (0..dim)
        .map(|i| matrix[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let mut jitter = 0.0;
    for _ in 0..8 {
        let regularized = Mat::from_fn(dim, dim, |row, col| {
            if row == col {
                matrix[(row, col)] + jitter
            } else {
                matrix[(row, col)]
            }
        });
        if let Some(lower) = cholesky_lower(&regularized) {
            return Some(lower);
        }
        jitter = if jitter == 0.0 { 1.0e-10 * scale } else { jitter * 10.0 };
    }
    None
}

/// Scalar summary over a set of draws.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
}

/// Mean, standard deviation, median and `1 - alpha` percentile interval.
#[must_use]
pub fn summarize_draws(values: &[f64], alpha: f64) -> ParameterSummary {
    if values.is_empty() {
        return ParameterSummary::default();
    }

    let n = usize_to_f64(values.len());
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>()
        / n.max(1.0);

    let (lower, upper) = percentile_interval(values, alpha);
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let median = sorted[sorted.len() / 2];

    ParameterSummary {
        mean,
        std_dev: variance.sqrt(),
        lower,
        median,
        upper,
    }
}

/// # Errors
///
/// Returns `InferenceError::InvalidAlpha` unless `0 < alpha < 1`.
pub fn validate_alpha(alpha: f64) -> Result<(), InferenceError> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(InferenceError::InvalidAlpha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn config_validation_rejects_zero_draws() {
        let config = DrawConfig {
            draws: 0,
            ..DrawConfig::default()
        };
        assert_eq!(config.validate(), Err(InferenceError::InvalidDrawCount));
    }

    #[test]
    fn draws_match_target_moments() {
        let mean = Mat::from_fn(2, 1, |i, _| if i == 0 { 1.0 } else { -2.0 });
        let covariance = Mat::from_fn(2, 2, |i, j| match (i, j) {
            (0, 0) => 0.25,
            (1, 1) => 1.0,
            _ => 0.3,
        });
        let draws = multivariate_normal_draws(
            &mean,
            &covariance,
            DrawConfig {
                draws: 20_000,
                seed: 5,
            },
        )
        .expect("draws");
        let first = draws.iter().map(|d| d[(0, 0)]).collect::<Vec<_>>();
        let second = draws.iter().map(|d| d[(1, 0)]).collect::<Vec<_>>();
        let s1 = summarize_draws(&first, 0.05);
        let s2 = summarize_draws(&second, 0.05);
        assert_relative_eq!(s1.mean, 1.0, epsilon = 0.02);
        assert_relative_eq!(s1.std_dev, 0.5, epsilon = 0.02);
        assert_relative_eq!(s2.mean, -2.0, epsilon = 0.03);
        assert_relative_eq!(s2.std_dev, 1.0, epsilon = 0.03);
    }

    #[test]
    fn draws_reject_dimension_mismatch() {
        let mean = Mat::<f64>::zeros(2, 1);
        let covariance = Mat::<f64>::identity(3, 3);
        let err = multivariate_normal_draws(&mean, &covariance, DrawConfig::default())
            .expect_err("mismatch");
        assert_eq!(
            err,
            InferenceError::DimensionMismatch {
                mean: 2,
                covariance: 3
            }
        );
    }

    #[test]
    fn summary_reports_interval_and_median() {
        let values = (1..=99).map(f64::from).collect::<Vec<_>>();
        let summary = summarize_draws(&values, 0.1);
        assert_relative_eq!(summary.mean, 50.0);
        assert!(summary.lower < summary.median && summary.median < summary.upper);
        assert!(validate_alpha(0.05).is_ok());
        assert_eq!(validate_alpha(1.0), Err(InferenceError::InvalidAlpha));
    }
}
