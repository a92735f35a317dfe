//! Core public types for the ordered beta model.

use faer::Mat;
use thiserror::Error;

use super::distribution::{
    Cutpoints, DistributionError, category_probabilities, logistic_stable,
};
use super::priors::OrdBetaPriorConfig;
use crate::inference::InferenceError;
use crate::input::InputError;
use crate::preprocess::{NormalizeError, OutcomeBounds};

/// Errors returned by ordered beta configuration, validation, and fitting.
#[derive(Debug, Error)]
pub enum OrdBetaError {
    #[error(transparent)]
    InvalidInput(#[from] InputError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("convergence tolerances and damping must be finite and positive")]
    InvalidTolerance,
    #[error("invalid ordered beta prior configuration")]
    InvalidPriorConfig,
    #[error("design columns ({design_cols}) must match coefficient length ({coef_len})")]
    DesignCoefficientMismatch { design_cols: usize, coef_len: usize },
    #[error("model has a dispersion sub-model; predictions need a dispersion design")]
    MissingDispersionDesign,
    #[error("log posterior is not finite at the starting values")]
    NonFiniteObjective,
    #[error("at least one parameter draw is required")]
    EmptyDraws,
    #[error("linear solve failed")]
    SolveFailed,
}

/// How the Beta precision `phi` is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispersionModel {
    /// A single `phi` shared by all observations.
    #[default]
    Constant,
    /// `log(phi)` is linear in the dispersion design.
    Regression,
}

/// Tuning parameters for ordered beta fitting.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Maximum number of Newton iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the largest parameter step.
    pub tolerance: f64,
    /// Convergence tolerance on the largest gradient entry.
    pub gradient_tolerance: f64,
    /// Known scale limits of the raw outcome; observed min/max when `None`.
    pub true_bounds: Option<OutcomeBounds>,
    /// Prior hyperparameters.
    pub priors: OrdBetaPriorConfig,
    /// Normal-approximation draws returned by the draw-producing fit.
    pub draws: usize,
    /// Seed for those draws.
    pub seed: u64,
    /// Diagonal damping tried first when the negative Hessian is not positive definite.
    pub initial_damping: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-8,
            gradient_tolerance: 1e-6,
            true_bounds: None,
            priors: OrdBetaPriorConfig::default(),
            draws: 1_000,
            seed: 42,
            initial_damping: 1e-6,
        }
    }
}

impl FitOptions {
    /// # Errors
    ///
    /// Returns `OrdBetaError` if options are internally inconsistent.
    pub fn validate(self) -> Result<(), OrdBetaError> {
        if self.max_iter == 0 {
            return Err(OrdBetaError::InvalidIterations);
        }
        let valid_tolerance = |value: f64| value > 0.0 && value.is_finite();
        if !(valid_tolerance(self.tolerance) && valid_tolerance(self.gradient_tolerance)) {
            return Err(OrdBetaError::InvalidTolerance);
        }
        if !valid_tolerance(self.initial_damping) {
            return Err(OrdBetaError::InvalidTolerance);
        }
        if !self.priors.is_valid() {
            return Err(OrdBetaError::InvalidPriorConfig);
        }
        if let Some(bounds) = self.true_bounds {
            OutcomeBounds::new(bounds.lower, bounds.upper)?;
        }
        Ok(())
    }
}

/// Fitted ordered beta parameters.
#[derive(Debug, Clone)]
pub struct OrdBetaModel {
    /// Mean-model coefficients on the logit scale.
    pub beta: Mat<f64>,
    /// Dispersion coefficients; for a constant model this is `[log(phi)]`.
    pub dispersion: Mat<f64>,
    pub cutpoints: Cutpoints,
    /// Scale limits used to normalize the outcome.
    pub bounds: OutcomeBounds,
    pub dispersion_model: DispersionModel,
}

/// Per-row predictions.
#[derive(Debug, Clone)]
pub struct OrdBetaPrediction {
    /// Mean of the interior Beta component.
    pub mu: Mat<f64>,
    pub phi: Mat<f64>,
    pub prob_low: Mat<f64>,
    pub prob_interior: Mat<f64>,
    pub prob_high: Mat<f64>,
    /// Expected outcome on `[0, 1]`.
    pub expected: Mat<f64>,
    /// Expected outcome on the original scale.
    pub expected_original: Mat<f64>,
}

impl OrdBetaModel {
    /// Constant `phi`, if the model has no dispersion sub-model.
    #[must_use]
    pub fn phi(&self) -> Option<f64> {
        match self.dispersion_model {
            DispersionModel::Constant => Some(self.dispersion[(0, 0)].exp()),
            DispersionModel::Regression => None,
        }
    }

    #[must_use]
    pub fn n_parameters(&self) -> usize {
        self.beta.nrows() + self.dispersion.nrows() + 2
    }

    /// Unconstrained parameter vector `[beta, dispersion, low cut, log gap]`.
    #[must_use]
    pub fn parameter_vector(&self) -> Mat<f64> {
        let n_beta = self.beta.nrows();
        let n_disp = self.dispersion.nrows();
        Mat::from_fn(self.n_parameters(), 1, |i, _| {
            if i < n_beta {
                self.beta[(i, 0)]
            } else if i < n_beta + n_disp {
                self.dispersion[(i - n_beta, 0)]
            } else if i == n_beta + n_disp {
                self.cutpoints.low
            } else {
                self.cutpoints.log_gap()
            }
        })
    }

    /// Copy of this model with parameters taken from an unconstrained vector.
    #[must_use]
    pub fn with_parameter_vector(&self, theta: &Mat<f64>) -> Self {
        let n_beta = self.beta.nrows();
        let n_disp = self.dispersion.nrows();
        Self {
            beta: Mat::from_fn(n_beta, 1, |i, _| theta[(i, 0)]),
            dispersion: Mat::from_fn(n_disp, 1, |i, _| theta[(n_beta + i, 0)]),
            cutpoints: Cutpoints::from_unconstrained(
                theta[(n_beta + n_disp, 0)],
                theta[(n_beta + n_disp + 1, 0)],
            ),
            bounds: self.bounds,
            dispersion_model: self.dispersion_model,
        }
    }

    /// Linear predictor for the mean model.
    ///
    /// # Errors
    ///
    /// Returns `OrdBetaError::DesignCoefficientMismatch` on a column mismatch.
    pub fn linear_predictor(&self, x: &Mat<f64>) -> Result<Mat<f64>, OrdBetaError> {
        if x.ncols() != self.beta.nrows() {
            return Err(OrdBetaError::DesignCoefficientMismatch {
                design_cols: x.ncols(),
                coef_len: self.beta.nrows(),
            });
        }
        Ok(x * &self.beta)
    }

    /// Per-row `phi`.
    ///
    /// # Errors
    ///
    /// Returns `OrdBetaError` if a dispersion sub-model lacks a matching design.
    pub fn dispersion_values(
        &self,
        nrows: usize,
        z: Option<&Mat<f64>>,
    ) -> Result<Mat<f64>, OrdBetaError> {
        match self.dispersion_model {
            DispersionModel::Constant => {
                let phi = self.dispersion[(0, 0)].exp();
                Ok(Mat::from_fn(nrows, 1, |_, _| phi))
            }
            DispersionModel::Regression => {
                let z = z.ok_or(OrdBetaError::MissingDispersionDesign)?;
                if z.ncols() != self.dispersion.nrows() {
                    return Err(OrdBetaError::DesignCoefficientMismatch {
                        design_cols: z.ncols(),
                        coef_len: self.dispersion.nrows(),
                    });
                }
                if z.nrows() != nrows {
                    return Err(OrdBetaError::InvalidInput(InputError::InvalidDispersionDesign {
                        rows: nrows,
                    }));
                }
                let eta_phi = z * &self.dispersion;
                Ok(Mat::from_fn(nrows, 1, |i, _| eta_phi[(i, 0)].exp()))
            }
        }
    }

    /// Predict category probabilities and expected outcomes.
    ///
    /// # Errors
    ///
    /// Returns `OrdBetaError` if designs do not match the fitted coefficients.
    pub fn predict(
        &self,
        x: &Mat<f64>,
        z: Option<&Mat<f64>>,
    ) -> Result<OrdBetaPrediction, OrdBetaError> {
        let eta = self.linear_predictor(x)?;
        let phi = self.dispersion_values(x.nrows(), z)?;
        let n = x.nrows();
        let probs = (0..n)
            .map(|i| category_probabilities(eta[(i, 0)], self.cutpoints))
            .collect::<Vec<_>>();
        let mu = Mat::from_fn(n, 1, |i, _| logistic_stable(eta[(i, 0)]));
        let expected = Mat::from_fn(n, 1, |i, _| {
            probs[i].interior.mul_add(mu[(i, 0)], probs[i].high)
        });
        let expected_original = Mat::from_fn(n, 1, |i, _| self.bounds.restore(expected[(i, 0)]));

        Ok(OrdBetaPrediction {
            prob_low: Mat::from_fn(n, 1, |i, _| probs[i].low),
            prob_interior: Mat::from_fn(n, 1, |i, _| probs[i].interior),
            prob_high: Mat::from_fn(n, 1, |i, _| probs[i].high),
            mu,
            phi,
            expected,
            expected_original,
        })
    }
}

/// Standard errors of the two cutpoints on their natural scale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CutpointStandardErrors {
    pub low: f64,
    pub high: f64,
}

/// Fit diagnostics and inference outputs.
#[derive(Debug, Clone)]
pub struct OrdBetaReport {
    /// Newton iterations used.
    pub iterations: usize,
    /// Whether a convergence criterion was met before `max_iter`.
    pub converged: bool,
    /// Largest absolute gradient entry at the returned mode.
    pub gradient_max: f64,
    /// Weighted log-likelihood at the mode.
    pub log_likelihood: f64,
    /// Log posterior (likelihood plus priors) at the mode.
    pub log_posterior: f64,
    /// Laplace covariance of the unconstrained parameter vector.
    pub covariance: Mat<f64>,
    pub se_beta: Mat<f64>,
    pub se_dispersion: Mat<f64>,
    pub se_cutpoints: CutpointStandardErrors,
    /// Delta-method standard error of a constant `phi`.
    pub se_phi: Option<f64>,
    pub n_obs: usize,
    pub n_low: usize,
    pub n_interior: usize,
    pub n_high: usize,
}

/// Parameter draws from the normal approximation at the mode.
#[derive(Debug, Clone, Default)]
pub struct OrdBetaDraws {
    pub models: Vec<OrdBetaModel>,
}

impl OrdBetaDraws {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> OrdBetaModel {
        OrdBetaModel {
            beta: Mat::from_fn(2, 1, |i, _| if i == 0 { 0.2 } else { -0.5 }),
            dispersion: Mat::from_fn(1, 1, |_, _| 2.0f64.ln()),
            cutpoints: Cutpoints::new(-1.0, 1.5).expect("cuts"),
            bounds: OutcomeBounds {
                lower: 0.0,
                upper: 10.0,
            },
            dispersion_model: DispersionModel::Constant,
        }
    }

    #[test]
    fn options_validation_rejects_bad_values() {
        assert!(FitOptions::default().validate().is_ok());
        let zero_iter = FitOptions {
            max_iter: 0,
            ..FitOptions::default()
        };
        assert!(matches!(
            zero_iter.validate(),
            Err(OrdBetaError::InvalidIterations)
        ));
        let bad_bounds = FitOptions {
            true_bounds: Some(OutcomeBounds {
                lower: 1.0,
                upper: 0.0,
            }),
            ..FitOptions::default()
        };
        assert!(matches!(
            bad_bounds.validate(),
            Err(OrdBetaError::Normalize(_))
        ));
    }

    #[test]
    fn parameter_vector_round_trips() {
        let model = model();
        let theta = model.parameter_vector();
        assert_eq!(theta.nrows(), 5);
        let rebuilt = model.with_parameter_vector(&theta);
        assert_relative_eq!(rebuilt.cutpoints.high, 1.5, epsilon = 1e-12);
        assert_relative_eq!(rebuilt.phi().expect("constant"), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn prediction_probabilities_are_consistent() {
        let model = model();
        let x = Mat::from_fn(3, 2, |i, j| {
            if j == 0 {
                1.0
            } else {
                f64::from(u8::try_from(i).unwrap_or(0))
            }
        });
        let prediction = model.predict(&x, None).expect("predict");
        for i in 0..3 {
            let total = prediction.prob_low[(i, 0)]
                + prediction.prob_interior[(i, 0)]
                + prediction.prob_high[(i, 0)];
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            assert_relative_eq!(
                prediction.expected_original[(i, 0)],
                10.0 * prediction.expected[(i, 0)],
                epsilon = 1e-12
            );
        }
        assert!(prediction.expected[(0, 0)] > prediction.expected[(2, 0)]);
    }

    #[test]
    fn predict_rejects_mismatched_design() {
        let model = model();
        let x = Mat::from_fn(2, 3, |_, _| 1.0);
        assert!(matches!(
            model.predict(&x, None),
            Err(OrdBetaError::DesignCoefficientMismatch {
                design_cols: 3,
                coef_len: 2
            })
        ));
    }

    #[test]
    fn regression_dispersion_requires_design() {
        let model = OrdBetaModel {
            dispersion_model: DispersionModel::Regression,
            ..model()
        };
        let x = Mat::from_fn(2, 2, |_, _| 1.0);
        assert!(matches!(
            model.predict(&x, None),
            Err(OrdBetaError::MissingDispersionDesign)
        ));
        assert!(model.phi().is_none());
    }
}
