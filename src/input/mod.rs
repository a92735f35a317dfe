//! # Model inputs
//!
//! Defines a light-weight container for the mean-model design matrix, the raw
//! bounded outcome, and optional dispersion design or sample weights.
//!
//! The outcome is kept on its original scale; the fit normalizes it.
//!
//! # Examples
//!
//! ```
//! use faer::Mat;
//! use ordered_beta_models::ModelInput;
//!
//! fn idx_to_f64(idx: usize) -> f64 {
//!     f64::from(u32::try_from(idx).unwrap_or(u32::MAX))
//! }
//!
//! let design_matrix = Mat::from_fn(3, 2, |i, j| if j == 0 { 1.0 } else { idx_to_f64(i) });
//! let outcome = Mat::from_fn(3, 1, |i, _| 10.0 * idx_to_f64(i));
//! let input = ModelInput::new(design_matrix, outcome);
//!
//! assert!(input.validate().is_ok());
//! ```
//!
//! ```
//! use faer::Mat;
//! use ordered_beta_models::ModelInput;
//!
//! let design_matrix = Mat::from_fn(2, 1, |_, _| 1.0);
//! let outcome = Mat::from_fn(3, 1, |_, _| 0.5);
//! let input = ModelInput::new(design_matrix, outcome);
//!
//! assert!(input.validate().is_err());
//! ```

use faer::Mat;
use thiserror::Error;

use crate::utils::matrix_is_finite;

/// Errors returned when validating model inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("design matrix must have at least one column")]
    EmptyDesign,
    #[error("outcome must contain at least one row")]
    EmptyOutcome,
    #[error("outcome must be a single column matrix")]
    InvalidOutcomeShape,
    #[error("design matrix rows ({rows}) must match outcome rows ({len})")]
    DimensionMismatch { rows: usize, len: usize },
    #[error("dispersion design must have at least one column and match outcome rows ({rows})")]
    InvalidDispersionDesign { rows: usize },
    #[error("weights must be a single column matrix with the same number of rows as outcome")]
    InvalidWeightShape,
    #[error("design matrix contains non-finite values")]
    NonFiniteDesign,
    #[error("dispersion design contains non-finite values")]
    NonFiniteDispersionDesign,
    #[error("outcome contains non-finite values")]
    NonFiniteOutcome,
    #[error("weights contain non-finite values")]
    NonFiniteWeights,
    #[error("weights must be strictly positive")]
    NonPositiveWeights,
}

#[derive(Debug, Clone)]
pub struct ModelInput {
    pub design_matrix: Mat<f64>,
    pub outcome: Mat<f64>,
    pub dispersion_design: Option<Mat<f64>>,
    pub sample_weights: Option<Mat<f64>>,
}

impl ModelInput {
    #[must_use]
    pub const fn new(design_matrix: Mat<f64>, outcome: Mat<f64>) -> Self {
        Self {
            design_matrix,
            outcome,
            dispersion_design: None,
            sample_weights: None,
        }
    }

    /// Attach a design matrix for a log-linear dispersion sub-model.
    #[must_use]
    pub fn with_dispersion_design(self, dispersion_design: Mat<f64>) -> Self {
        Self {
            dispersion_design: Some(dispersion_design),
            ..self
        }
    }

    #[must_use]
    pub fn with_sample_weights(mut self, sample_weights: Mat<f64>) -> Self {
        self.sample_weights = Some(sample_weights);
        self
    }

    #[must_use]
    pub const fn design_matrix(&self) -> &Mat<f64> {
        &self.design_matrix
    }

    #[must_use]
    pub const fn outcome(&self) -> &Mat<f64> {
        &self.outcome
    }

    #[must_use]
    pub const fn dispersion_design(&self) -> Option<&Mat<f64>> {
        self.dispersion_design.as_ref()
    }

    #[must_use]
    pub const fn sample_weights(&self) -> Option<&Mat<f64>> {
        self.sample_weights.as_ref()
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.outcome.nrows()
    }

    /// Validate design matrix and outcome only.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if core inputs are malformed.
    pub fn validate_core(&self) -> Result<(), InputError> {
        if self.design_matrix.ncols() == 0 {
            return Err(InputError::EmptyDesign);
        }
        if self.outcome.ncols() != 1 {
            return Err(InputError::InvalidOutcomeShape);
        }
        if self.outcome.nrows() == 0 {
            return Err(InputError::EmptyOutcome);
        }
        if self.design_matrix.nrows() != self.outcome.nrows() {
            return Err(InputError::DimensionMismatch {
                rows: self.design_matrix.nrows(),
                len: self.outcome.nrows(),
            });
        }
        if !matrix_is_finite(&self.design_matrix) {
            return Err(InputError::NonFiniteDesign);
        }
        if !matrix_is_finite(&self.outcome) {
            return Err(InputError::NonFiniteOutcome);
        }
        Ok(())
    }

    /// Validate shapes and values for all matrices, including optional ones.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if inputs are malformed.
    pub fn validate(&self) -> Result<(), InputError> {
        self.validate_core()?;
        if let Some(dispersion) = &self.dispersion_design {
            if dispersion.ncols() == 0 || dispersion.nrows() != self.outcome.nrows() {
                return Err(InputError::InvalidDispersionDesign {
                    rows: self.outcome.nrows(),
                });
            }
            if !matrix_is_finite(dispersion) {
                return Err(InputError::NonFiniteDispersionDesign);
            }
        }
        if let Some(weights) = &self.sample_weights {
            if weights.ncols() != 1 || weights.nrows() != self.outcome.nrows() {
                return Err(InputError::InvalidWeightShape);
            }
            if !matrix_is_finite(weights) {
                return Err(InputError::NonFiniteWeights);
            }
            if (0..weights.nrows()).any(|i| weights[(i, 0)] <= 0.0) {
                return Err(InputError::NonPositiveWeights);
            }
        }
        Ok(())
    }
}
