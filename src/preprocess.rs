//! # Outcome preprocessing
//!
//! Rescales a bounded outcome onto `[0, 1]` and records which observations sit
//! exactly on a bound. The ordered beta likelihood treats those observations as
//! point masses, so the indicators travel with the normalized values.

use faer::Mat;
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::usize_to_f64;

/// Errors returned when normalizing an outcome.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum NormalizeError {
    #[error("outcome must contain at least one value")]
    EmptyOutcome,
    #[error("outcome contains non-finite values")]
    NonFiniteOutcome,
    #[error("bounds must be finite with lower ({lower}) below upper ({upper})")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("outcome is constant ({0}); pass explicit bounds to normalize it")]
    ConstantOutcome(f64),
    #[error("outcome value {value} lies outside the bounds [{lower}, {upper}]")]
    OutOfBounds { value: f64, lower: f64, upper: f64 },
}

/// Closed interval `[lower, upper]` the raw outcome lives on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for OutcomeBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

impl OutcomeBounds {
    /// # Errors
    ///
    /// Returns `NormalizeError::InvalidBounds` unless both bounds are finite and ordered.
    pub fn new(lower: f64, upper: f64) -> Result<Self, NormalizeError> {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(NormalizeError::InvalidBounds { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    #[must_use]
    pub fn width(self) -> f64 {
        self.upper - self.lower
    }

    /// Map a raw value onto the unit scale.
    #[must_use]
    pub fn rescale(self, value: f64) -> f64 {
        (value - self.lower) / self.width()
    }

    /// Map a unit-scale value back; exact at both bounds.
    #[must_use]
    pub fn restore(self, unit: f64) -> f64 {
        (1.0 - unit).mul_add(self.lower, unit * self.upper)
    }

    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        (self.lower..=self.upper).contains(&value)
    }
}

/// Category of an observation relative to the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeCategory {
    Low,
    Interior,
    High,
}

/// Per-observation flags for outcomes at the lower or upper bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundIndicators {
    pub low: Vec<bool>,
    pub high: Vec<bool>,
}

impl BoundIndicators {
    /// Indicators for a unit-scale outcome.
    #[must_use]
    pub fn from_unit_outcome(values: &Mat<f64>) -> Self {
        let low = (0..values.nrows()).map(|i| values[(i, 0)] == 0.0).collect();
        let high = (0..values.nrows()).map(|i| values[(i, 0)] == 1.0).collect();
        Self { low, high }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.low.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.low.is_empty()
    }

    #[must_use]
    pub fn category(&self, row: usize) -> OutcomeCategory {
        if self.low[row] {
            OutcomeCategory::Low
        } else if self.high[row] {
            OutcomeCategory::High
        } else {
            OutcomeCategory::Interior
        }
    }

    #[must_use]
    pub fn n_low(&self) -> usize {
        self.low.iter().filter(|flag| **flag).count()
    }

    #[must_use]
    pub fn n_high(&self) -> usize {
        self.high.iter().filter(|flag| **flag).count()
    }

    #[must_use]
    pub fn n_interior(&self) -> usize {
        self.len() - self.n_low() - self.n_high()
    }
}

/// Outcome mapped onto `[0, 1]` together with its bounds and indicators.
#[derive(Debug, Clone)]
pub struct NormalizedOutcome {
    pub values: Mat<f64>,
    pub bounds: OutcomeBounds,
    pub indicators: BoundIndicators,
}

/// Rescale a single-column outcome onto `[0, 1]`.
///
/// Without `true_bounds` the observed minimum and maximum are used.
///
/// # Errors
///
/// Returns `NormalizeError` if the outcome is empty, non-finite, constant with
/// inferred bounds, or falls outside the declared bounds.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use ordered_beta_models::{OutcomeBounds, normalize_outcome};
///
/// let raw = Mat::from_fn(4, 1, |i, _| [0.0, 25.0, 50.0, 100.0][i]);
/// let bounds = OutcomeBounds::new(0.0, 100.0).expect("bounds");
/// let normalized = normalize_outcome(&raw, Some(bounds)).expect("normalize");
///
/// assert_eq!(normalized.values[(1, 0)], 0.25);
/// assert_eq!(normalized.indicators.n_low(), 1);
/// assert_eq!(normalized.indicators.n_high(), 1);
/// ```
pub fn normalize_outcome(
    outcome: &Mat<f64>,
    true_bounds: Option<OutcomeBounds>,
) -> Result<NormalizedOutcome, NormalizeError> {
    let n = outcome.nrows();
    if n == 0 || outcome.ncols() == 0 {
        return Err(NormalizeError::EmptyOutcome);
    }
    if (0..n).any(|i| !outcome[(i, 0)].is_finite()) {
        return Err(NormalizeError::NonFiniteOutcome);
    }

    let bounds = match true_bounds {
        Some(bounds) => OutcomeBounds::new(bounds.lower, bounds.upper)?,
        None => {
            let (min, max) = (0..n).fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), i| {
                (min.min(outcome[(i, 0)]), max.max(outcome[(i, 0)]))
            });
            if min >= max {
                return Err(NormalizeError::ConstantOutcome(min));
            }
            info!(
                lower = min,
                upper = max,
                "normalizing outcome using its observed bounds; pass explicit bounds if these are not the true scale limits"
            );
            OutcomeBounds {
                lower: min,
                upper: max,
            }
        }
    };

    if let Some(value) = (0..n)
        .map(|i| outcome[(i, 0)])
        .find(|value| !bounds.contains(*value))
    {
        return Err(NormalizeError::OutOfBounds {
            value,
            lower: bounds.lower,
            upper: bounds.upper,
        });
    }

    let values = Mat::from_fn(n, 1, |i, _| bounds.rescale(outcome[(i, 0)]).clamp(0.0, 1.0));
    let indicators = BoundIndicators::from_unit_outcome(&values);
    debug!(
        n_low = indicators.n_low(),
        n_interior = indicators.n_interior(),
        n_high = indicators.n_high(),
        "outcome normalized"
    );

    Ok(NormalizedOutcome {
        values,
        bounds,
        indicators,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeDiagnostics {
    pub n_rows: usize,
    pub n_finite: usize,
    pub n_non_finite: usize,
    pub n_out_of_range: usize,
    pub n_low: usize,
    pub n_interior: usize,
    pub n_high: usize,
    pub low_share: f64,
    pub high_share: f64,
}

/// Counts per category for an outcome already on the unit scale.
#[must_use]
pub fn outcome_diagnostics(outcome: &Mat<f64>) -> OutcomeDiagnostics {
    let n_rows = outcome.nrows();
    let mut n_finite = 0usize;
    let mut n_out_of_range = 0usize;
    let mut n_low = 0usize;
    let mut n_interior = 0usize;
    let mut n_high = 0usize;

    for row in 0..n_rows {
        let value = outcome[(row, 0)];
        if !value.is_finite() {
            continue;
        }
        n_finite += 1;
        if !(0.0..=1.0).contains(&value) {
            n_out_of_range += 1;
        } else if value == 0.0 {
            n_low += 1;
        } else if value == 1.0 {
            n_high += 1;
        } else {
            n_interior += 1;
        }
    }

    let n_non_finite = n_rows.saturating_sub(n_finite);
    let share = |count: usize| {
        if n_finite > 0 {
            usize_to_f64(count) / usize_to_f64(n_finite)
        } else {
            0.0
        }
    };

    OutcomeDiagnostics {
        n_rows,
        n_finite,
        n_non_finite,
        n_out_of_range,
        n_low,
        n_interior,
        n_high,
        low_share: share(n_low),
        high_share: share(n_high),
    }
}

#[must_use]
pub fn column_has_variation(x: &Mat<f64>, column: usize, tolerance: f64) -> bool {
    if column >= x.ncols() || x.nrows() < 2 {
        return false;
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for row in 0..x.nrows() {
        let value = x[(row, column)];
        min = min.min(value);
        max = max.max(value);
    }
    (max - min).abs() > tolerance.abs()
}

/// Indices of columns without variation (intercept-like columns).
#[must_use]
pub fn constant_columns(x: &Mat<f64>, tolerance: f64) -> Vec<usize> {
    (0..x.ncols())
        .filter(|&col| !column_has_variation(x, col, tolerance))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_is_exact_on_bounds() {
        let bounds = OutcomeBounds::new(0.1, 0.7).expect("bounds");
        assert_eq!(bounds.rescale(0.1), 0.0);
        assert_eq!(bounds.rescale(0.7), 1.0);
        assert_eq!(bounds.restore(bounds.rescale(0.1)), 0.1);
        assert_eq!(bounds.restore(bounds.rescale(0.7)), 0.7);
        assert!((bounds.restore(bounds.rescale(0.4)) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn invalid_bounds_are_rejected() {
        assert!(matches!(
            OutcomeBounds::new(1.0, 1.0),
            Err(NormalizeError::InvalidBounds { .. })
        ));
        assert!(OutcomeBounds::new(f64::NEG_INFINITY, 1.0).is_err());
    }

    #[test]
    fn normalize_uses_observed_bounds_by_default() {
        let raw = Mat::from_fn(5, 1, |i, _| [2.0, 4.0, 6.0, 10.0, 3.0][i]);
        let normalized = normalize_outcome(&raw, None).expect("normalize");
        assert_eq!(normalized.bounds, OutcomeBounds { lower: 2.0, upper: 10.0 });
        assert_eq!(normalized.values[(0, 0)], 0.0);
        assert_eq!(normalized.values[(3, 0)], 1.0);
        assert!((normalized.values[(1, 0)] - 0.25).abs() < 1e-12);
        assert_eq!(normalized.indicators.category(0), OutcomeCategory::Low);
        assert_eq!(normalized.indicators.category(1), OutcomeCategory::Interior);
        assert_eq!(normalized.indicators.category(3), OutcomeCategory::High);
        assert_eq!(normalized.indicators.n_interior(), 3);
    }

    #[test]
    fn normalize_rejects_values_outside_declared_bounds() {
        let raw = Mat::from_fn(3, 1, |i, _| [0.0, 50.0, 101.0][i]);
        let bounds = OutcomeBounds::new(0.0, 100.0).expect("bounds");
        let err = normalize_outcome(&raw, Some(bounds)).expect_err("out of bounds");
        assert_eq!(
            err,
            NormalizeError::OutOfBounds {
                value: 101.0,
                lower: 0.0,
                upper: 100.0
            }
        );
    }

    #[test]
    fn normalize_rejects_constant_and_non_finite_outcomes() {
        let constant = Mat::from_fn(3, 1, |_, _| 4.0);
        assert_eq!(
            normalize_outcome(&constant, None).expect_err("constant"),
            NormalizeError::ConstantOutcome(4.0)
        );
        let with_nan = Mat::from_fn(2, 1, |i, _| if i == 0 { f64::NAN } else { 1.0 });
        assert_eq!(
            normalize_outcome(&with_nan, None).expect_err("nan"),
            NormalizeError::NonFiniteOutcome
        );
        let empty = Mat::<f64>::zeros(0, 1);
        assert_eq!(
            normalize_outcome(&empty, None).expect_err("empty"),
            NormalizeError::EmptyOutcome
        );
    }

    #[test]
    fn outcome_diagnostics_counts_values() {
        let y = Mat::from_fn(6, 1, |row, _| match row {
            0 => -1.0,
            1 => 0.0,
            2 => 0.2,
            3 => 1.0,
            4 => 0.7,
            _ => f64::NAN,
        });
        let diag = outcome_diagnostics(&y);
        assert_eq!(diag.n_rows, 6);
        assert_eq!(diag.n_finite, 5);
        assert_eq!(diag.n_non_finite, 1);
        assert_eq!(diag.n_out_of_range, 1);
        assert_eq!(diag.n_low, 1);
        assert_eq!(diag.n_interior, 2);
        assert_eq!(diag.n_high, 1);
        assert!((diag.low_share - 0.2).abs() < 1e-12);
        assert!((diag.high_share - 0.2).abs() < 1e-12);
    }

    #[test]
    fn constant_columns_finds_intercepts() {
        let x = Mat::from_fn(4, 3, |row, col| match col {
            0 => 1.0,
            1 => usize_to_f64(row),
            _ => 3.0,
        });
        assert_eq!(constant_columns(&x, 1e-12), vec![0, 2]);
        assert!(column_has_variation(&x, 1, 1e-12));
    }
}
