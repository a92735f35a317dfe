/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and statistics utilities for model implementations.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared helpers for solving linear systems, computing summary statistics,
//! and working with faer matrices.

use faer::Mat;
use faer::prelude::Solve;
use num_traits::ToPrimitive;

use crate::models::ordbeta::OrdBetaError;

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[must_use]
pub fn max_abs(values: &Mat<f64>) -> f64 {
    let mut max = 0.0;
    for i in 0..values.nrows() {
        let value = values[(i, 0)].abs();
        if value > max {
            max = value;
        }
    }
    max
}

/// # Errors
///
/// Returns `OrdBetaError::SolveFailed` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, OrdBetaError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(OrdBetaError::SolveFailed);
    }
    Ok(solution)
}

/// Invert a square matrix through an LU solve against the identity.
///
/// # Errors
///
/// Returns `OrdBetaError::SolveFailed` if the inverse is not finite.
pub fn invert_matrix(a: &Mat<f64>) -> Result<Mat<f64>, OrdBetaError> {
    let identity = Mat::<f64>::identity(a.nrows(), a.ncols());
    solve_linear_system(a, &identity)
}

/// Lower Cholesky factor of a symmetric positive definite matrix.
///
/// Returns `None` when the matrix is not square or not positive definite.
#[must_use]
pub fn cholesky_lower(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return None;
    }
    let mut lower = Mat::<f64>::zeros(dim, dim);
    for row in 0..dim {
        for col in 0..=row {
            let mut sum = matrix[(row, col)];
            for k in 0..col {
                sum -= lower[(row, k)] * lower[(col, k)];
            }
            if row == col {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                lower[(row, col)] = sum.sqrt();
            } else {
                let denom = lower[(col, col)];
                if denom <= 0.0 {
                    return None;
                }
                lower[(row, col)] = sum / denom;
            }
        }
    }
    Some(lower)
}

#[must_use]
pub fn diag_sqrt(covariance: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(covariance.nrows(), 1, |i, _| {
        covariance[(i, i)].max(0.0).sqrt()
    })
}

#[must_use]
pub fn symmetrize(matrix: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(matrix.nrows(), matrix.ncols(), |i, j| {
        0.5 * (matrix[(i, j)] + matrix[(j, i)])
    })
}

#[must_use]
pub fn mean_slice(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

/// Sample standard deviation (n - 1 denominator); zero for fewer than two values.
#[must_use]
pub fn std_slice(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_slice(values);
    let sum_sq = values
        .iter()
        .map(|value| {
            let centered = value - mean;
            centered * centered
        })
        .sum::<f64>();
    (sum_sq / (usize_to_f64(values.len()) - 1.0)).max(0.0).sqrt()
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[must_use]
pub fn percentile_index_bounds(alpha: f64, n: usize) -> (usize, usize) {
    let n_f = usize_to_f64(n);
    let lower_idx = ((alpha / 2.0) * n_f).floor().to_usize().unwrap_or(0);
    let upper_idx = ((1.0 - alpha / 2.0) * n_f)
        .ceil()
        .to_usize()
        .unwrap_or(0)
        .saturating_sub(1);
    (lower_idx, upper_idx)
}

/// Percentile interval of `values` at level `1 - alpha`; `(NaN, NaN)` when empty.
#[must_use]
pub fn percentile_interval(values: &[f64], alpha: f64) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (lower_idx, upper_idx) = percentile_index_bounds(alpha, sorted.len());
    let last = sorted.len() - 1;
    (sorted[lower_idx.min(last)], sorted[upper_idx.min(last)])
}
