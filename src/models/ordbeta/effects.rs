//! Average marginal effects on the original outcome scale.

use faer::Mat;

use super::distribution::{expected_value, expected_value_derivative};
use super::types::{OrdBetaDraws, OrdBetaError, OrdBetaModel};
use crate::inference::{ParameterSummary, summarize_draws, validate_alpha};
use crate::input::ModelInput;
use crate::preprocess::column_has_variation;
use crate::utils::usize_to_f64;

/// How a covariate enters the marginal effect calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovariateKind {
    /// Average derivative of the expected outcome.
    Continuous,
    /// Average contrast between `x = 1` and `x = 0`.
    Binary,
}

/// A column holding only zeros and ones (both present) is binary.
#[must_use]
pub fn covariate_kind(x: &Mat<f64>, column: usize) -> CovariateKind {
    let mut has_zero = false;
    let mut has_one = false;
    for row in 0..x.nrows() {
        match x[(row, column)] {
            value if value == 0.0 => has_zero = true,
            value if value == 1.0 => has_one = true,
            _ => return CovariateKind::Continuous,
        }
    }
    if has_zero && has_one {
        CovariateKind::Binary
    } else {
        CovariateKind::Continuous
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarginalEffect {
    /// Column of the mean design.
    pub column: usize,
    pub kind: CovariateKind,
    /// Effect at the fitted mode, on the original scale.
    pub estimate: f64,
    /// Summary over approximation draws; `None` without draws.
    pub summary: Option<ParameterSummary>,
}

/// Average marginal effect of one column for a single parameter set.
///
/// # Errors
///
/// Returns `OrdBetaError` if the design does not match the model.
pub fn average_marginal_effect(
    model: &OrdBetaModel,
    x: &Mat<f64>,
    column: usize,
    kind: CovariateKind,
) -> Result<f64, OrdBetaError> {
    let eta = model.linear_predictor(x)?;
    if column >= x.ncols() {
        return Err(OrdBetaError::DesignCoefficientMismatch {
            design_cols: column + 1,
            coef_len: model.beta.nrows(),
        });
    }
    let slope = model.beta[(column, 0)];
    let n = x.nrows();
    let total = (0..n)
        .map(|row| match kind {
            CovariateKind::Continuous => {
                expected_value_derivative(eta[(row, 0)], model.cutpoints) * slope
            }
            CovariateKind::Binary => {
                let base = (-x[(row, column)]).mul_add(slope, eta[(row, 0)]);
                expected_value(base + slope, model.cutpoints)
                    - expected_value(base, model.cutpoints)
            }
        })
        .sum::<f64>();
    Ok(total / usize_to_f64(n) * model.bounds.width())
}

/// Average marginal effects for every non-constant column of the mean design.
///
/// # Errors
///
/// Returns `OrdBetaError` if `alpha` is outside `(0, 1)` or the design does not
/// match the model.
pub fn average_marginal_effects(
    model: &OrdBetaModel,
    draws: &OrdBetaDraws,
    input: &ModelInput,
    alpha: f64,
) -> Result<Vec<MarginalEffect>, OrdBetaError> {
    validate_alpha(alpha)?;
    let x = input.design_matrix();
    let mut effects = Vec::new();
    for column in (0..x.ncols()).filter(|&col| column_has_variation(x, col, 1e-12)) {
        let kind = covariate_kind(x, column);
        let estimate = average_marginal_effect(model, x, column, kind)?;
        let summary = if draws.is_empty() {
            None
        } else {
            let values = draws
                .models
                .iter()
                .map(|draw| average_marginal_effect(draw, x, column, kind))
                .collect::<Result<Vec<_>, _>>()?;
            Some(summarize_draws(&values, alpha))
        };
        effects.push(MarginalEffect {
            column,
            kind,
            estimate,
            summary,
        });
    }
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ordbeta::distribution::Cutpoints;
    use crate::models::ordbeta::types::DispersionModel;
    use crate::preprocess::OutcomeBounds;
    use approx::assert_relative_eq;

    fn model(bounds: OutcomeBounds) -> OrdBetaModel {
        OrdBetaModel {
            beta: Mat::from_fn(3, 1, |i, _| [0.1, 0.6, -0.4][i]),
            dispersion: Mat::from_fn(1, 1, |_, _| 1.0),
            cutpoints: Cutpoints::new(-1.0, 1.0).expect("cuts"),
            bounds,
            dispersion_model: DispersionModel::Constant,
        }
    }

    fn design() -> Mat<f64> {
        Mat::from_fn(6, 3, |i, j| match j {
            0 => 1.0,
            1 => [-1.2, -0.4, 0.0, 0.3, 0.9, 1.6][i],
            _ => f64::from(u8::from(i % 2 == 0)),
        })
    }

    #[test]
    fn detects_covariate_kinds() {
        let x = design();
        assert_eq!(covariate_kind(&x, 1), CovariateKind::Continuous);
        assert_eq!(covariate_kind(&x, 2), CovariateKind::Binary);
        assert_eq!(covariate_kind(&x, 0), CovariateKind::Continuous);
    }

    #[test]
    fn continuous_effect_matches_numeric_derivative() {
        let model = model(OutcomeBounds::default());
        let x = design();
        let analytic =
            average_marginal_effect(&model, &x, 1, CovariateKind::Continuous).expect("ame");
        let h = 1e-6;
        let shifted = |delta: f64| {
            let moved = Mat::from_fn(6, 3, |i, j| {
                if j == 1 {
                    x[(i, j)] + delta
                } else {
                    x[(i, j)]
                }
            });
            let eta = &moved * &model.beta;
            (0..6)
                .map(|i| expected_value(eta[(i, 0)], model.cutpoints))
                .sum::<f64>()
                / 6.0
        };
        let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
        assert_relative_eq!(analytic, numeric, epsilon = 1e-7);
    }

    #[test]
    fn effects_scale_with_bound_width() {
        let unit = model(OutcomeBounds::default());
        let wide = model(OutcomeBounds::new(0.0, 100.0).expect("bounds"));
        let x = design();
        for kind in [CovariateKind::Continuous, CovariateKind::Binary] {
            let a = average_marginal_effect(&unit, &x, 2, kind).expect("ame");
            let b = average_marginal_effect(&wide, &x, 2, kind).expect("ame");
            assert_relative_eq!(b, 100.0 * a, epsilon = 1e-10);
        }
        let binary = average_marginal_effect(&unit, &x, 2, CovariateKind::Binary).expect("ame");
        assert!(binary < 0.0);
    }

    #[test]
    fn skips_constant_columns_and_summarizes_draws() {
        let model = model(OutcomeBounds::default());
        let x = design();
        let outcome = Mat::from_fn(6, 1, |i, _| [0.0, 0.2, 0.4, 0.5, 0.9, 1.0][i]);
        let input = ModelInput::new(x, outcome);
        let draws = OrdBetaDraws {
            models: vec![model.clone(), model.clone()],
        };
        let effects = average_marginal_effects(&model, &draws, &input, 0.05).expect("effects");
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[0].column, 1);
        assert_eq!(effects[1].kind, CovariateKind::Binary);
        let summary = effects[0].summary.expect("summary");
        assert_relative_eq!(summary.mean, effects[0].estimate, epsilon = 1e-12);

        let none = average_marginal_effects(&model, &OrdBetaDraws::default(), &input, 0.05)
            .expect("effects");
        assert!(none[0].summary.is_none());
        assert!(average_marginal_effects(&model, &draws, &input, 1.5).is_err());
    }
}
