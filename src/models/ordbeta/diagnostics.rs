//! Predictive checks, information criteria, and fit tables.

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::distribution::OrderedBeta;
use super::fit::{coefficient_confidence_intervals, log_likelihood, normal_quantile};
use super::types::{DispersionModel, OrdBetaDraws, OrdBetaError, OrdBetaModel, OrdBetaReport};
use crate::inference::{ParameterSummary, summarize_draws};
use crate::input::ModelInput;
use crate::models::tables::{highlight_cell, make_table, number_cell};
use crate::preprocess::normalize_outcome;
use crate::utils::usize_to_f64;

const PREDICTIVE_ALPHA: f64 = 0.05;

/// Observed statistic against its replicated-data distribution.
#[derive(Debug, Clone, Copy)]
pub struct PredictiveStatistic {
    pub name: &'static str,
    pub observed: f64,
    pub replicated: ParameterSummary,
    /// Share of replications at or above the observed value.
    pub tail_probability: f64,
}

/// Replicated-data check of the three category shares and the outcome mean.
#[derive(Debug, Clone)]
pub struct PredictiveCheck {
    pub low_share: PredictiveStatistic,
    pub interior_share: PredictiveStatistic,
    pub high_share: PredictiveStatistic,
    /// Mean outcome on the original scale.
    pub mean: PredictiveStatistic,
    pub replications: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct ShareStatistics {
    low: f64,
    interior: f64,
    high: f64,
    mean: f64,
}

/// Replicate the outcome once per draw and compare with the observed data.
///
/// # Errors
///
/// Returns `OrdBetaError` if `draws` is empty or the input does not match the model.
pub fn predictive_check(
    model: &OrdBetaModel,
    draws: &OrdBetaDraws,
    input: &ModelInput,
    seed: u64,
) -> Result<PredictiveCheck, OrdBetaError> {
    if draws.is_empty() {
        return Err(OrdBetaError::EmptyDraws);
    }
    input.validate()?;
    let normalized = normalize_outcome(input.outcome(), Some(model.bounds))?;
    let n = input.nrows();
    let n_f = usize_to_f64(n);
    let observed = ShareStatistics {
        low: usize_to_f64(normalized.indicators.n_low()) / n_f,
        interior: usize_to_f64(normalized.indicators.n_interior()) / n_f,
        high: usize_to_f64(normalized.indicators.n_high()) / n_f,
        mean: (0..n).map(|i| input.outcome()[(i, 0)]).sum::<f64>() / n_f,
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut replicated = Vec::with_capacity(draws.len());
    for draw in &draws.models {
        let eta = draw.linear_predictor(input.design_matrix())?;
        let phi = draw.dispersion_values(n, input.dispersion_design())?;
        let (mut n_low, mut n_interior, mut n_high) = (0_usize, 0_usize, 0_usize);
        let mut total = 0.0;
        for i in 0..n {
            let value =
                OrderedBeta::from_linear_predictor(eta[(i, 0)], phi[(i, 0)], draw.cutpoints)?
                    .sample(&mut rng);
            match value {
                v if v <= 0.0 => n_low += 1,
                v if v >= 1.0 => n_high += 1,
                _ => n_interior += 1,
            }
            total += draw.bounds.restore(value);
        }
        replicated.push(ShareStatistics {
            low: usize_to_f64(n_low) / n_f,
            interior: usize_to_f64(n_interior) / n_f,
            high: usize_to_f64(n_high) / n_f,
            mean: total / n_f,
        });
    }

    let statistic = |name: &'static str, pick: fn(&ShareStatistics) -> f64| {
        let values = replicated.iter().map(pick).collect::<Vec<_>>();
        let observed = pick(&observed);
        let at_or_above = values.iter().filter(|value| **value >= observed).count();
        PredictiveStatistic {
            name,
            observed,
            replicated: summarize_draws(&values, PREDICTIVE_ALPHA),
            tail_probability: usize_to_f64(at_or_above) / usize_to_f64(values.len()),
        }
    };

    Ok(PredictiveCheck {
        low_share: statistic("low share", |s| s.low),
        interior_share: statistic("interior share", |s| s.interior),
        high_share: statistic("high share", |s| s.high),
        mean: statistic("mean", |s| s.mean),
        replications: draws.len(),
    })
}

#[derive(Debug, Clone, Copy)]
pub struct InformationCriteria {
    pub loglik: f64,
    pub aic: f64,
    /// `NaN` for a single observation.
    pub bic: f64,
    pub n_parameters: usize,
}

#[must_use]
pub fn compute_information_criteria(loglik: f64, k: usize, n: usize) -> InformationCriteria {
    let k_f = usize_to_f64(k);
    let n_f = usize_to_f64(n);
    let aic = (-2.0f64).mul_add(loglik, 2.0 * k_f);
    let bic = if n > 1 {
        (-2.0f64).mul_add(loglik, n_f.ln() * k_f)
    } else {
        f64::NAN
    };
    InformationCriteria {
        loglik,
        aic,
        bic,
        n_parameters: k,
    }
}

/// AIC and BIC from the log-likelihood at the mode.
#[must_use]
pub fn information_criteria(model: &OrdBetaModel, report: &OrdBetaReport) -> InformationCriteria {
    compute_information_criteria(report.log_likelihood, model.n_parameters(), report.n_obs)
}

/// Information criteria for a fitted model on new data.
///
/// # Errors
///
/// Returns `OrdBetaError` if the log-likelihood cannot be evaluated.
pub fn information_criteria_for_input(
    model: &OrdBetaModel,
    input: &ModelInput,
) -> Result<InformationCriteria, OrdBetaError> {
    let loglik = log_likelihood(model, input)?;
    Ok(compute_information_criteria(
        loglik,
        model.n_parameters(),
        input.nrows(),
    ))
}

/// Coefficient table with standard errors and 95% Wald intervals.
///
/// Rows whose interval excludes zero are highlighted.
#[must_use]
pub fn render_fit_table(model: &OrdBetaModel, report: &OrdBetaReport) -> String {
    let intervals = coefficient_confidence_intervals(
        &model.parameter_vector(),
        &report.covariance,
        PREDICTIVE_ALPHA,
    );
    let n_beta = model.beta.nrows();
    let mut table = make_table(&["parameter", "estimate", "std. error", "lower 95%", "upper 95%"]);

    let mut add_row = |name: String, estimate: f64, se: f64, bounds: Option<(f64, f64)>| {
        let (lower, upper) = bounds.unwrap_or((f64::NAN, f64::NAN));
        let excludes_zero = lower > 0.0 || upper < 0.0;
        table.add_row(vec![
            comfy_table::Cell::new(name),
            highlight_cell(estimate, 4, excludes_zero),
            number_cell(se, 4),
            number_cell(lower, 4),
            number_cell(upper, 4),
        ]);
    };

    for j in 0..n_beta {
        add_row(
            format!("beta[{j}]"),
            model.beta[(j, 0)],
            report.se_beta[(j, 0)],
            Some((intervals[j].lower, intervals[j].upper)),
        );
    }
    match model.dispersion_model {
        DispersionModel::Constant => {
            let phi = model.dispersion[(0, 0)].exp();
            let log_interval = intervals[n_beta];
            add_row(
                "phi".to_string(),
                phi,
                report.se_phi.unwrap_or(f64::NAN),
                Some((log_interval.lower.exp(), log_interval.upper.exp())),
            );
        }
        DispersionModel::Regression => {
            for k in 0..model.dispersion.nrows() {
                add_row(
                    format!("phi_coef[{k}]"),
                    model.dispersion[(k, 0)],
                    report.se_dispersion[(k, 0)],
                    Some((intervals[n_beta + k].lower, intervals[n_beta + k].upper)),
                );
            }
        }
    }
    let low_interval = intervals[n_beta + model.dispersion.nrows()];
    add_row(
        "cutpoint low".to_string(),
        model.cutpoints.low,
        report.se_cutpoints.low,
        Some((low_interval.lower, low_interval.upper)),
    );
    let half_width = normal_quantile(1.0 - PREDICTIVE_ALPHA / 2.0) * report.se_cutpoints.high;
    add_row(
        "cutpoint high".to_string(),
        model.cutpoints.high,
        report.se_cutpoints.high,
        Some((model.cutpoints.high - half_width, model.cutpoints.high + half_width)),
    );
    table.to_string()
}

/// Rendered predictive check.
#[must_use]
pub fn render_predictive_check(check: &PredictiveCheck) -> String {
    let mut table = make_table(&["statistic", "observed", "replicated mean", "lower", "upper"]);
    for stat in [
        &check.low_share,
        &check.interior_share,
        &check.high_share,
        &check.mean,
    ] {
        let outside =
            stat.observed < stat.replicated.lower || stat.observed > stat.replicated.upper;
        table.add_row(vec![
            comfy_table::Cell::new(stat.name),
            highlight_cell(stat.observed, 4, outside),
            number_cell(stat.replicated.mean, 4),
            number_cell(stat.replicated.lower, 4),
            number_cell(stat.replicated.upper, 4),
        ]);
    }
    table.to_string()
}
