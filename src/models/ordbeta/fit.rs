//! Posterior-mode estimation for ordered beta regression.
//!
//! The fit maximizes the log posterior over the unconstrained vector
//! `[beta, dispersion, low cut, log gap]` with damped Newton steps. The
//! gradient is analytic; the Hessian is a central difference of the gradient.
//! Uncertainty comes from the Laplace approximation at the mode.

use faer::Mat;
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info, warn};

use super::distribution::{
    Cutpoints, clamp_probability, log_likelihood_eta, logit, observation_gradient,
};
use super::priors::{
    CoefficientPrior, OrdBetaPriorConfig, induced_dirichlet_gradient,
    induced_dirichlet_log_density, log_exponential_density_log_scale,
    log_exponential_density_log_scale_gradient,
};
use super::types::{
    CutpointStandardErrors, DispersionModel, FitOptions, OrdBetaDraws, OrdBetaError,
    OrdBetaModel, OrdBetaReport,
};
use crate::inference::{DrawConfig, multivariate_normal_draws};
use crate::input::ModelInput;
use crate::preprocess::{NormalizedOutcome, column_has_variation, normalize_outcome};
use crate::utils::{
    cholesky_lower, diag_sqrt, invert_matrix, max_abs, mean_slice, solve_linear_system,
    std_slice, symmetrize, usize_to_f64,
};

const MAX_BACKTRACK: usize = 40;
const ARMIJO: f64 = 1e-4;
const MAX_STEP: f64 = 5.0;
const STALL_GRADIENT: f64 = 1e-3;
const CONSTANT_TOLERANCE: f64 = 1e-12;
const MIN_CUT_GAP: f64 = 0.1;

/// Wald confidence interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// Fit an ordered beta regression.
///
/// The outcome is normalized onto `[0, 1]` (using `options.true_bounds` when
/// set), default priors are applied, and the posterior mode is located.
///
/// # Errors
///
/// Returns `OrdBetaError` if inputs or options are invalid, the outcome cannot be
/// normalized, or a linear solve fails.
///
/// # Examples
///
/// ```
/// use faer::Mat;
/// use ordered_beta_models::{FitOptions, ModelInput, fit_ordbeta_input};
///
/// let x = Mat::from_fn(8, 1, |_, _| 1.0);
/// let y = Mat::from_fn(8, 1, |i, _| [0.0, 0.2, 0.35, 0.5, 0.5, 0.65, 0.8, 1.0][i]);
/// let input = ModelInput::new(x, y);
///
/// let (model, report) = fit_ordbeta_input(&input, FitOptions::default()).expect("fit");
/// assert!(model.cutpoints.low < model.cutpoints.high);
/// assert_eq!(report.n_low, 1);
/// ```
pub fn fit_ordbeta_input(
    input: &ModelInput,
    options: FitOptions,
) -> Result<(OrdBetaModel, OrdBetaReport), OrdBetaError> {
    input.validate()?;
    options.validate()?;

    let normalized = normalize_outcome(input.outcome(), options.true_bounds)?;
    let dispersion_model = if input.dispersion_design().is_some() {
        DispersionModel::Regression
    } else {
        DispersionModel::Constant
    };
    let indicators = &normalized.indicators;
    if indicators.n_low() == 0 {
        warn!("no observations at the lower bound; the lower cutpoint is identified by its prior only");
    }
    if indicators.n_high() == 0 {
        warn!("no observations at the upper bound; the upper cutpoint is identified by its prior only");
    }

    let objective = Objective::new(input, &normalized.values, options.priors);
    let start = starting_values(&objective, &normalized);
    let mode = maximize(&objective, start, options)?;

    let information = symmetrize(&negate(&objective.hessian(&mode.theta)));
    let covariance = laplace_covariance(&information, options.initial_damping)?;
    let se = diag_sqrt(&covariance);

    let template = OrdBetaModel {
        beta: Mat::zeros(objective.n_beta, 1),
        dispersion: Mat::zeros(objective.n_disp, 1),
        cutpoints: Cutpoints::default(),
        bounds: normalized.bounds,
        dispersion_model,
    };
    let model = template.with_parameter_vector(&mode.theta);

    let low_idx = objective.n_beta + objective.n_disp;
    let gap = mode.theta[(low_idx + 1, 0)].exp();
    let high_variance = (gap * gap).mul_add(
        covariance[(low_idx + 1, low_idx + 1)],
        (2.0 * gap).mul_add(covariance[(low_idx, low_idx + 1)], covariance[(low_idx, low_idx)]),
    );
    let se_phi = model.phi().map(|phi| phi * se[(objective.n_beta, 0)]);

    info!(
        iterations = mode.iterations,
        converged = mode.converged,
        log_posterior = mode.value,
        "ordered beta fit finished"
    );

    let report = OrdBetaReport {
        iterations: mode.iterations,
        converged: mode.converged,
        gradient_max: mode.gradient_max,
        log_likelihood: objective.log_likelihood(&mode.theta),
        log_posterior: mode.value,
        se_beta: Mat::from_fn(objective.n_beta, 1, |i, _| se[(i, 0)]),
        se_dispersion: Mat::from_fn(objective.n_disp, 1, |i, _| se[(objective.n_beta + i, 0)]),
        se_cutpoints: CutpointStandardErrors {
            low: se[(low_idx, 0)],
            high: high_variance.max(0.0).sqrt(),
        },
        se_phi,
        covariance,
        n_obs: input.nrows(),
        n_low: indicators.n_low(),
        n_interior: indicators.n_interior(),
        n_high: indicators.n_high(),
    };
    Ok((model, report))
}

/// Fit and return `options.draws` normal-approximation draws from the mode.
///
/// # Errors
///
/// Returns `OrdBetaError` if fitting fails or the draw count is zero.
pub fn fit_ordbeta_input_with_draws(
    input: &ModelInput,
    options: FitOptions,
) -> Result<(OrdBetaModel, OrdBetaReport, OrdBetaDraws), OrdBetaError> {
    let (model, report) = fit_ordbeta_input(input, options)?;
    let draws = approximate_posterior_draws(
        &model,
        &report,
        DrawConfig {
            draws: options.draws,
            seed: options.seed,
        },
    )?;
    Ok((model, report, draws))
}

/// Draw parameter sets from the Laplace approximation of a fitted model.
///
/// # Errors
///
/// Returns `OrdBetaError::Inference` if the configuration is invalid or the
/// covariance has no Cholesky factor.
pub fn approximate_posterior_draws(
    model: &OrdBetaModel,
    report: &OrdBetaReport,
    config: DrawConfig,
) -> Result<OrdBetaDraws, OrdBetaError> {
    let mean = model.parameter_vector();
    let draws = multivariate_normal_draws(&mean, &report.covariance, config)?;
    Ok(OrdBetaDraws {
        models: draws
            .iter()
            .map(|theta| model.with_parameter_vector(theta))
            .collect(),
    })
}

/// Weighted log-likelihood of `input` under a fitted model.
///
/// The outcome is rescaled with the bounds stored in the model.
///
/// # Errors
///
/// Returns `OrdBetaError` if the input is malformed or leaves the model bounds.
pub fn log_likelihood(model: &OrdBetaModel, input: &ModelInput) -> Result<f64, OrdBetaError> {
    input.validate()?;
    let normalized = normalize_outcome(input.outcome(), Some(model.bounds))?;
    let eta = model.linear_predictor(input.design_matrix())?;
    let phi = model.dispersion_values(input.nrows(), input.dispersion_design())?;
    Ok((0..input.nrows())
        .map(|i| {
            let weight = input.sample_weights().map_or(1.0, |w| w[(i, 0)]);
            weight
                * log_likelihood_eta(
                    normalized.values[(i, 0)],
                    eta[(i, 0)],
                    phi[(i, 0)],
                    model.cutpoints,
                )
        })
        .sum())
}

/// Wald intervals for coefficients given their covariance block.
#[must_use]
pub fn coefficient_confidence_intervals(
    beta: &Mat<f64>,
    cov: &Mat<f64>,
    alpha: f64,
) -> Vec<ConfidenceInterval> {
    let z = normal_quantile(1.0 - alpha / 2.0);
    (0..beta.nrows())
        .map(|i| {
            let se = cov[(i, i)].max(0.0).sqrt();
            ConfidenceInterval {
                lower: beta[(i, 0)] - z * se,
                upper: beta[(i, 0)] + z * se,
            }
        })
        .collect()
}

pub(crate) fn normal_quantile(p: f64) -> f64 {
    Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| normal.inverse_cdf(p))
}

/// Log posterior over the unconstrained parameter vector.
struct Objective<'a> {
    x: &'a Mat<f64>,
    z: Option<&'a Mat<f64>>,
    y: &'a Mat<f64>,
    weights: Option<&'a Mat<f64>>,
    priors: OrdBetaPriorConfig,
    beta_priors: Vec<CoefficientPrior>,
    n_beta: usize,
    n_disp: usize,
}

impl<'a> Objective<'a> {
    fn new(input: &'a ModelInput, y: &'a Mat<f64>, priors: OrdBetaPriorConfig) -> Self {
        let x = input.design_matrix();
        let beta_priors = (0..x.ncols())
            .map(|col| {
                if is_intercept_column(x, col) {
                    priors.intercept_prior()
                } else {
                    priors.coefficient_prior()
                }
            })
            .collect();
        let z = input.dispersion_design();
        Self {
            x,
            z,
            y,
            weights: input.sample_weights(),
            priors,
            beta_priors,
            n_beta: x.ncols(),
            n_disp: z.map_or(1, |z| z.ncols()),
        }
    }

    const fn dim(&self) -> usize {
        self.n_beta + self.n_disp + 2
    }

    fn cutpoints(&self, theta: &Mat<f64>) -> Cutpoints {
        let idx = self.n_beta + self.n_disp;
        Cutpoints::from_unconstrained(theta[(idx, 0)], theta[(idx + 1, 0)])
    }

    fn weight(&self, row: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[(row, 0)])
    }

    fn eta(&self, theta: &Mat<f64>, row: usize) -> f64 {
        (0..self.n_beta).fold(0.0, |acc, col| {
            self.x[(row, col)].mul_add(theta[(col, 0)], acc)
        })
    }

    fn log_phi(&self, theta: &Mat<f64>, row: usize) -> f64 {
        self.z.map_or(theta[(self.n_beta, 0)], |z| {
            (0..self.n_disp).fold(0.0, |acc, col| {
                z[(row, col)].mul_add(theta[(self.n_beta + col, 0)], acc)
            })
        })
    }

    fn log_likelihood(&self, theta: &Mat<f64>) -> f64 {
        let cutpoints = self.cutpoints(theta);
        (0..self.y.nrows())
            .map(|row| {
                self.weight(row)
                    * log_likelihood_eta(
                        self.y[(row, 0)],
                        self.eta(theta, row),
                        self.log_phi(theta, row).exp(),
                        cutpoints,
                    )
            })
            .sum()
    }

    fn log_prior(&self, theta: &Mat<f64>) -> f64 {
        let beta = self
            .beta_priors
            .iter()
            .enumerate()
            .map(|(col, prior)| prior.log_density(theta[(col, 0)]))
            .sum::<f64>();
        let dispersion = if self.z.is_some() {
            let prior = self.priors.dispersion_coefficient_prior();
            (0..self.n_disp)
                .map(|k| prior.log_density(theta[(self.n_beta + k, 0)]))
                .sum::<f64>()
        } else {
            log_exponential_density_log_scale(theta[(self.n_beta, 0)], self.priors.phi_prior_rate)
        };
        beta + dispersion
            + induced_dirichlet_log_density(self.cutpoints(theta), self.priors.dirichlet_prior)
    }

    fn log_posterior(&self, theta: &Mat<f64>) -> f64 {
        let value = self.log_likelihood(theta) + self.log_prior(theta);
        if value.is_nan() {
            f64::NEG_INFINITY
        } else {
            value
        }
    }

    fn gradient(&self, theta: &Mat<f64>) -> Mat<f64> {
        let mut grad = Mat::<f64>::zeros(self.dim(), 1);
        let cutpoints = self.cutpoints(theta);
        let low_idx = self.n_beta + self.n_disp;
        let gap = cutpoints.high - cutpoints.low;

        for row in 0..self.y.nrows() {
            let weight = self.weight(row);
            let phi = self.log_phi(theta, row).exp();
            let g = observation_gradient(self.y[(row, 0)], self.eta(theta, row), phi, cutpoints);
            for col in 0..self.n_beta {
                grad[(col, 0)] += weight * g.eta * self.x[(row, col)];
            }
            let d_log_phi = weight * g.phi * phi;
            match self.z {
                Some(z) => {
                    for col in 0..self.n_disp {
                        grad[(self.n_beta + col, 0)] += d_log_phi * z[(row, col)];
                    }
                }
                None => grad[(self.n_beta, 0)] += d_log_phi,
            }
            grad[(low_idx, 0)] += weight * (g.low + g.high);
            grad[(low_idx + 1, 0)] += weight * g.high * gap;
        }

        for (col, prior) in self.beta_priors.iter().enumerate() {
            grad[(col, 0)] += prior.gradient(theta[(col, 0)]);
        }
        if self.z.is_some() {
            let prior = self.priors.dispersion_coefficient_prior();
            for k in 0..self.n_disp {
                grad[(self.n_beta + k, 0)] += prior.gradient(theta[(self.n_beta + k, 0)]);
            }
        } else {
            grad[(self.n_beta, 0)] += log_exponential_density_log_scale_gradient(
                theta[(self.n_beta, 0)],
                self.priors.phi_prior_rate,
            );
        }
        let (d_low, d_gap) = induced_dirichlet_gradient(cutpoints, self.priors.dirichlet_prior);
        grad[(low_idx, 0)] += d_low;
        grad[(low_idx + 1, 0)] += d_gap;
        grad
    }

    fn hessian(&self, theta: &Mat<f64>) -> Mat<f64> {
        let dim = self.dim();
        let mut hessian = Mat::<f64>::zeros(dim, dim);
        for col in 0..dim {
            let step = 1e-5 * theta[(col, 0)].abs().max(1.0);
            let mut forward = theta.clone();
            forward[(col, 0)] += step;
            let mut backward = theta.clone();
            backward[(col, 0)] -= step;
            let upper = self.gradient(&forward);
            let lower = self.gradient(&backward);
            for row in 0..dim {
                hessian[(row, col)] = (upper[(row, 0)] - lower[(row, 0)]) / (2.0 * step);
            }
        }
        symmetrize(&hessian)
    }
}

fn is_intercept_column(x: &Mat<f64>, col: usize) -> bool {
    x.nrows() > 0
        && !column_has_variation(x, col, CONSTANT_TOLERANCE)
        && x[(0, col)].abs() > CONSTANT_TOLERANCE
}

/// Start at the empirical bound shares and a moment estimate of `phi`.
fn starting_values(objective: &Objective<'_>, normalized: &NormalizedOutcome) -> Mat<f64> {
    let y = &normalized.values;
    let n_f = usize_to_f64(y.nrows());
    let interior = (0..y.nrows())
        .map(|i| y[(i, 0)])
        .filter(|value| *value > 0.0 && *value < 1.0)
        .collect::<Vec<_>>();
    let interior_mean = if interior.is_empty() {
        0.5
    } else {
        clamp_probability(mean_slice(&interior))
    };

    let mut theta = Mat::<f64>::zeros(objective.dim(), 1);
    let anchor = match (0..objective.n_beta).find(|&col| is_intercept_column(objective.x, col)) {
        Some(col) => {
            let eta = logit(interior_mean);
            theta[(col, 0)] = eta / objective.x[(0, col)];
            eta
        }
        None => 0.0,
    };

    let low_share = (usize_to_f64(normalized.indicators.n_low()) + 0.5) / (n_f + 1.5);
    let high_share = (usize_to_f64(normalized.indicators.n_high()) + 0.5) / (n_f + 1.5);
    let low = anchor - logit(1.0 - low_share);
    let high = (anchor - logit(high_share)).max(low + MIN_CUT_GAP);
    let low_idx = objective.n_beta + objective.n_disp;
    theta[(low_idx, 0)] = low;
    theta[(low_idx + 1, 0)] = (high - low).ln();

    let spread = std_slice(&interior);
    let phi = if interior.len() >= 2 && spread > 0.0 {
        (interior_mean * (1.0 - interior_mean) / (spread * spread) - 1.0).clamp(0.5, 500.0)
    } else {
        2.0
    };
    match objective.z {
        Some(z) => {
            if let Some(col) = (0..objective.n_disp).find(|&col| is_intercept_column(z, col)) {
                theta[(objective.n_beta + col, 0)] = phi.ln() / z[(0, col)];
            }
        }
        None => theta[(objective.n_beta, 0)] = phi.ln(),
    }
    theta
}

struct Mode {
    theta: Mat<f64>,
    value: f64,
    gradient_max: f64,
    iterations: usize,
    converged: bool,
}

fn maximize(
    objective: &Objective<'_>,
    start: Mat<f64>,
    options: FitOptions,
) -> Result<Mode, OrdBetaError> {
    let mut theta = start;
    let mut value = objective.log_posterior(&theta);
    if !value.is_finite() {
        return Err(OrdBetaError::NonFiniteObjective);
    }

    for iteration in 0..options.max_iter {
        let gradient = objective.gradient(&theta);
        let gradient_max = max_abs(&gradient);
        if gradient_max < options.gradient_tolerance {
            return Ok(Mode {
                theta,
                value,
                gradient_max,
                iterations: iteration,
                converged: true,
            });
        }

        let information = negate(&objective.hessian(&theta));
        let mut step = damped_newton_step(&information, &gradient, options.initial_damping)?;
        let step_size = max_abs(&step);
        if step_size > MAX_STEP {
            step = Mat::from_fn(step.nrows(), 1, |i, _| step[(i, 0)] * MAX_STEP / step_size);
        }
        let slope = (0..step.nrows())
            .map(|i| gradient[(i, 0)] * step[(i, 0)])
            .sum::<f64>();

        let mut scale = 1.0_f64;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACK {
            let candidate =
                Mat::from_fn(theta.nrows(), 1, |i, _| scale.mul_add(step[(i, 0)], theta[(i, 0)]));
            let candidate_value = objective.log_posterior(&candidate);
            if candidate_value.is_finite()
                && candidate_value >= (ARMIJO * scale).mul_add(slope, value)
            {
                accepted = Some((candidate, candidate_value));
                break;
            }
            scale *= 0.5;
        }

        let Some((candidate, candidate_value)) = accepted else {
            // No ascent left at floating-point resolution.
            let converged = gradient_max < STALL_GRADIENT;
            if !converged {
                warn!(
                    iteration,
                    gradient_max, "line search failed; ordered beta fit did not converge"
                );
            }
            return Ok(Mode {
                theta,
                value,
                gradient_max,
                iterations: iteration + 1,
                converged,
            });
        };

        let step_max = scale * max_abs(&step);
        debug!(
            iteration,
            log_posterior = candidate_value,
            gradient_max,
            step_max,
            "newton iteration"
        );
        theta = candidate;
        value = candidate_value;
        if step_max < options.tolerance {
            let gradient_max = max_abs(&objective.gradient(&theta));
            return Ok(Mode {
                theta,
                value,
                gradient_max,
                iterations: iteration + 1,
                converged: true,
            });
        }
    }

    let gradient_max = max_abs(&objective.gradient(&theta));
    warn!(
        max_iter = options.max_iter,
        gradient_max, "ordered beta fit did not converge"
    );
    Ok(Mode {
        theta,
        value,
        gradient_max,
        iterations: options.max_iter,
        converged: false,
    })
}

/// Solve `(information + lambda * I) step = gradient`, raising `lambda` until
/// the shifted matrix is positive definite.
fn damped_newton_step(
    information: &Mat<f64>,
    gradient: &Mat<f64>,
    initial_damping: f64,
) -> Result<Mat<f64>, OrdBetaError> {
    let damped = positive_definite_shift(information, initial_damping)?;
    solve_linear_system(&damped, gradient)
}

fn laplace_covariance(
    information: &Mat<f64>,
    initial_damping: f64,
) -> Result<Mat<f64>, OrdBetaError> {
    if cholesky_lower(information).is_none() {
        warn!("negative Hessian is not positive definite at the mode; covariance is regularized");
    }
    let regularized = positive_definite_shift(information, initial_damping)?;
    Ok(symmetrize(&invert_matrix(&regularized)?))
}

fn positive_definite_shift(
    matrix: &Mat<f64>,
    initial_damping: f64,
) -> Result<Mat<f64>, OrdBetaError> {
    let dim = matrix.nrows();
    let scale = (0..dim)
        .map(|i| matrix[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let mut damping = 0.0;
    for _ in 0..16 {
        let shifted = Mat::from_fn(dim, dim, |i, j| {
            if i == j {
                matrix[(i, j)] + damping
            } else {
                matrix[(i, j)]
            }
        });
        if cholesky_lower(&shifted).is_some() {
            return Ok(shifted);
        }
        damping = if damping == 0.0 {
            initial_damping * scale
        } else {
            damping * 10.0
        };
    }
    Err(OrdBetaError::SolveFailed)
}

fn negate(matrix: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(matrix.nrows(), matrix.ncols(), |i, j| -matrix[(i, j)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ordbeta::distribution::{OrderedBeta, sample_standard_normal};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn simulated_input(n: usize, seed: u64) -> ModelInput {
        let mut rng = StdRng::seed_from_u64(seed);
        let covariate = (0..n)
            .map(|_| sample_standard_normal(&mut rng))
            .collect::<Vec<_>>();
        let cutpoints = Cutpoints::new(-1.5, 1.5).expect("cuts");
        let outcome = covariate
            .iter()
            .map(|value| {
                OrderedBeta::from_linear_predictor(0.8f64.mul_add(*value, 0.3), 4.0, cutpoints)
                    .expect("dist")
                    .sample(&mut rng)
            })
            .collect::<Vec<_>>();
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { covariate[i] });
        let y = Mat::from_fn(n, 1, |i, _| outcome[i]);
        ModelInput::new(x, y)
    }

    fn unit_bounds() -> FitOptions {
        FitOptions {
            true_bounds: Some(crate::preprocess::OutcomeBounds::default()),
            ..FitOptions::default()
        }
    }

    fn assert_gradient_matches(objective: &Objective<'_>, theta: &Mat<f64>) {
        let gradient = objective.gradient(theta);
        let h = 1e-6;
        for i in 0..objective.dim() {
            let mut forward = theta.clone();
            forward[(i, 0)] += h;
            let mut backward = theta.clone();
            backward[(i, 0)] -= h;
            let numeric = (objective.log_posterior(&forward)
                - objective.log_posterior(&backward))
                / (2.0 * h);
            assert_relative_eq!(gradient[(i, 0)], numeric, epsilon = 1e-4, max_relative = 1e-5);
        }
    }

    #[test]
    fn analytic_gradient_matches_finite_differences() {
        let input = simulated_input(60, 3);
        let normalized = normalize_outcome(input.outcome(), None).expect("normalize");
        let objective = Objective::new(&input, &normalized.values, OrdBetaPriorConfig::default());
        let theta = Mat::from_fn(objective.dim(), 1, |i, _| [0.2, 0.5, 1.1, -1.2, 0.9][i]);
        assert_gradient_matches(&objective, &theta);
    }

    #[test]
    fn dispersion_slope_gradient_matches_finite_differences() {
        let base = simulated_input(80, 4);
        let z = Mat::from_fn(80, 2, |i, j| {
            if j == 0 {
                1.0
            } else {
                base.design_matrix()[(i, 1)]
            }
        });
        let weights = Mat::from_fn(80, 1, |i, _| if i % 4 == 0 { 2.0 } else { 1.0 });
        let input = base.with_dispersion_design(z).with_sample_weights(weights);
        let normalized = normalize_outcome(input.outcome(), None).expect("normalize");
        let objective = Objective::new(&input, &normalized.values, OrdBetaPriorConfig::default());
        assert_eq!(objective.dim(), 6);
        let theta = Mat::from_fn(6, 1, |i, _| [0.2, 0.5, 1.1, -0.4, -1.2, 0.9][i]);
        assert_gradient_matches(&objective, &theta);
    }

    #[test]
    fn starting_values_place_log_phi_on_the_dispersion_intercept() {
        let base = simulated_input(300, 6);
        let z = Mat::from_fn(300, 2, |i, j| {
            if j == 1 {
                1.0
            } else {
                base.design_matrix()[(i, 1)]
            }
        });
        let normalized = normalize_outcome(base.outcome(), None).expect("normalize");
        let priors = OrdBetaPriorConfig::default();
        let constant_objective = Objective::new(&base, &normalized.values, priors);
        let constant = starting_values(&constant_objective, &normalized);
        let input = base.clone().with_dispersion_design(z);
        let objective = Objective::new(&input, &normalized.values, priors);
        let theta = starting_values(&objective, &normalized);
        assert_relative_eq!(theta[(2, 0)], 0.0);
        assert_relative_eq!(theta[(3, 0)], constant[(2, 0)], epsilon = 1e-12);
        assert!(theta[(3, 0)].is_finite());
    }

    #[test]
    fn fit_recovers_generating_parameters() {
        let input = simulated_input(2_000, 11);
        let (model, report) = fit_ordbeta_input(&input, unit_bounds()).expect("fit");
        assert!(report.converged);
        assert_relative_eq!(model.beta[(0, 0)], 0.3, epsilon = 0.15);
        assert_relative_eq!(model.beta[(1, 0)], 0.8, epsilon = 0.15);
        assert_relative_eq!(model.cutpoints.low, -1.5, epsilon = 0.3);
        assert_relative_eq!(model.cutpoints.high, 1.5, epsilon = 0.3);
        assert_relative_eq!(model.phi().expect("constant"), 4.0, epsilon = 0.8);
        assert!(report.se_beta[(1, 0)] > 0.0 && report.se_beta[(1, 0)] < 0.1);
    }

    #[test]
    fn fit_reports_bound_counts() {
        let input = simulated_input(300, 5);
        let (_, report) = fit_ordbeta_input(&input, unit_bounds()).expect("fit");
        assert_eq!(report.n_low + report.n_interior + report.n_high, 300);
        assert!(report.n_low > 0 && report.n_high > 0);
        assert_eq!(report.covariance.nrows(), 5);
    }

    #[test]
    fn draws_centre_on_the_mode() {
        let input = simulated_input(400, 9);
        let options = FitOptions {
            draws: 2_000,
            ..unit_bounds()
        };
        let (model, _, draws) = fit_ordbeta_input_with_draws(&input, options).expect("fit");
        assert_eq!(draws.len(), 2_000);
        let mean_slope =
            draws.models.iter().map(|m| m.beta[(1, 0)]).sum::<f64>() / usize_to_f64(draws.len());
        assert_relative_eq!(mean_slope, model.beta[(1, 0)], epsilon = 0.02);
    }

    #[test]
    fn dispersion_regression_is_supported() {
        let base = simulated_input(500, 21);
        let z = Mat::from_fn(500, 1, |_, _| 1.0);
        let input = base.with_dispersion_design(z);
        let (model, report) = fit_ordbeta_input(&input, unit_bounds()).expect("fit");
        assert_eq!(model.dispersion_model, DispersionModel::Regression);
        assert!(report.se_phi.is_none());
        assert_relative_eq!(model.dispersion[(0, 0)].exp(), 4.0, epsilon = 1.2);
    }

    #[test]
    fn dispersion_regression_recovers_log_phi_slope() {
        let n = 3_000;
        let mut rng = StdRng::seed_from_u64(37);
        let cutpoints = Cutpoints::new(-1.5, 1.5).expect("cuts");
        let x1 = (0..n)
            .map(|_| sample_standard_normal(&mut rng))
            .collect::<Vec<_>>();
        let w1 = (0..n)
            .map(|_| sample_standard_normal(&mut rng))
            .collect::<Vec<_>>();
        let outcome = (0..n)
            .map(|i| {
                let phi = 0.8f64.mul_add(w1[i], 1.5).exp();
                OrderedBeta::from_linear_predictor(0.6f64.mul_add(x1[i], 0.2), phi, cutpoints)
                    .expect("dist")
                    .sample(&mut rng)
            })
            .collect::<Vec<_>>();
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x1[i] });
        let z = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { w1[i] });
        let y = Mat::from_fn(n, 1, |i, _| outcome[i]);
        let input = ModelInput::new(x, y).with_dispersion_design(z);

        let (model, report) = fit_ordbeta_input(&input, unit_bounds()).expect("fit");
        assert!(report.converged);
        assert_eq!(model.dispersion.nrows(), 2);
        assert_relative_eq!(model.dispersion[(0, 0)], 1.5, epsilon = 0.15);
        assert_relative_eq!(model.dispersion[(1, 0)], 0.8, epsilon = 0.15);
        assert_relative_eq!(model.beta[(1, 0)], 0.6, epsilon = 0.1);
        for k in 0..2 {
            let se = report.se_dispersion[(k, 0)];
            assert!(se > 0.0 && se < 0.1, "se {se}");
        }
    }

    #[test]
    fn doubled_weights_match_duplicated_rows() {
        let base = simulated_input(250, 13);
        let repeated = (0..250).filter(|i| i % 3 == 0).collect::<Vec<_>>();
        let rows = (0..250).chain(repeated.iter().copied()).collect::<Vec<_>>();
        let duplicated = ModelInput::new(
            Mat::from_fn(rows.len(), 2, |i, j| base.design_matrix()[(rows[i], j)]),
            Mat::from_fn(rows.len(), 1, |i, _| base.outcome()[(rows[i], 0)]),
        );
        let weights = Mat::from_fn(250, 1, |i, _| if i % 3 == 0 { 2.0 } else { 1.0 });
        let weighted = base.with_sample_weights(weights);

        let (by_weight, weight_report) = fit_ordbeta_input(&weighted, unit_bounds()).expect("fit");
        let (by_copy, copy_report) = fit_ordbeta_input(&duplicated, unit_bounds()).expect("fit");
        assert!(weight_report.converged && copy_report.converged);
        for j in 0..2 {
            assert_relative_eq!(by_weight.beta[(j, 0)], by_copy.beta[(j, 0)], epsilon = 1e-6);
        }
        assert_relative_eq!(
            by_weight.dispersion[(0, 0)],
            by_copy.dispersion[(0, 0)],
            epsilon = 1e-6
        );
        assert_relative_eq!(by_weight.cutpoints.low, by_copy.cutpoints.low, epsilon = 1e-6);
        assert_relative_eq!(by_weight.cutpoints.high, by_copy.cutpoints.high, epsilon = 1e-6);
        assert_relative_eq!(
            weight_report.log_likelihood,
            copy_report.log_likelihood,
            epsilon = 1e-6
        );
    }

    #[test]
    fn log_likelihood_matches_report() {
        let input = simulated_input(200, 2);
        let (model, report) = fit_ordbeta_input(&input, unit_bounds()).expect("fit");
        let value = log_likelihood(&model, &input).expect("ll");
        assert_relative_eq!(value, report.log_likelihood, epsilon = 1e-8);
    }

    #[test]
    fn wald_intervals_use_normal_quantile() {
        let beta = Mat::from_fn(1, 1, |_, _| 1.0);
        let cov = Mat::from_fn(1, 1, |_, _| 0.25);
        let intervals = coefficient_confidence_intervals(&beta, &cov, 0.05);
        assert_relative_eq!(intervals[0].lower, 1.0 - 1.959_964 * 0.5, epsilon = 1e-5);
        assert_relative_eq!(intervals[0].upper, 1.0 + 1.959_964 * 0.5, epsilon = 1e-5);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let input = simulated_input(20, 1);
        let options = FitOptions {
            tolerance: -1.0,
            ..FitOptions::default()
        };
        assert!(matches!(
            fit_ordbeta_input(&input, options),
            Err(OrdBetaError::InvalidTolerance)
        ));
    }
}
