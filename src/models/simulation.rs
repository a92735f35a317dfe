//! Simulation-based power analysis for ordered beta regression.
//!
//! Each (sample size, replication) task draws covariates and outcomes from a
//! known ordered beta process, optionally refits the model, and records the
//! true and estimated average marginal effects. Tasks carry their own seed, so
//! results do not depend on how many workers run them.

use faer::Mat;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use super::ordbeta::distribution::{
    Cutpoints, DistributionError, OrderedBeta, sample_standard_normal,
};
use super::ordbeta::effects::{CovariateKind, average_marginal_effect};
use super::ordbeta::fit::fit_ordbeta_input_with_draws;
use super::ordbeta::types::{DispersionModel, FitOptions, OrdBetaError, OrdBetaModel};
use super::tables::{highlight_cell, make_table, number_cell};
use crate::inference::{InferenceError, summarize_draws, validate_alpha};
use crate::input::ModelInput;
use crate::preprocess::OutcomeBounds;
use crate::utils::{mean_slice, usize_to_f64};

/// Errors raised by the power simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("at least one sample size is required")]
    EmptySampleSizes,
    #[error("sample size must be at least 2, got {0}")]
    InvalidSampleSize(usize),
    #[error("at least one covariate is required")]
    NoCovariates,
    #[error("replications must be positive")]
    InvalidReplications,
    #[error("expected 1 or {expected} coefficients, found {found}")]
    CoefficientMismatch { expected: usize, found: usize },
    #[error("coefficients and intercept must be finite")]
    NonFiniteCoefficients,
    #[error("phi must be finite and positive, got {0}")]
    InvalidDispersion(f64),
    #[error("treatment share must lie strictly between 0 and 1, got {0}")]
    InvalidTreatmentShare(f64),
    #[error("workers must be positive")]
    InvalidWorkers,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Fit(#[from] OrdBetaError),
    #[error("a simulation worker panicked")]
    WorkerPanicked,
}

/// How synthetic covariates are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CovariateType {
    /// Standard normal.
    #[default]
    Continuous,
    /// Bernoulli with probability `treat_assign`.
    Binary,
}

impl CovariateType {
    const fn effect_kind(self) -> CovariateKind {
        match self {
            Self::Continuous => CovariateKind::Continuous,
            Self::Binary => CovariateKind::Binary,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub sample_sizes: Vec<usize>,
    pub n_covariates: usize,
    pub replications: usize,
    pub phi: f64,
    pub cutpoints: Cutpoints,
    /// One coefficient per covariate, or a single value shared by all.
    pub beta_coef: Vec<f64>,
    pub intercept: f64,
    pub covariate_type: CovariateType,
    /// Share of ones for binary covariates.
    pub treat_assign: f64,
    /// Refit the model to every dataset; otherwise only data and true effects.
    pub fit: bool,
    /// Keep the simulated datasets in the result.
    pub return_data: bool,
    pub alpha: f64,
    pub workers: usize,
    pub seed: u64,
    pub seed_stride: u64,
    pub fit_options: FitOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            sample_sizes: vec![1_000],
            n_covariates: 5,
            replications: 100,
            phi: 1.0,
            cutpoints: Cutpoints::default(),
            beta_coef: vec![0.5],
            intercept: 0.0,
            covariate_type: CovariateType::Continuous,
            treat_assign: 0.5,
            fit: true,
            return_data: false,
            alpha: 0.05,
            workers: 1,
            seed: 42,
            seed_stride: 10_007,
            fit_options: FitOptions {
                true_bounds: Some(OutcomeBounds::default()),
                draws: 400,
                ..FitOptions::default()
            },
        }
    }
}

impl SimulationOptions {
    /// # Errors
    ///
    /// Returns `SimulationError` if the configuration cannot be simulated.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.sample_sizes.is_empty() {
            return Err(SimulationError::EmptySampleSizes);
        }
        if let Some(&n) = self.sample_sizes.iter().find(|&&n| n < 2) {
            return Err(SimulationError::InvalidSampleSize(n));
        }
        if self.n_covariates == 0 {
            return Err(SimulationError::NoCovariates);
        }
        if self.replications == 0 {
            return Err(SimulationError::InvalidReplications);
        }
        if !(self.beta_coef.len() == 1 || self.beta_coef.len() == self.n_covariates) {
            return Err(SimulationError::CoefficientMismatch {
                expected: self.n_covariates,
                found: self.beta_coef.len(),
            });
        }
        if !(self.intercept.is_finite() && self.beta_coef.iter().all(|b| b.is_finite())) {
            return Err(SimulationError::NonFiniteCoefficients);
        }
        if !(self.phi > 0.0 && self.phi.is_finite()) {
            return Err(SimulationError::InvalidDispersion(self.phi));
        }
        if self.covariate_type == CovariateType::Binary
            && !(self.treat_assign > 0.0 && self.treat_assign < 1.0)
        {
            return Err(SimulationError::InvalidTreatmentShare(self.treat_assign));
        }
        if self.workers == 0 {
            return Err(SimulationError::InvalidWorkers);
        }
        validate_alpha(self.alpha)?;
        Cutpoints::new(self.cutpoints.low, self.cutpoints.high)?;
        if self.fit {
            self.fit_options.validate()?;
        }
        Ok(())
    }

    fn coefficient(&self, covariate: usize) -> f64 {
        if self.beta_coef.len() == 1 {
            self.beta_coef[0]
        } else {
            self.beta_coef[covariate]
        }
    }

    fn true_model(&self) -> OrdBetaModel {
        OrdBetaModel {
            beta: Mat::from_fn(self.n_covariates + 1, 1, |i, _| {
                if i == 0 {
                    self.intercept
                } else {
                    self.coefficient(i - 1)
                }
            }),
            dispersion: Mat::from_fn(1, 1, |_, _| self.phi.ln()),
            cutpoints: self.cutpoints,
            bounds: OutcomeBounds::default(),
            dispersion_model: DispersionModel::Constant,
        }
    }
}

/// One synthetic dataset with its true effects.
#[derive(Debug, Clone)]
pub struct SimulatedDataset {
    /// Intercept column followed by the covariates.
    pub design: Mat<f64>,
    /// Outcome on `[0, 1]`.
    pub outcome: Mat<f64>,
    /// Average marginal effect of each covariate under the generating model.
    pub true_effects: Vec<f64>,
}

/// Draw one dataset of `n` rows from the generating process in `options`.
///
/// # Errors
///
/// Returns `SimulationError` if the options are invalid or a linear predictor
/// saturates the mean.
pub fn simulate_ordbeta_data(
    n: usize,
    options: &SimulationOptions,
    rng: &mut StdRng,
) -> Result<SimulatedDataset, SimulationError> {
    options.validate()?;
    let k = options.n_covariates;
    let mut design = Mat::<f64>::zeros(n, k + 1);
    for i in 0..n {
        design[(i, 0)] = 1.0;
        for j in 1..=k {
            design[(i, j)] = match options.covariate_type {
                CovariateType::Continuous => sample_standard_normal(rng),
                CovariateType::Binary => {
                    if rng.random::<f64>() < options.treat_assign {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
        }
    }

    let truth = options.true_model();
    let eta = truth.linear_predictor(&design)?;
    let mut outcome = Mat::<f64>::zeros(n, 1);
    for i in 0..n {
        outcome[(i, 0)] =
            OrderedBeta::from_linear_predictor(eta[(i, 0)], options.phi, options.cutpoints)?
                .sample(rng);
    }

    let kind = options.covariate_type.effect_kind();
    let true_effects = (1..=k)
        .map(|column| average_marginal_effect(&truth, &design, column, kind))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SimulatedDataset {
        design,
        outcome,
        true_effects,
    })
}

/// Fitted effect for one covariate in one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectEstimate {
    /// Average marginal effect at the fitted mode.
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    pub coefficient: f64,
    pub coefficient_se: f64,
}

impl EffectEstimate {
    /// Interval excludes zero.
    #[must_use]
    pub fn is_significant(&self) -> bool {
        self.lower > 0.0 || self.upper < 0.0
    }

    #[must_use]
    pub fn covers(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Per-task, per-covariate outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationDraw {
    pub sample_size: usize,
    pub replication: usize,
    /// Zero-based covariate index (design column minus one).
    pub covariate: usize,
    pub true_effect: f64,
    /// `None` when fitting was disabled or failed.
    pub estimate: Option<EffectEstimate>,
    pub fit_failed: bool,
}

/// Aggregates for one (sample size, covariate) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSummary {
    pub sample_size: usize,
    pub covariate: usize,
    pub true_effect: f64,
    pub mean_estimate: f64,
    pub bias: f64,
    pub rmse: f64,
    /// Share of fits whose interval excludes zero.
    pub power: f64,
    /// Share of intervals covering the true effect.
    pub coverage: f64,
    /// Among significant fits, share with the wrong sign.
    pub sign_error_rate: f64,
    /// Among significant fits, mean `|estimate| / |truth|`.
    pub exaggeration_ratio: f64,
    pub fitted: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub draws: Vec<SimulationDraw>,
    pub summaries: Vec<PowerSummary>,
    pub datasets: Vec<SimulatedDataset>,
}

#[derive(Debug, Clone, Copy)]
struct Task {
    index: usize,
    sample_size: usize,
    replication: usize,
    seed: u64,
}

struct TaskOutput {
    draws: Vec<SimulationDraw>,
    dataset: Option<SimulatedDataset>,
}

/// Run every (sample size, replication) task and aggregate the results.
///
/// # Errors
///
/// Returns `SimulationError` if the options are invalid, data generation fails,
/// or a worker panics. Failed model fits are counted, not returned as errors.
pub fn run_power_simulation(
    options: &SimulationOptions,
) -> Result<SimulationResult, SimulationError> {
    options.validate()?;

    let tasks = options
        .sample_sizes
        .iter()
        .enumerate()
        .flat_map(|(size_idx, &sample_size)| {
            (0..options.replications).map(move |replication| (size_idx, sample_size, replication))
        })
        .map(|(size_idx, sample_size, replication)| {
            let index = size_idx * options.replications + replication;
            let index_u64 = u64::try_from(index).unwrap_or(u64::MAX);
            Task {
                index,
                sample_size,
                replication,
                seed: options
                    .seed
                    .wrapping_add(index_u64.saturating_mul(options.seed_stride)),
            }
        })
        .collect::<Vec<_>>();

    let workers = options.workers.min(tasks.len());
    let chunk_size = tasks.len().div_ceil(workers);
    let mut outputs: Vec<Option<TaskOutput>> = (0..tasks.len()).map(|_| None).collect();

    std::thread::scope(|scope| -> Result<(), SimulationError> {
        let mut handles = Vec::with_capacity(workers);
        for chunk in tasks.chunks(chunk_size) {
            handles.push(scope.spawn(move || {
                chunk
                    .iter()
                    .map(|task| run_task(*task, options).map(|output| (task.index, output)))
                    .collect::<Result<Vec<_>, SimulationError>>()
            }));
        }
        for handle in handles {
            let finished = handle.join().map_err(|_| SimulationError::WorkerPanicked)??;
            for (index, output) in finished {
                outputs[index] = Some(output);
            }
        }
        Ok(())
    })?;

    let mut result = SimulationResult::default();
    for output in outputs.into_iter().flatten() {
        result.draws.extend(output.draws);
        result.datasets.extend(output.dataset);
    }
    result.summaries = summarize_power(&result.draws, options);
    for &sample_size in &options.sample_sizes {
        let failures = result
            .summaries
            .iter()
            .filter(|s| s.sample_size == sample_size)
            .map(|s| s.failures)
            .max()
            .unwrap_or(0);
        info!(
            sample_size,
            replications = options.replications,
            failures,
            "power simulation finished for sample size"
        );
    }
    Ok(result)
}

fn run_task(task: Task, options: &SimulationOptions) -> Result<TaskOutput, SimulationError> {
    let mut rng = StdRng::seed_from_u64(task.seed);
    let dataset = simulate_ordbeta_data(task.sample_size, options, &mut rng)?;

    let estimates = if options.fit {
        match fit_effects(&dataset, task.seed, options) {
            Ok(Some(estimates)) => Some(estimates),
            Ok(None) => {
                debug!(
                    sample_size = task.sample_size,
                    replication = task.replication,
                    "simulation fit did not converge"
                );
                None
            }
            Err(err) => {
                debug!(
                    sample_size = task.sample_size,
                    replication = task.replication,
                    error = %err,
                    "simulation fit failed"
                );
                None
            }
        }
    } else {
        None
    };

    let draws = dataset
        .true_effects
        .iter()
        .enumerate()
        .map(|(covariate, &true_effect)| SimulationDraw {
            sample_size: task.sample_size,
            replication: task.replication,
            covariate,
            true_effect,
            estimate: estimates.as_ref().map(|e| e[covariate]),
            fit_failed: options.fit && estimates.is_none(),
        })
        .collect();

    Ok(TaskOutput {
        draws,
        dataset: options.return_data.then_some(dataset),
    })
}

/// Effects per covariate, or `None` when the fit did not converge.
fn fit_effects(
    dataset: &SimulatedDataset,
    seed: u64,
    options: &SimulationOptions,
) -> Result<Option<Vec<EffectEstimate>>, OrdBetaError> {
    let input = ModelInput::new(dataset.design.clone(), dataset.outcome.clone());
    let fit_options = FitOptions {
        seed,
        ..options.fit_options
    };
    let (model, report, draws) = fit_ordbeta_input_with_draws(&input, fit_options)?;
    if !report.converged {
        return Ok(None);
    }
    let kind = options.covariate_type.effect_kind();
    let estimates = (1..=options.n_covariates)
        .map(|column| {
            let estimate = average_marginal_effect(&model, &dataset.design, column, kind)?;
            let values = draws
                .models
                .iter()
                .map(|draw| average_marginal_effect(draw, &dataset.design, column, kind))
                .collect::<Result<Vec<_>, _>>()?;
            let summary = summarize_draws(&values, options.alpha);
            Ok(EffectEstimate {
                estimate,
                lower: summary.lower,
                upper: summary.upper,
                coefficient: model.beta[(column, 0)],
                coefficient_se: report.se_beta[(column, 0)],
            })
        })
        .collect::<Result<Vec<_>, OrdBetaError>>()?;
    Ok(Some(estimates))
}

fn summarize_power(draws: &[SimulationDraw], options: &SimulationOptions) -> Vec<PowerSummary> {
    let mut summaries = Vec::new();
    for &sample_size in &options.sample_sizes {
        for covariate in 0..options.n_covariates {
            let group = draws
                .iter()
                .filter(|d| d.sample_size == sample_size && d.covariate == covariate)
                .collect::<Vec<_>>();
            summaries.push(summarize_group(sample_size, covariate, &group));
        }
    }
    summaries
}

fn summarize_group(
    sample_size: usize,
    covariate: usize,
    group: &[&SimulationDraw],
) -> PowerSummary {
    let truths = group.iter().map(|d| d.true_effect).collect::<Vec<_>>();
    let fitted = group
        .iter()
        .filter_map(|d| d.estimate.map(|e| (d.true_effect, e)))
        .collect::<Vec<_>>();
    let failures = group.iter().filter(|d| d.fit_failed).count();

    let share = |count: usize, total: usize| {
        if total == 0 {
            f64::NAN
        } else {
            usize_to_f64(count) / usize_to_f64(total)
        }
    };
    let errors = fitted
        .iter()
        .map(|(truth, e)| e.estimate - truth)
        .collect::<Vec<_>>();
    let significant = fitted
        .iter()
        .filter(|(_, e)| e.is_significant())
        .collect::<Vec<_>>();
    let wrong_sign = significant
        .iter()
        .filter(|(truth, e)| (e.estimate > 0.0) != (*truth > 0.0))
        .count();
    let ratios = significant
        .iter()
        .filter(|(truth, _)| *truth != 0.0)
        .map(|(truth, e)| e.estimate.abs() / truth.abs())
        .collect::<Vec<_>>();

    PowerSummary {
        sample_size,
        covariate,
        true_effect: mean_slice(&truths),
        mean_estimate: mean_slice(&fitted.iter().map(|(_, e)| e.estimate).collect::<Vec<_>>()),
        bias: mean_slice(&errors),
        rmse: mean_slice(&errors.iter().map(|e| e * e).collect::<Vec<_>>()).sqrt(),
        power: share(significant.len(), fitted.len()),
        coverage: share(
            fitted.iter().filter(|(truth, e)| e.covers(*truth)).count(),
            fitted.len(),
        ),
        sign_error_rate: share(wrong_sign, significant.len()),
        exaggeration_ratio: mean_slice(&ratios),
        fitted: fitted.len(),
        failures,
    }
}

/// Power table, one row per (sample size, covariate); power of 0.8 or more is highlighted.
#[must_use]
pub fn render_power_table(summaries: &[PowerSummary]) -> String {
    let mut table = make_table(&[
        "N",
        "covariate",
        "true AME",
        "bias",
        "rmse",
        "power",
        "coverage",
        "S error",
        "M ratio",
        "failures",
    ]);
    for summary in summaries {
        table.add_row(vec![
            comfy_table::Cell::new(summary.sample_size),
            comfy_table::Cell::new(summary.covariate + 1),
            number_cell(summary.true_effect, 4),
            number_cell(summary.bias, 4),
            number_cell(summary.rmse, 4),
            highlight_cell(summary.power, 3, summary.power >= 0.8),
            number_cell(summary.coverage, 3),
            number_cell(summary.sign_error_rate, 3),
            number_cell(summary.exaggeration_ratio, 3),
            comfy_table::Cell::new(summary.failures),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn small_options() -> SimulationOptions {
        SimulationOptions {
            sample_sizes: vec![150, 300],
            n_covariates: 2,
            replications: 3,
            beta_coef: vec![0.8, -0.4],
            phi: 4.0,
            fit_options: FitOptions {
                true_bounds: Some(OutcomeBounds::default()),
                draws: 100,
                ..FitOptions::default()
            },
            ..SimulationOptions::default()
        }
    }

    #[test]
    fn validation_rejects_bad_options() {
        assert!(SimulationOptions::default().validate().is_ok());
        let mismatched = SimulationOptions {
            beta_coef: vec![0.1, 0.2],
            ..SimulationOptions::default()
        };
        assert!(matches!(
            mismatched.validate(),
            Err(SimulationError::CoefficientMismatch {
                expected: 5,
                found: 2
            })
        ));
        let binary = SimulationOptions {
            covariate_type: CovariateType::Binary,
            treat_assign: 1.0,
            ..SimulationOptions::default()
        };
        assert!(matches!(
            binary.validate(),
            Err(SimulationError::InvalidTreatmentShare(_))
        ));
        let tiny = SimulationOptions {
            sample_sizes: vec![1],
            ..SimulationOptions::default()
        };
        assert!(matches!(
            tiny.validate(),
            Err(SimulationError::InvalidSampleSize(1))
        ));
    }

    #[test]
    fn simulated_data_has_expected_shape() {
        let options = SimulationOptions {
            covariate_type: CovariateType::Binary,
            treat_assign: 0.3,
            ..SimulationOptions::default()
        };
        let mut rng = StdRng::seed_from_u64(4);
        let data = simulate_ordbeta_data(2_000, &options, &mut rng).expect("data");
        assert_eq!(data.design.ncols(), 6);
        assert_eq!(data.true_effects.len(), 5);
        let treated = (0..2_000).filter(|&i| data.design[(i, 1)] == 1.0).count();
        assert_relative_eq!(usize_to_f64(treated) / 2_000.0, 0.3, epsilon = 0.04);
        assert!((0..2_000).all(|i| (0.0..=1.0).contains(&data.outcome[(i, 0)])));
        assert!(data.true_effects.iter().all(|effect| *effect > 0.0));
    }

    #[test]
    fn data_only_run_reports_truth_without_fits() {
        let options = SimulationOptions {
            fit: false,
            return_data: true,
            ..small_options()
        };
        let result = run_power_simulation(&options).expect("simulation");
        assert_eq!(result.datasets.len(), 6);
        assert_eq!(result.draws.len(), 12);
        assert!(result.draws.iter().all(|d| d.estimate.is_none() && !d.fit_failed));
        assert_eq!(result.summaries.len(), 4);
        assert!(result.summaries.iter().all(|s| s.failures == 0 && s.fitted == 0));
    }

    #[test]
    fn results_do_not_depend_on_worker_count() {
        let single = run_power_simulation(&small_options()).expect("single");
        let parallel = run_power_simulation(&SimulationOptions {
            workers: 3,
            ..small_options()
        })
        .expect("parallel");
        assert_eq!(single.draws, parallel.draws);
        assert!(single.draws.iter().all(|d| d.estimate.is_some()));
    }

    #[test]
    fn power_table_renders_every_row() {
        let result = run_power_simulation(&SimulationOptions {
            fit: false,
            ..small_options()
        })
        .expect("simulation");
        let rendered = render_power_table(&result.summaries);
        assert!(rendered.contains("300"));
        assert!(rendered.contains("coverage"));
    }

    #[test]
    fn group_summary_counts_sign_errors() {
        let draw = |estimate: f64, lower: f64, upper: f64| SimulationDraw {
            sample_size: 10,
            replication: 0,
            covariate: 0,
            true_effect: 0.1,
            estimate: Some(EffectEstimate {
                estimate,
                lower,
                upper,
                coefficient: 0.0,
                coefficient_se: 1.0,
            }),
            fit_failed: false,
        };
        let draws = [
            draw(0.2, 0.05, 0.35),
            draw(-0.1, -0.2, -0.01),
            draw(0.05, -0.05, 0.15),
        ];
        let refs = draws.iter().collect::<Vec<_>>();
        let summary = summarize_group(10, 0, &refs);
        assert_relative_eq!(summary.power, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(summary.sign_error_rate, 0.5, epsilon = 1e-12);
        assert_relative_eq!(summary.exaggeration_ratio, 1.5, epsilon = 1e-12);
        assert_relative_eq!(summary.coverage, 2.0 / 3.0, epsilon = 1e-12);
    }
}
