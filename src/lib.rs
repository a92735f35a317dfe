#![forbid(unsafe_code)]

//! # `ordered_beta_models`
//!
//! Ordered beta regression for bounded continuous outcomes such as slider
//! scales, proportions, and dose-response measurements. Observations exactly at
//! either bound are kept and modelled as discrete categories; interior values
//! follow a Beta regression sharing the same linear predictor.
//!
//! The crate provides the distribution itself, outcome normalization, a
//! posterior-mode fit with a Laplace approximation, marginal effects on the
//! original scale, predictive checks, and simulation-based power analysis.

pub mod inference;
pub mod input;
pub mod models;
pub mod preprocess;
pub mod utils;

pub use inference::{DrawConfig, InferenceError, ParameterSummary};
pub use input::{InputError, ModelInput};
pub use preprocess::{
    BoundIndicators, NormalizeError, NormalizedOutcome, OutcomeBounds, OutcomeCategory,
    OutcomeDiagnostics, column_has_variation, constant_columns, normalize_outcome,
    outcome_diagnostics,
};

pub use models::ordbeta::{
    CategoryProbabilities, CoefficientPrior, ConfidenceInterval, CovariateKind, Cutpoints,
    CutpointStandardErrors, DispersionModel, DistributionError, FitOptions, InformationCriteria,
    MarginalEffect, ObservationGradient, OrdBetaDraws, OrdBetaError, OrdBetaModel,
    OrdBetaPrediction, OrdBetaPriorConfig, OrdBetaReport, OrderedBeta, PredictiveCheck,
    PredictiveStatistic, approximate_posterior_draws, average_marginal_effect,
    average_marginal_effects, category_probabilities, coefficient_confidence_intervals,
    compute_information_criteria, covariate_kind, dordbeta, expected_value,
    expected_value_derivative, fit_ordbeta_input, fit_ordbeta_input_with_draws,
    information_criteria, information_criteria_for_input, log_likelihood,
    log_likelihood_eta, observation_gradient, predictive_check, render_fit_table,
    render_predictive_check, rordbeta,
};

pub use models::simulation::{
    CovariateType, EffectEstimate, PowerSummary, SimulatedDataset, SimulationDraw,
    SimulationError, SimulationOptions, SimulationResult, render_power_table,
    run_power_simulation, simulate_ordbeta_data,
};
