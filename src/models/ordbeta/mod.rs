//! Ordered beta regression for bounded continuous outcomes.
//!
//! Outcomes on a closed scale `[a, b]` are rescaled to `[0, 1]`. Exact zeros
//! and ones are modelled as ordinal categories separated by two logit-scale
//! cutpoints, and interior values by a Beta regression sharing the same
//! linear predictor. Estimation locates the posterior mode under the default
//! prior set and approximates uncertainty with a normal at the mode.

pub mod diagnostics;
pub mod distribution;
pub mod effects;
pub mod fit;
pub mod priors;
pub mod types;

pub use diagnostics::{
    InformationCriteria, PredictiveCheck, PredictiveStatistic, compute_information_criteria,
    information_criteria, information_criteria_for_input, predictive_check, render_fit_table,
    render_predictive_check,
};
pub use distribution::{
    CategoryProbabilities, Cutpoints, DistributionError, ObservationGradient, OrderedBeta,
    category_probabilities, dordbeta, expected_value, expected_value_derivative,
    log_likelihood_eta, observation_gradient, rordbeta,
};
pub use effects::{
    CovariateKind, MarginalEffect, average_marginal_effect, average_marginal_effects,
    covariate_kind,
};
pub use fit::{
    ConfidenceInterval, approximate_posterior_draws, coefficient_confidence_intervals,
    fit_ordbeta_input, fit_ordbeta_input_with_draws, log_likelihood,
};
pub use priors::{CoefficientPrior, OrdBetaPriorConfig};
pub use types::{
    CutpointStandardErrors, DispersionModel, FitOptions, OrdBetaDraws, OrdBetaError,
    OrdBetaModel, OrdBetaPrediction, OrdBetaReport,
};
