//! Default prior set injected by the ordered beta fit, and log-density helpers.

use statrs::function::gamma::ln_gamma;

use super::distribution::{Cutpoints, logistic_stable};

/// Hyperparameters for the ordered beta prior set.
#[derive(Debug, Clone, Copy)]
pub struct OrdBetaPriorConfig {
    /// Mean of the Normal prior on mean-model slopes.
    pub coef_prior_mean: f64,
    /// Standard deviation of the Normal prior on mean-model slopes.
    pub coef_prior_sd: f64,
    /// If set, the mean-model intercept gets a Normal prior with this mean.
    pub intercept_prior_mean: Option<f64>,
    /// Standard deviation for the intercept prior (falls back to `coef_prior_sd`).
    pub intercept_prior_sd: Option<f64>,
    /// Rate of the Exponential prior on a constant `phi`.
    pub phi_prior_rate: f64,
    /// Concentration of the induced Dirichlet prior on the cutpoints.
    pub dirichlet_prior: [f64; 3],
    /// Mean of the Normal prior on dispersion-model coefficients.
    pub phi_coef_prior_mean: f64,
    /// Standard deviation of the Normal prior on dispersion-model coefficients.
    pub phi_coef_prior_sd: f64,
}

impl Default for OrdBetaPriorConfig {
    fn default() -> Self {
        Self {
            coef_prior_mean: 0.0,
            coef_prior_sd: 5.0,
            intercept_prior_mean: None,
            intercept_prior_sd: None,
            phi_prior_rate: 0.1,
            dirichlet_prior: [1.0, 1.0, 1.0],
            phi_coef_prior_mean: 0.0,
            phi_coef_prior_sd: 5.0,
        }
    }
}

impl OrdBetaPriorConfig {
    /// Whether all prior hyperparameters are numerically valid.
    #[must_use]
    pub fn is_valid(self) -> bool {
        let positive = |value: f64| value > 0.0 && value.is_finite();
        self.coef_prior_mean.is_finite()
            && positive(self.coef_prior_sd)
            && self.intercept_prior_mean.is_none_or(f64::is_finite)
            && self.intercept_prior_sd.is_none_or(positive)
            && positive(self.phi_prior_rate)
            && self.dirichlet_prior.iter().copied().all(positive)
            && self.phi_coef_prior_mean.is_finite()
            && positive(self.phi_coef_prior_sd)
    }

    /// Prior on mean-model slopes.
    #[must_use]
    pub const fn coefficient_prior(self) -> CoefficientPrior {
        CoefficientPrior::Normal {
            mean: self.coef_prior_mean,
            sd: self.coef_prior_sd,
        }
    }

    /// Prior on the mean-model intercept.
    ///
    /// Without an explicit mean this is the weakly informative Student-t(3, 0, 2.5).
    #[must_use]
    pub fn intercept_prior(self) -> CoefficientPrior {
        match self.intercept_prior_mean {
            Some(mean) => CoefficientPrior::Normal {
                mean,
                sd: self.intercept_prior_sd.unwrap_or(self.coef_prior_sd),
            },
            None => CoefficientPrior::StudentT {
                df: 3.0,
                location: 0.0,
                scale: 2.5,
            },
        }
    }

    /// Prior on dispersion-model coefficients.
    #[must_use]
    pub const fn dispersion_coefficient_prior(self) -> CoefficientPrior {
        CoefficientPrior::Normal {
            mean: self.phi_coef_prior_mean,
            sd: self.phi_coef_prior_sd,
        }
    }
}

/// Prior family for a single regression coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoefficientPrior {
    Normal { mean: f64, sd: f64 },
    StudentT { df: f64, location: f64, scale: f64 },
}

impl CoefficientPrior {
    #[must_use]
    pub fn log_density(self, value: f64) -> f64 {
        match self {
            Self::Normal { mean, sd } => log_normal_density(value, mean, sd),
            Self::StudentT {
                df,
                location,
                scale,
            } => log_student_t_density(value, df, location, scale),
        }
    }

    #[must_use]
    pub fn gradient(self, value: f64) -> f64 {
        match self {
            Self::Normal { mean, sd } => -(value - mean) / (sd * sd),
            Self::StudentT {
                df,
                location,
                scale,
            } => {
                let centered = value - location;
                -(df + 1.0) * centered / (df * scale).mul_add(scale, centered * centered)
            }
        }
    }
}

/// Log-density for `Normal(mean, sd)`.
#[must_use]
pub fn log_normal_density(value: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (value - mean) / sd;
    -0.5 * z.mul_add(z, std::f64::consts::TAU.ln()) - sd.ln()
}

/// Log-density for a location-scale Student-t.
#[must_use]
pub fn log_student_t_density(value: f64, df: f64, location: f64, scale: f64) -> f64 {
    if !(df > 0.0 && scale > 0.0) {
        return f64::NEG_INFINITY;
    }
    let z = (value - location) / scale;
    ln_gamma(0.5 * (df + 1.0))
        - ln_gamma(0.5 * df)
        - 0.5 * (df * std::f64::consts::PI).ln()
        - scale.ln()
        - 0.5 * (df + 1.0) * (z * z / df).ln_1p()
}

/// Log-density of `log(phi)` when `phi ~ Exponential(rate)`, Jacobian included.
#[must_use]
pub fn log_exponential_density_log_scale(log_phi: f64, rate: f64) -> f64 {
    if rate <= 0.0 {
        return f64::NEG_INFINITY;
    }
    rate.ln() - rate * log_phi.exp() + log_phi
}

/// Derivative of [`log_exponential_density_log_scale`] with respect to `log(phi)`.
#[must_use]
pub fn log_exponential_density_log_scale_gradient(log_phi: f64, rate: f64) -> f64 {
    (-rate).mul_add(log_phi.exp(), 1.0)
}

/// Induced Dirichlet log-density of the cutpoints, on the unconstrained scale.
///
/// The three category probabilities at anchor `eta = 0` get a Dirichlet prior;
/// the log-Jacobian of the cutpoint map and of the `exp` gap transform are added.
#[must_use]
pub fn induced_dirichlet_log_density(cutpoints: Cutpoints, alpha: [f64; 3]) -> f64 {
    let s1 = logistic_stable(-cutpoints.low);
    let s2 = logistic_stable(-cutpoints.high);
    let probs = [logistic_stable(cutpoints.low), s1 - s2, s2];
    if probs.iter().any(|p| *p <= 0.0) {
        return f64::NEG_INFINITY;
    }
    let rho1 = s1 * logistic_stable(cutpoints.low);
    let rho2 = s2 * logistic_stable(cutpoints.high);

    let normalizer = ln_gamma(alpha.iter().sum::<f64>())
        - alpha.iter().map(|a| ln_gamma(*a)).sum::<f64>();
    let kernel = alpha
        .iter()
        .zip(probs.iter())
        .map(|(a, p)| (a - 1.0) * p.ln())
        .sum::<f64>();
    let log_jacobian = 3.0f64.ln() + rho1.ln() + rho2.ln();
    normalizer + kernel + log_jacobian + cutpoints.log_gap()
}

/// Gradient of [`induced_dirichlet_log_density`] with respect to `(low, log_gap)`.
#[must_use]
pub fn induced_dirichlet_gradient(cutpoints: Cutpoints, alpha: [f64; 3]) -> (f64, f64) {
    let s1 = logistic_stable(-cutpoints.low);
    let s2 = logistic_stable(-cutpoints.high);
    let p1 = logistic_stable(cutpoints.low);
    let p2 = (s1 - s2).max(f64::MIN_POSITIVE);
    let p3 = s2;
    let rho1 = s1 * p1;
    let rho2 = s2 * logistic_stable(cutpoints.high);

    let d_low = (alpha[0] - 1.0) * rho1 / p1 - (alpha[1] - 1.0) * rho1 / p2
        - 2.0f64.mul_add(-s1, 1.0);
    let d_high = (alpha[1] - 1.0) * rho2 / p2 - (alpha[2] - 1.0) * rho2 / p3
        - 2.0f64.mul_add(-s2, 1.0);
    let gap = cutpoints.high - cutpoints.low;
    (d_low + d_high, d_high.mul_add(gap, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn prior_defaults_are_valid() {
        assert!(OrdBetaPriorConfig::default().is_valid());
        let invalid = OrdBetaPriorConfig {
            dirichlet_prior: [1.0, 0.0, 1.0],
            ..OrdBetaPriorConfig::default()
        };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn intercept_prior_defaults_to_student_t() {
        let config = OrdBetaPriorConfig::default();
        assert!(matches!(
            config.intercept_prior(),
            CoefficientPrior::StudentT { .. }
        ));
        let explicit = OrdBetaPriorConfig {
            intercept_prior_mean: Some(0.5),
            ..config
        };
        assert_eq!(
            explicit.intercept_prior(),
            CoefficientPrior::Normal { mean: 0.5, sd: 5.0 }
        );
    }

    #[test]
    fn normal_density_matches_closed_form() {
        assert_relative_eq!(
            log_normal_density(0.0, 0.0, 1.0),
            -0.5 * std::f64::consts::TAU.ln(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn coefficient_prior_gradients_match_finite_differences() {
        let h = 1e-6;
        for prior in [
            CoefficientPrior::Normal { mean: 0.3, sd: 2.0 },
            CoefficientPrior::StudentT {
                df: 3.0,
                location: 0.0,
                scale: 2.5,
            },
        ] {
            for value in [-3.0, -0.1, 0.7, 4.2] {
                let numeric =
                    (prior.log_density(value + h) - prior.log_density(value - h)) / (2.0 * h);
                assert_relative_eq!(prior.gradient(value), numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn exponential_gradient_matches_finite_differences() {
        let h = 1e-6;
        let log_phi = 1.3;
        let numeric = (log_exponential_density_log_scale(log_phi + h, 0.1)
            - log_exponential_density_log_scale(log_phi - h, 0.1))
            / (2.0 * h);
        assert_relative_eq!(
            log_exponential_density_log_scale_gradient(log_phi, 0.1),
            numeric,
            epsilon = 1e-6
        );
    }

    #[test]
    fn induced_dirichlet_gradient_matches_finite_differences() {
        let h = 1e-6;
        for alpha in [[1.0, 1.0, 1.0], [2.0, 5.0, 1.5]] {
            for (low, log_gap) in [(-1.0, 0.7), (0.4, -0.5), (-2.5, 1.4)] {
                let density = |low: f64, log_gap: f64| {
                    let cutpoints = Cutpoints::from_unconstrained(low, log_gap);
                    induced_dirichlet_log_density(cutpoints, alpha)
                };
                let numeric_low =
                    (density(low + h, log_gap) - density(low - h, log_gap)) / (2.0 * h);
                let numeric_gap =
                    (density(low, log_gap + h) - density(low, log_gap - h)) / (2.0 * h);
                let (d_low, d_gap) =
                    induced_dirichlet_gradient(Cutpoints::from_unconstrained(low, log_gap), alpha);
                assert_relative_eq!(d_low, numeric_low, epsilon = 1e-5);
                assert_relative_eq!(d_gap, numeric_gap, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn induced_dirichlet_is_finite_for_ordered_cutpoints() {
        let value = induced_dirichlet_log_density(
            Cutpoints::new(-1.0, 1.0).expect("cuts"),
            [1.0, 1.0, 1.0],
        );
        assert!(value.is_finite());
    }
}
