//! The ordered beta distribution.
//!
//! An outcome on `[0, 1]` is generated in two steps. A latent linear predictor
//! `eta` is compared with two ordered logit-scale cutpoints to pick one of three
//! categories (exactly 0, interior, exactly 1). Interior outcomes then follow a
//! `Beta(mu * phi, (1 - mu) * phi)` density with `mu = logistic(eta)`.
//!
//! The density is a mixed mass/density: `pdf(0)` and `pdf(1)` are point
//! probabilities, `pdf(y)` for `0 < y < 1` is a density.

use rand::rngs::StdRng;
use rand::RngExt;
use statrs::function::beta::{beta_reg, ln_beta};
use statrs::function::gamma::digamma;
use thiserror::Error;

const EPS_PROBABILITY: f64 = 1.0e-12;

/// Errors raised when distribution parameters are invalid.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DistributionError {
    #[error("mu must lie strictly between 0 and 1; found {0}")]
    InvalidMean(f64),
    #[error("phi must be finite and strictly positive; found {0}")]
    InvalidDispersion(f64),
    #[error("cutpoints must be finite")]
    NonFiniteCutpoints,
    #[error("cutpoints must be ordered (low {low} must be below high {high})")]
    UnorderedCutpoints { low: f64, high: f64 },
    #[error("parameter length ({found}) must be 1 or match the number of values ({expected})")]
    LengthMismatch { expected: usize, found: usize },
}

/// Logit-scale thresholds separating the low, interior, and high categories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutpoints {
    pub low: f64,
    pub high: f64,
}

impl Default for Cutpoints {
    fn default() -> Self {
        Self {
            low: -1.0,
            high: 1.0,
        }
    }
}

impl Cutpoints {
    /// # Errors
    ///
    /// Returns `DistributionError` if the cutpoints are non-finite or not ordered.
    pub fn new(low: f64, high: f64) -> Result<Self, DistributionError> {
        if !(low.is_finite() && high.is_finite()) {
            return Err(DistributionError::NonFiniteCutpoints);
        }
        if low >= high {
            return Err(DistributionError::UnorderedCutpoints { low, high });
        }
        Ok(Self { low, high })
    }

    /// Build cutpoints from the unconstrained pair `(low, log(high - low))`.
    #[must_use]
    pub fn from_unconstrained(low: f64, log_gap: f64) -> Self {
        Self {
            low,
            high: low + log_gap.exp(),
        }
    }

    /// Log of the gap between the cutpoints.
    #[must_use]
    pub fn log_gap(self) -> f64 {
        (self.high - self.low).ln()
    }
}

/// Probabilities of the three ordered categories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProbabilities {
    pub low: f64,
    pub interior: f64,
    pub high: f64,
}

/// Category probabilities implied by a linear predictor and cutpoints.
#[must_use]
pub fn category_probabilities(eta: f64, cutpoints: Cutpoints) -> CategoryProbabilities {
    let low = logistic_stable(cutpoints.low - eta);
    let high = logistic_stable(eta - cutpoints.high);
    let interior = log_diff_exp(
        log_inv_logit(eta - cutpoints.low),
        log_inv_logit(eta - cutpoints.high),
    )
    .exp();
    CategoryProbabilities {
        low,
        interior,
        high,
    }
}

/// Ordered beta distribution parameterized by mean, dispersion, and cutpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedBeta {
    mu: f64,
    phi: f64,
    cutpoints: Cutpoints,
}

impl OrderedBeta {
    /// # Errors
    ///
    /// Returns `DistributionError` if `mu` is outside `(0, 1)`, `phi` is not
    /// positive, or the cutpoints are invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// use ordered_beta_models::{Cutpoints, OrderedBeta};
    ///
    /// let dist = OrderedBeta::new(0.5, 2.0, Cutpoints::default()).expect("valid");
    /// let probs = dist.category_probabilities();
    /// assert!((probs.low + probs.interior + probs.high - 1.0).abs() < 1e-12);
    /// assert!(OrderedBeta::new(1.0, 2.0, Cutpoints::default()).is_err());
    /// ```
    pub fn new(mu: f64, phi: f64, cutpoints: Cutpoints) -> Result<Self, DistributionError> {
        if !(mu > 0.0 && mu < 1.0) {
            return Err(DistributionError::InvalidMean(mu));
        }
        if !(phi > 0.0 && phi.is_finite()) {
            return Err(DistributionError::InvalidDispersion(phi));
        }
        let cutpoints = Cutpoints::new(cutpoints.low, cutpoints.high)?;
        Ok(Self { mu, phi, cutpoints })
    }

    /// Build from a logit-scale linear predictor (`mu = logistic(eta)`).
    ///
    /// # Errors
    ///
    /// Returns `DistributionError` if `eta` saturates `mu` to 0 or 1, or other
    /// parameters are invalid.
    pub fn from_linear_predictor(
        eta: f64,
        phi: f64,
        cutpoints: Cutpoints,
    ) -> Result<Self, DistributionError> {
        Self::new(logistic_stable(eta), phi, cutpoints)
    }

    #[must_use]
    pub const fn mu(&self) -> f64 {
        self.mu
    }

    #[must_use]
    pub const fn phi(&self) -> f64 {
        self.phi
    }

    #[must_use]
    pub const fn cutpoints(&self) -> Cutpoints {
        self.cutpoints
    }

    /// Logit of the mean.
    #[must_use]
    pub fn eta(&self) -> f64 {
        (self.mu / (1.0 - self.mu)).ln()
    }

    #[must_use]
    pub fn category_probabilities(&self) -> CategoryProbabilities {
        category_probabilities(self.eta(), self.cutpoints)
    }

    /// Log mass at the bounds, log density in the interior, `-inf` elsewhere.
    #[must_use]
    pub fn ln_pdf(&self, y: f64) -> f64 {
        log_likelihood_eta(y, self.eta(), self.phi, self.cutpoints)
    }

    #[must_use]
    pub fn pdf(&self, y: f64) -> f64 {
        self.ln_pdf(y).exp()
    }

    /// Distribution function including the jumps at 0 and 1.
    #[must_use]
    pub fn cdf(&self, y: f64) -> f64 {
        if y.is_nan() {
            return f64::NAN;
        }
        if y < 0.0 {
            return 0.0;
        }
        if y >= 1.0 {
            return 1.0;
        }
        let probs = self.category_probabilities();
        if y == 0.0 {
            return probs.low;
        }
        let (a, b) = beta_shapes(self.eta(), self.phi);
        probs.interior.mul_add(beta_reg(a, b, y), probs.low)
    }

    /// Expected value on `[0, 1]`.
    #[must_use]
    pub fn mean(&self) -> f64 {
        let probs = self.category_probabilities();
        probs.interior.mul_add(self.mu, probs.high)
    }

    /// Draw a single outcome.
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        let probs = self.category_probabilities();
        let u = rng.random::<f64>();
        if u < probs.low {
            0.0
        } else if u < probs.low + probs.interior {
            let (a, b) = beta_shapes(self.eta(), self.phi);
            sample_beta(rng, a, b).clamp(f64::EPSILON, 1.0 - f64::EPSILON)
        } else {
            1.0
        }
    }
}

/// Vectorised density; `mu` and `phi` may hold one value or one per `x`.
///
/// # Errors
///
/// Returns `DistributionError` if any parameter is invalid or lengths disagree.
///
/// # Examples
///
/// ```
/// use ordered_beta_models::{Cutpoints, dordbeta};
///
/// let density = dordbeta(&[0.0, 0.4, 1.0], &[0.5], &[2.0], Cutpoints::default(), false)
///     .expect("valid parameters");
/// assert_eq!(density.len(), 3);
/// assert!(density[0] > 0.0 && density[0] < 1.0);
/// ```
pub fn dordbeta(
    x: &[f64],
    mu: &[f64],
    phi: &[f64],
    cutpoints: Cutpoints,
    log: bool,
) -> Result<Vec<f64>, DistributionError> {
    check_broadcast(mu.len(), x.len())?;
    check_broadcast(phi.len(), x.len())?;
    x.iter()
        .enumerate()
        .map(|(i, &value)| {
            let dist = OrderedBeta::new(broadcast(mu, i), broadcast(phi, i), cutpoints)?;
            let ln_pdf = dist.ln_pdf(value);
            Ok(if log { ln_pdf } else { ln_pdf.exp() })
        })
        .collect()
}

/// Vectorised random generation; `mu` and `phi` may hold one value or `n`.
///
/// # Errors
///
/// Returns `DistributionError` if any parameter is invalid or lengths disagree.
pub fn rordbeta(
    n: usize,
    mu: &[f64],
    phi: &[f64],
    cutpoints: Cutpoints,
    rng: &mut StdRng,
) -> Result<Vec<f64>, DistributionError> {
    check_broadcast(mu.len(), n)?;
    check_broadcast(phi.len(), n)?;
    (0..n)
        .map(|i| {
            let dist = OrderedBeta::new(broadcast(mu, i), broadcast(phi, i), cutpoints)?;
            Ok(dist.sample(rng))
        })
        .collect()
}

/// Per-observation log-likelihood given a linear predictor.
///
/// Values outside `[0, 1]` have zero likelihood.
#[must_use]
pub fn log_likelihood_eta(y: f64, eta: f64, phi: f64, cutpoints: Cutpoints) -> f64 {
    if !(y.is_finite() && (0.0..=1.0).contains(&y)) {
        return f64::NEG_INFINITY;
    }
    if y == 0.0 {
        return log1m_inv_logit(eta - cutpoints.low);
    }
    if y == 1.0 {
        return log_inv_logit(eta - cutpoints.high);
    }
    let (a, b) = beta_shapes(eta, phi);
    log_diff_exp(
        log_inv_logit(eta - cutpoints.low),
        log_inv_logit(eta - cutpoints.high),
    ) + beta_ln_pdf(y, a, b)
}

/// Partial derivatives of [`log_likelihood_eta`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ObservationGradient {
    pub eta: f64,
    pub phi: f64,
    pub low: f64,
    pub high: f64,
}

/// Analytic gradient of the per-observation log-likelihood.
#[must_use]
pub fn observation_gradient(
    y: f64,
    eta: f64,
    phi: f64,
    cutpoints: Cutpoints,
) -> ObservationGradient {
    let a = eta - cutpoints.low;
    let b = eta - cutpoints.high;
    if y == 0.0 {
        let sa = logistic_stable(a);
        return ObservationGradient {
            eta: -sa,
            low: sa,
            ..ObservationGradient::default()
        };
    }
    if y == 1.0 {
        let tail = logistic_stable(-b);
        return ObservationGradient {
            eta: tail,
            high: -tail,
            ..ObservationGradient::default()
        };
    }

    let density_a = logistic_stable(a) * logistic_stable(-a);
    let density_b = logistic_stable(b) * logistic_stable(-b);
    let interior = log_diff_exp(log_inv_logit(a), log_inv_logit(b))
        .exp()
        .max(f64::MIN_POSITIVE);

    let mu = logistic_stable(eta);
    let one_minus_mu = logistic_stable(-eta);
    let (shape_a, shape_b) = beta_shapes(eta, phi);
    let log_y = y.ln();
    let log_one_minus_y = (-y).ln_1p();
    let digamma_a = digamma(shape_a);
    let digamma_b = digamma(shape_b);

    let d_mu = phi * (log_y - digamma_a - log_one_minus_y + digamma_b);
    let d_phi = mu.mul_add(
        log_y - digamma_a,
        one_minus_mu * (log_one_minus_y - digamma_b),
    ) + digamma(phi);

    ObservationGradient {
        eta: (density_a - density_b) / interior + d_mu * mu * one_minus_mu,
        phi: d_phi,
        low: -density_a / interior,
        high: density_b / interior,
    }
}

/// Expected outcome on `[0, 1]` for a linear predictor.
#[must_use]
pub fn expected_value(eta: f64, cutpoints: Cutpoints) -> f64 {
    let probs = category_probabilities(eta, cutpoints);
    probs.interior.mul_add(logistic_stable(eta), probs.high)
}

/// Derivative of [`expected_value`] with respect to `eta`.
#[must_use]
pub fn expected_value_derivative(eta: f64, cutpoints: Cutpoints) -> f64 {
    let a = eta - cutpoints.low;
    let b = eta - cutpoints.high;
    let density_a = logistic_stable(a) * logistic_stable(-a);
    let density_b = logistic_stable(b) * logistic_stable(-b);
    let mu = logistic_stable(eta);
    let interior = category_probabilities(eta, cutpoints).interior;
    (density_a - density_b).mul_add(mu, density_b) + interior * mu * logistic_stable(-eta)
}

/// Stable logistic transform.
#[must_use]
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

/// Bound probability away from exact 0 and 1.
#[must_use]
pub fn clamp_probability(probability: f64) -> f64 {
    probability.clamp(EPS_PROBABILITY, 1.0 - EPS_PROBABILITY)
}

/// Logit of a probability, clamped away from the bounds.
#[must_use]
pub fn logit(probability: f64) -> f64 {
    let p = clamp_probability(probability);
    (p / (1.0 - p)).ln()
}

/// `log(logistic(x))` without overflow.
#[must_use]
pub fn log_inv_logit(value: f64) -> f64 {
    -softplus(-value)
}

/// `log(1 - logistic(x))` without overflow.
#[must_use]
pub fn log1m_inv_logit(value: f64) -> f64 {
    -softplus(value)
}

fn softplus(value: f64) -> f64 {
    if value > 0.0 {
        value + (-value).exp().ln_1p()
    } else {
        value.exp().ln_1p()
    }
}

/// `log(exp(a) - exp(b))` for `a >= b`.
#[must_use]
pub fn log_diff_exp(a: f64, b: f64) -> f64 {
    if b > a || a == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    a + (-(b - a).exp_m1()).ln()
}

fn beta_shapes(eta: f64, phi: f64) -> (f64, f64) {
    let log_phi = phi.ln();
    let a = (log_inv_logit(eta) + log_phi).exp().max(f64::MIN_POSITIVE);
    let b = (log1m_inv_logit(eta) + log_phi).exp().max(f64::MIN_POSITIVE);
    (a, b)
}

fn beta_ln_pdf(y: f64, a: f64, b: f64) -> f64 {
    (a - 1.0).mul_add(y.ln(), (b - 1.0) * (-y).ln_1p()) - ln_beta(a, b)
}

fn check_broadcast(len: usize, expected: usize) -> Result<(), DistributionError> {
    if len == 1 || len == expected {
        Ok(())
    } else {
        Err(DistributionError::LengthMismatch {
            expected,
            found: len,
        })
    }
}

fn broadcast(values: &[f64], index: usize) -> f64 {
    if values.len() == 1 {
        values[0]
    } else {
        values[index]
    }
}

pub(crate) fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0_f64 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

pub(crate) fn sample_gamma(rng: &mut StdRng, shape: f64, scale: f64) -> f64 {
    if !(shape > 0.0 && scale > 0.0) {
        return f64::NAN;
    }

    if shape < 1.0 {
        let u = (1.0_f64 - rng.random::<f64>()).max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let shape_minus_third = shape - (1.0 / 3.0);
    let coeff = (1.0 / (9.0 * shape_minus_third)).sqrt();
    loop {
        let standard_normal = sample_standard_normal(rng);
        let one_plus_coeff_noise = coeff.mul_add(standard_normal, 1.0);
        if one_plus_coeff_noise <= 0.0 {
            continue;
        }
        let cubic_term = one_plus_coeff_noise * one_plus_coeff_noise * one_plus_coeff_noise;
        let uniform = rng.random::<f64>();
        if uniform
            < (0.0331 * standard_normal * standard_normal * standard_normal)
                .mul_add(-standard_normal, 1.0)
        {
            return scale * shape_minus_third * cubic_term;
        }
        if uniform.ln()
            < (0.5 * standard_normal).mul_add(
                standard_normal,
                shape_minus_third * (1.0 - cubic_term + cubic_term.ln()),
            )
        {
            return scale * shape_minus_third * cubic_term;
        }
    }
}

pub(crate) fn sample_beta(rng: &mut StdRng, a: f64, b: f64) -> f64 {
    let x = sample_gamma(rng, a, 1.0);
    let y = sample_gamma(rng, b, 1.0);
    let total = x + y;
    if total > 0.0 && total.is_finite() {
        x / total
    } else if a >= b {
        1.0
    } else {
        0.0
    }
}
