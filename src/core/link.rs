//! Link functions mapping a linear predictor to a conditional mean.
//!
//! Each link exposes `g(μ)`, its inverse `h(η) = g⁻¹(η)` and the first two
//! derivatives of the inverse with respect to η. The derivatives feed the
//! analytic gradient and Hessian of the likelihood-based objectives.

use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::{PI, SQRT_2};

/// Probabilities are kept this far away from 0 and 1.
pub(crate) const PROBABILITY_EPSILON: f64 = 1e-10;

/// Linear predictors are clamped to this magnitude before exponentiation.
const MAX_ETA: f64 = 30.0;

/// Upper clamp of the complementary log-log predictor (μ = 1 in f64 beyond).
const MAX_CLOGLOG_ETA: f64 = 3.5;

/// Beyond this magnitude Φ(η) is 0 or 1 to working precision.
const MAX_PROBIT_ETA: f64 = 8.0;

/// Supported link functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    /// g(μ) = μ
    Identity,
    /// g(μ) = log(μ)
    Log,
    /// g(μ) = log(μ/(1-μ))
    Logit,
    /// g(μ) = Φ⁻¹(μ)
    Probit,
    /// g(μ) = log(-log(1-μ))
    CLogLog,
    /// g(μ) = 1/μ
    Inverse,
}

/// Standard normal CDF Φ(x).
#[inline]
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF φ(x) = exp(-x²/2) / √(2π)
#[inline]
fn standard_normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Inverse standard normal CDF Φ⁻¹(p).
#[inline]
fn probit(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

impl Link {
    /// Compute the link function g(μ).
    pub fn link(&self, mu: f64) -> f64 {
        match self {
            Link::Identity => mu,
            Link::Log => mu.max(PROBABILITY_EPSILON).ln(),
            Link::Logit => {
                let p = mu.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                (p / (1.0 - p)).ln()
            }
            Link::Probit => {
                let p = mu.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                probit(p)
            }
            Link::CLogLog => {
                let p = mu.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                (-(1.0 - p).ln()).ln()
            }
            Link::Inverse => 1.0 / mu,
        }
    }

    /// Compute the inverse link h(η) = μ.
    pub fn inverse(&self, eta: f64) -> f64 {
        match self {
            Link::Identity => eta,
            Link::Log => eta.min(MAX_ETA).exp(),
            Link::Logit => {
                let eta = eta.clamp(-MAX_ETA, MAX_ETA);
                1.0 / (1.0 + (-eta).exp())
            }
            Link::Probit => standard_normal_cdf(eta.clamp(-MAX_PROBIT_ETA, MAX_PROBIT_ETA)),
            Link::CLogLog => {
                let eta = eta.clamp(-MAX_ETA, MAX_CLOGLOG_ETA);
                1.0 - (-eta.exp()).exp()
            }
            Link::Inverse => 1.0 / eta,
        }
    }

    /// True when `eta` lies beyond the range where `inverse` still varies.
    ///
    /// There the inverse is held constant, so its derivatives are 0.
    pub fn is_saturated(&self, eta: f64) -> bool {
        match self {
            Link::Identity | Link::Inverse => false,
            Link::Log => eta > MAX_ETA,
            Link::Logit => eta.abs() > MAX_ETA,
            Link::Probit => eta.abs() > MAX_PROBIT_ETA,
            Link::CLogLog => !(-MAX_ETA..=MAX_CLOGLOG_ETA).contains(&eta),
        }
    }

    /// First derivative of the inverse link, dμ/dη.
    pub fn inverse_derivative(&self, eta: f64) -> f64 {
        if self.is_saturated(eta) {
            return 0.0;
        }
        match self {
            Link::Identity => 1.0,
            Link::Log => eta.exp(),
            Link::Logit => {
                let mu = self.inverse(eta);
                mu * (1.0 - mu)
            }
            Link::Probit => standard_normal_pdf(eta),
            Link::CLogLog => (eta - eta.exp()).exp(),
            Link::Inverse => -1.0 / (eta * eta),
        }
    }

    /// Second derivative of the inverse link, d²μ/dη².
    pub fn inverse_second_derivative(&self, eta: f64) -> f64 {
        if self.is_saturated(eta) {
            return 0.0;
        }
        match self {
            Link::Identity => 0.0,
            Link::Log => eta.exp(),
            Link::Logit => {
                let mu = self.inverse(eta);
                mu * (1.0 - mu) * (1.0 - 2.0 * mu)
            }
            Link::Probit => -eta * standard_normal_pdf(eta),
            Link::CLogLog => (eta - eta.exp()).exp() * (1.0 - eta.exp()),
            Link::Inverse => 2.0 / (eta * eta * eta),
        }
    }

    /// Parse a link name as used in configuration strings.
    pub fn from_name(name: &str) -> Option<Link> {
        match name.trim().to_ascii_lowercase().as_str() {
            "identity" => Some(Link::Identity),
            "log" => Some(Link::Log),
            "logit" => Some(Link::Logit),
            "probit" => Some(Link::Probit),
            "cloglog" => Some(Link::CLogLog),
            "inverse" => Some(Link::Inverse),
            _ => None,
        }
    }
}
