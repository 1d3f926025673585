//! Distributional families for generalized linear models.
//!
//! A [`Family`] pairs a distributional shape ([`FamilyKind`]) with a link
//! function and an optional extra parameter. The admissible links of every
//! family are declared in a static table and checked when the family is
//! created, so an incompatible pairing never reaches the optimizer.
//!
//! | Family           | Admissible links       | Extra parameter |
//! |------------------|------------------------|-----------------|
//! | Bernoulli        | Logit, Probit, CLogLog | none            |
//! | Poisson          | Log, Identity          | none            |
//! | NegativeBinomial | Log                    | θ (size)        |
//! | Gamma            | Log, Inverse, Identity | shape ν         |
//! | Gaussian         | Identity, Log, Inverse | variance σ²     |

use super::error::ConfigurationError;
use super::link::{Link, PROBABILITY_EPSILON};
use statrs::function::gamma::ln_gamma;
use std::f64::consts::PI;

/// Lower bound applied to strictly positive means.
const MEAN_EPSILON: f64 = 1e-10;

/// Fitted probabilities this close to 0 or 1, or count means this close to
/// 0, only arise when the likelihood has no finite maximum.
const DEGENERATE_MEAN_TOLERANCE: f64 = 1e-8;

/// The closed set of supported distributional shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    Bernoulli,
    Poisson,
    NegativeBinomial,
    Gamma,
    Gaussian,
}

impl FamilyKind {
    /// Links that may be paired with this family.
    pub fn admissible_links(&self) -> &'static [Link] {
        match self {
            FamilyKind::Bernoulli => &[Link::Logit, Link::Probit, Link::CLogLog],
            FamilyKind::Poisson => &[Link::Log, Link::Identity],
            FamilyKind::NegativeBinomial => &[Link::Log],
            FamilyKind::Gamma => &[Link::Log, Link::Inverse, Link::Identity],
            FamilyKind::Gaussian => &[Link::Identity, Link::Log, Link::Inverse],
        }
    }

    /// Canonical (or conventional default) link for this family.
    pub fn default_link(&self) -> Link {
        match self {
            FamilyKind::Bernoulli => Link::Logit,
            FamilyKind::Poisson | FamilyKind::NegativeBinomial | FamilyKind::Gamma => Link::Log,
            FamilyKind::Gaussian => Link::Identity,
        }
    }

    pub fn is_admissible(&self, link: Link) -> bool {
        self.admissible_links().contains(&link)
    }

    /// Whether the family carries an extra dispersion or shape parameter.
    pub fn has_extra_parameter(&self) -> bool {
        matches!(
            self,
            FamilyKind::NegativeBinomial | FamilyKind::Gamma | FamilyKind::Gaussian
        )
    }
}

/// A validated (family, link, extra parameter) combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Family {
    kind: FamilyKind,
    link: Link,
    extra: f64,
}

impl Family {
    /// Create a family, rejecting links outside the admissible set.
    ///
    /// `extra` carries θ for the negative binomial (V(μ) = μ + μ²/θ), the
    /// shape ν for the gamma and the variance σ² for the Gaussian. It
    /// defaults to 1 when absent and is ignored for Bernoulli and Poisson.
    pub fn create(
        kind: FamilyKind,
        link: Link,
        extra: Option<f64>,
    ) -> Result<Self, ConfigurationError> {
        if !kind.is_admissible(link) {
            return Err(ConfigurationError::IncompatibleLink { family: kind, link });
        }

        let extra = if kind.has_extra_parameter() {
            let value = extra.unwrap_or(1.0);
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "extra_parameter",
                    reason: format!("must be positive and finite for {:?}, got {}", kind, value),
                });
            }
            value
        } else {
            1.0
        };

        Ok(Self { kind, link, extra })
    }

    /// Create a family with its default link.
    pub fn with_default_link(kind: FamilyKind) -> Self {
        Self {
            kind,
            link: kind.default_link(),
            extra: 1.0,
        }
    }

    pub fn kind(&self) -> FamilyKind {
        self.kind
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn extra_parameter(&self) -> f64 {
        self.extra
    }

    /// Same family and link with a different extra parameter.
    pub fn with_extra_parameter(&self, extra: f64) -> Result<Self, ConfigurationError> {
        Self::create(self.kind, self.link, Some(extra))
    }

    fn clamp_mean(&self, mu: f64) -> f64 {
        match self.kind {
            FamilyKind::Bernoulli => mu.clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON),
            FamilyKind::Poisson | FamilyKind::NegativeBinomial | FamilyKind::Gamma => {
                mu.max(MEAN_EPSILON)
            }
            FamilyKind::Gaussian => mu,
        }
    }

    // ========== Variance Function ==========

    /// Variance of Y as a function of its mean.
    pub fn variance(&self, mu: f64) -> f64 {
        let mu = self.clamp_mean(mu);
        match self.kind {
            FamilyKind::Bernoulli => mu * (1.0 - mu),
            FamilyKind::Poisson => mu,
            FamilyKind::NegativeBinomial => mu + mu * mu / self.extra,
            FamilyKind::Gamma => mu * mu / self.extra,
            FamilyKind::Gaussian => self.extra,
        }
    }

    // ========== Log-likelihood ==========

    /// Log-likelihood of a single observation with mean `mu`.
    pub fn log_likelihood(&self, y: f64, mu: f64) -> f64 {
        let mu = self.clamp_mean(mu);
        match self.kind {
            FamilyKind::Bernoulli => y * mu.ln() + (1.0 - y) * (1.0 - mu).ln(),
            FamilyKind::Poisson => y * mu.ln() - mu - ln_gamma(y + 1.0),
            FamilyKind::NegativeBinomial => {
                let theta = self.extra;
                ln_gamma(y + theta) - ln_gamma(theta) - ln_gamma(y + 1.0)
                    + theta * (theta / (theta + mu)).ln()
                    + y * (mu / (theta + mu)).ln()
            }
            FamilyKind::Gamma => {
                let nu = self.extra;
                nu * (nu / mu).ln() + (nu - 1.0) * y.ln() - nu * y / mu - ln_gamma(nu)
            }
            FamilyKind::Gaussian => {
                let sigma2 = self.extra;
                -0.5 * (2.0 * PI * sigma2).ln() - (y - mu).powi(2) / (2.0 * sigma2)
            }
        }
    }

    /// First derivative of the observation log-likelihood with respect to μ.
    ///
    /// Zero where the mean is clamped, since the log-likelihood is constant there.
    pub fn log_likelihood_derivative(&self, y: f64, mu: f64) -> f64 {
        if self.clamp_mean(mu) != mu {
            return 0.0;
        }
        match self.kind {
            FamilyKind::Bernoulli => y / mu - (1.0 - y) / (1.0 - mu),
            FamilyKind::Poisson => y / mu - 1.0,
            FamilyKind::NegativeBinomial => {
                let theta = self.extra;
                y / mu - (theta + y) / (theta + mu)
            }
            FamilyKind::Gamma => {
                let nu = self.extra;
                nu * (y - mu) / (mu * mu)
            }
            FamilyKind::Gaussian => (y - mu) / self.extra,
        }
    }

    /// Second derivative of the observation log-likelihood with respect to μ.
    pub fn log_likelihood_second_derivative(&self, y: f64, mu: f64) -> f64 {
        if self.clamp_mean(mu) != mu {
            return 0.0;
        }
        match self.kind {
            FamilyKind::Bernoulli => -y / (mu * mu) - (1.0 - y) / ((1.0 - mu) * (1.0 - mu)),
            FamilyKind::Poisson => -y / (mu * mu),
            FamilyKind::NegativeBinomial => {
                let theta = self.extra;
                -y / (mu * mu) + (theta + y) / ((theta + mu) * (theta + mu))
            }
            FamilyKind::Gamma => {
                let nu = self.extra;
                nu / (mu * mu) - 2.0 * nu * y / (mu * mu * mu)
            }
            FamilyKind::Gaussian => -1.0 / self.extra,
        }
    }

    // ========== Deviance ==========

    /// Unit deviance d(y, μ); the model deviance is the sum over observations.
    pub fn unit_deviance(&self, y: f64, mu: f64) -> f64 {
        let mu = self.clamp_mean(mu);
        let dev = match self.kind {
            FamilyKind::Bernoulli => {
                let term1 = if y > 0.0 { y * (y / mu).ln() } else { 0.0 };
                let term2 = if y < 1.0 {
                    (1.0 - y) * ((1.0 - y) / (1.0 - mu)).ln()
                } else {
                    0.0
                };
                2.0 * (term1 + term2)
            }
            FamilyKind::Poisson => {
                if y > 0.0 {
                    2.0 * (y * (y / mu).ln() - (y - mu))
                } else {
                    2.0 * mu
                }
            }
            FamilyKind::NegativeBinomial => {
                let theta = self.extra;
                if y > 0.0 {
                    2.0 * (y * (y / mu).ln() - (y + theta) * ((y + theta) / (mu + theta)).ln())
                } else {
                    2.0 * theta * ((theta + mu) / theta).ln()
                }
            }
            FamilyKind::Gamma => 2.0 * (-(y / mu).ln() + (y - mu) / mu),
            FamilyKind::Gaussian => (y - mu).powi(2),
        };
        dev.max(0.0)
    }

    /// Total deviance over paired responses and means.
    pub fn deviance(&self, y: &[f64], mu: &[f64]) -> f64 {
        y.iter()
            .zip(mu.iter())
            .map(|(&yi, &mui)| self.unit_deviance(yi, mui))
            .sum()
    }

    // ========== Response checks ==========

    /// Check that `y` lies in the support of the family.
    pub fn validate_response(&self, y: f64) -> Result<(), String> {
        if !y.is_finite() {
            return Err(format!("response must be finite, got {}", y));
        }
        match self.kind {
            FamilyKind::Bernoulli if y != 0.0 && y != 1.0 => {
                Err(format!("Bernoulli response must be 0 or 1, got {}", y))
            }
            FamilyKind::Poisson | FamilyKind::NegativeBinomial if y < 0.0 || y.fract() != 0.0 => {
                Err(format!("count response must be a non-negative integer, got {}", y))
            }
            FamilyKind::Gamma if y <= 0.0 => {
                Err(format!("Gamma response must be positive, got {}", y))
            }
            _ => Ok(()),
        }
    }

    /// Whether `mu` is an attainable mean for the family.
    pub fn is_valid_mean(&self, mu: f64) -> bool {
        match self.kind {
            FamilyKind::Bernoulli => (0.0..=1.0).contains(&mu),
            FamilyKind::Poisson | FamilyKind::NegativeBinomial | FamilyKind::Gamma => {
                mu > 0.0 && mu.is_finite()
            }
            FamilyKind::Gaussian => mu.is_finite(),
        }
    }

    /// True for fitted probabilities numerically 0 or 1 and count means
    /// numerically 0. Other families have no such boundary.
    pub fn is_degenerate_mean(&self, mu: f64) -> bool {
        match self.kind {
            FamilyKind::Bernoulli => {
                mu < DEGENERATE_MEAN_TOLERANCE || mu > 1.0 - DEGENERATE_MEAN_TOLERANCE
            }
            FamilyKind::Poisson | FamilyKind::NegativeBinomial => mu < DEGENERATE_MEAN_TOLERANCE,
            FamilyKind::Gamma | FamilyKind::Gaussian => false,
        }
    }

    /// A mean value inside the domain of the link, used to seed the intercept.
    pub fn starting_mean(&self, y: &[f64]) -> f64 {
        let n = y.len().max(1) as f64;
        let mean = y.iter().sum::<f64>() / n;
        match self.kind {
            FamilyKind::Bernoulli => mean.clamp(0.01, 0.99),
            FamilyKind::Poisson | FamilyKind::NegativeBinomial | FamilyKind::Gamma => {
                mean.max(0.1)
            }
            FamilyKind::Gaussian => {
                if self.link == Link::Identity {
                    mean
                } else {
                    mean.abs().max(0.1)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_links_rejected() {
        assert!(matches!(
            Family::create(FamilyKind::Bernoulli, Link::Log, None),
            Err(ConfigurationError::IncompatibleLink {
                family: FamilyKind::Bernoulli,
                link: Link::Log
            })
        ));
        assert!(matches!(
            Family::create(FamilyKind::NegativeBinomial, Link::Logit, Some(2.0)),
            Err(ConfigurationError::IncompatibleLink { .. })
        ));
        assert!(Family::create(FamilyKind::Bernoulli, Link::Logit, None).is_ok());
    }

    #[test]
    fn test_extra_parameter_validation() {
        assert!(matches!(
            Family::create(FamilyKind::NegativeBinomial, Link::Log, Some(-1.0)),
            Err(ConfigurationError::InvalidParameter { .. })
        ));
        let nb = Family::create(FamilyKind::NegativeBinomial, Link::Log, None).unwrap();
        assert_eq!(nb.extra_parameter(), 1.0);
    }

    #[test]
    fn test_default_links_are_admissible() {
        for kind in [
            FamilyKind::Bernoulli,
            FamilyKind::Poisson,
            FamilyKind::NegativeBinomial,
            FamilyKind::Gamma,
            FamilyKind::Gaussian,
        ] {
            assert!(kind.is_admissible(kind.default_link()));
        }
    }

    #[test]
    fn test_variance_functions() {
        let bern = Family::with_default_link(FamilyKind::Bernoulli);
        assert!((bern.variance(0.2) - 0.16).abs() < 1e-12);

        let nb = Family::create(FamilyKind::NegativeBinomial, Link::Log, Some(2.0)).unwrap();
        // V(5) = 5 + 25/2
        assert!((nb.variance(5.0) - 17.5).abs() < 1e-12);

        let poisson = Family::with_default_link(FamilyKind::Poisson);
        assert!((poisson.variance(3.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_likelihood_derivatives() {
        let families = [
            (Family::with_default_link(FamilyKind::Bernoulli), 1.0, 0.3),
            (Family::with_default_link(FamilyKind::Poisson), 4.0, 2.5),
            (
                Family::create(FamilyKind::NegativeBinomial, Link::Log, Some(1.7)).unwrap(),
                3.0,
                2.0,
            ),
            (
                Family::create(FamilyKind::Gamma, Link::Log, Some(2.0)).unwrap(),
                1.3,
                0.9,
            ),
            (
                Family::create(FamilyKind::Gaussian, Link::Identity, Some(0.5)).unwrap(),
                1.0,
                0.2,
            ),
        ];
        let h = 1e-6;
        for (family, y, mu) in families {
            let numeric =
                (family.log_likelihood(y, mu + h) - family.log_likelihood(y, mu - h)) / (2.0 * h);
            assert!((numeric - family.log_likelihood_derivative(y, mu)).abs() < 1e-6);
            let numeric_second = (family.log_likelihood_derivative(y, mu + h)
                - family.log_likelihood_derivative(y, mu - h))
                / (2.0 * h);
            assert!(
                (numeric_second - family.log_likelihood_second_derivative(y, mu)).abs() < 1e-5
            );
        }
    }

    #[test]
    fn test_clamped_means_have_flat_log_likelihood() {
        let bern = Family::with_default_link(FamilyKind::Bernoulli);
        assert_eq!(bern.log_likelihood(1.0, 1.0), bern.log_likelihood(1.0, 1.0 - 1e-12));
        assert_eq!(bern.log_likelihood_derivative(1.0, 1.0 - 1e-12), 0.0);
        assert_eq!(bern.log_likelihood_second_derivative(0.0, 1e-13), 0.0);
        assert!(bern.log_likelihood_derivative(1.0, 0.5) > 0.0);

        assert!(bern.is_degenerate_mean(1.0 - 1e-9));
        assert!(bern.is_degenerate_mean(1e-9));
        assert!(!bern.is_degenerate_mean(1e-6));
        let poisson = Family::with_default_link(FamilyKind::Poisson);
        assert!(poisson.is_degenerate_mean(1e-9));
        assert!(!poisson.is_degenerate_mean(1e3));
        let gamma = Family::create(FamilyKind::Gamma, Link::Log, Some(2.0)).unwrap();
        assert!(!gamma.is_degenerate_mean(1e-9));
    }

    #[test]
    fn test_poisson_log_likelihood_value() {
        let poisson = Family::with_default_link(FamilyKind::Poisson);
        // log(P(Y = 2 | μ = 3)) = 2 log 3 - 3 - log 2
        let expected = 2.0 * 3.0_f64.ln() - 3.0 - 2.0_f64.ln();
        assert!((poisson.log_likelihood(2.0, 3.0) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_unit_deviance() {
        let gaussian = Family::with_default_link(FamilyKind::Gaussian);
        assert!((gaussian.unit_deviance(3.0, 2.0) - 1.0).abs() < 1e-12);
        let poisson = Family::with_default_link(FamilyKind::Poisson);
        assert!(poisson.deviance(&[1.0, 2.0], &[1.0, 2.0]).abs() < 1e-12);
    }

    #[test]
    fn test_validate_response() {
        let bern = Family::with_default_link(FamilyKind::Bernoulli);
        assert!(bern.validate_response(1.0).is_ok());
        assert!(bern.validate_response(0.5).is_err());
        let poisson = Family::with_default_link(FamilyKind::Poisson);
        assert!(poisson.validate_response(2.5).is_err());
        assert!(poisson.validate_response(-1.0).is_err());
        let gamma = Family::with_default_link(FamilyKind::Gamma);
        assert!(gamma.validate_response(0.0).is_err());
    }

    #[test]
    fn test_valid_means() {
        let poisson = Family::create(FamilyKind::Poisson, Link::Identity, None).unwrap();
        assert!(poisson.is_valid_mean(0.5));
        assert!(!poisson.is_valid_mean(-0.5));
        let bern = Family::with_default_link(FamilyKind::Bernoulli);
        assert!(bern.is_valid_mean(1.0));
        assert!(!bern.is_valid_mean(f64::NAN));
    }
}
