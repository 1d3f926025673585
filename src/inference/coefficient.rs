//! Coefficient inference calculations.

use crate::core::EstimationResult;
use crate::utils::Matrix;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Reference distribution of the test statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceDistribution {
    /// Asymptotic normal, used for likelihood-based fits (Wald z tests).
    Normal,
    /// Student t with the given residual degrees of freedom (OLS).
    StudentsT(f64),
}

impl ReferenceDistribution {
    fn cdf(&self, x: f64) -> f64 {
        match *self {
            ReferenceDistribution::Normal => Normal::new(0.0, 1.0)
                .map(|d| d.cdf(x))
                .unwrap_or(f64::NAN),
            ReferenceDistribution::StudentsT(df) => StudentsT::new(0.0, 1.0, df)
                .map(|d| d.cdf(x))
                .unwrap_or(f64::NAN),
        }
    }

    fn inverse_cdf(&self, p: f64) -> f64 {
        match *self {
            ReferenceDistribution::Normal => Normal::new(0.0, 1.0)
                .map(|d| d.inverse_cdf(p))
                .unwrap_or(f64::NAN),
            ReferenceDistribution::StudentsT(df) => StudentsT::new(0.0, 1.0, df)
                .map(|d| d.inverse_cdf(p))
                .unwrap_or(f64::NAN),
        }
    }
}

/// Computes inference statistics for estimated parameters.
pub struct CoefficientInference;

impl CoefficientInference {
    /// Standard errors from a covariance matrix.
    ///
    /// SE(β_j) = sqrt(Cov_jj), NaN when the diagonal entry is negative.
    pub fn standard_errors(covariance: &Matrix) -> Matrix {
        Matrix::from_fn(covariance.nrows(), 1, |j, _| {
            let var = covariance.at(j, j);
            if var >= 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
    }

    /// Test statistics β_j / SE(β_j).
    pub fn statistics(parameters: &Matrix, std_errors: &Matrix) -> Matrix {
        Matrix::from_fn(parameters.nrows(), 1, |j, _| {
            let se = std_errors.at(j, 0);
            if se.is_nan() || se == 0.0 {
                f64::NAN
            } else {
                parameters.at(j, 0) / se
            }
        })
    }

    /// Two-sided p-values, p_j = 2 · P(|T| > |t_j|).
    pub fn p_values(statistics: &Matrix, reference: ReferenceDistribution) -> Matrix {
        Matrix::from_fn(statistics.nrows(), 1, |j, _| {
            let t = statistics.at(j, 0);
            if t.is_nan() {
                f64::NAN
            } else {
                2.0 * (1.0 - reference.cdf(t.abs()))
            }
        })
    }

    /// Wald confidence intervals β_j ± q_{1-α/2} · SE(β_j).
    pub fn confidence_intervals(
        parameters: &Matrix,
        std_errors: &Matrix,
        reference: ReferenceDistribution,
        confidence_level: f64,
    ) -> (Matrix, Matrix) {
        let alpha = 1.0 - confidence_level;
        let critical = reference.inverse_cdf(1.0 - alpha / 2.0);
        let bound = |sign: f64| {
            Matrix::from_fn(parameters.nrows(), 1, |j, _| {
                parameters.at(j, 0) + sign * critical * std_errors.at(j, 0)
            })
        };
        (bound(-1.0), bound(1.0))
    }

    /// Fill the inference fields of `result` from its covariance matrix.
    ///
    /// Does nothing when the covariance is absent.
    pub fn apply(
        result: &mut EstimationResult,
        reference: ReferenceDistribution,
        confidence_level: f64,
    ) {
        let Some(covariance) = result.covariance.as_ref() else {
            return;
        };
        let se = Self::standard_errors(covariance);
        let statistics = Self::statistics(&result.parameters, &se);
        let p_values = Self::p_values(&statistics, reference);
        let (lower, upper) =
            Self::confidence_intervals(&result.parameters, &se, reference, confidence_level);

        result.std_errors = Some(se);
        result.z_statistics = Some(statistics);
        result.p_values = Some(p_values);
        result.conf_interval_lower = Some(lower);
        result.conf_interval_upper = Some(upper);
        result.confidence_level = confidence_level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics() {
        let parameters = Matrix::column(&[1.0, 2.0, 3.0]);
        let se = CoefficientInference::standard_errors(&Matrix::diagonal(&[0.25, 0.25, 0.0]));

        let stats = CoefficientInference::statistics(&parameters, &se);

        assert!((stats.at(0, 0) - 2.0).abs() < 1e-10);
        assert!((stats.at(1, 0) - 4.0).abs() < 1e-10);
        assert!(stats.at(2, 0).is_nan());
    }

    #[test]
    fn test_p_values_bounds() {
        let stats = Matrix::column(&[0.0, 1.0, 2.0, 3.0]);
        for reference in [
            ReferenceDistribution::Normal,
            ReferenceDistribution::StudentsT(10.0),
        ] {
            let p = CoefficientInference::p_values(&stats, reference);
            assert!((p.at(0, 0) - 1.0).abs() < 1e-12);
            for j in 0..4 {
                assert!(p.at(j, 0) >= 0.0 && p.at(j, 0) <= 1.0);
            }
        }
        // P(|Z| > 1.96) ≈ 0.05
        let p = CoefficientInference::p_values(&Matrix::column(&[1.959964]), ReferenceDistribution::Normal);
        assert!((p.at(0, 0) - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_wald_interval() {
        let parameters = Matrix::column(&[1.0]);
        let se = Matrix::column(&[0.5]);
        let (lower, upper) = CoefficientInference::confidence_intervals(
            &parameters,
            &se,
            ReferenceDistribution::Normal,
            0.95,
        );
        assert!((lower.at(0, 0) - (1.0 - 1.959964 * 0.5)).abs() < 1e-5);
        assert!((upper.at(0, 0) - (1.0 + 1.959964 * 0.5)).abs() < 1e-5);
    }
}
