//! Coefficient tables for fitted models.

use crate::core::EstimationResult;
use crate::utils::Matrix;
use std::fmt;

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub statistic: f64,
    pub p_value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Estimates with their Wald statistics, one row per parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientTable {
    pub rows: Vec<CoefficientRow>,
    pub confidence_level: f64,
}

impl CoefficientTable {
    /// Build the table from a result; statistics are NaN when inference was not computed.
    pub fn from_result(result: &EstimationResult) -> Self {
        let pick = |m: &Option<Matrix>, j: usize| {
            m.as_ref().map_or(f64::NAN, |m| m.at(j, 0))
        };
        let rows = result
            .parameter_names
            .iter()
            .enumerate()
            .map(|(j, name)| CoefficientRow {
                name: name.clone(),
                estimate: result.parameters.at(j, 0),
                std_error: pick(&result.std_errors, j),
                statistic: pick(&result.z_statistics, j),
                p_value: pick(&result.p_values, j),
                lower: pick(&result.conf_interval_lower, j),
                upper: pick(&result.conf_interval_upper, j),
            })
            .collect();
        Self {
            rows,
            confidence_level: result.confidence_level,
        }
    }
}

impl fmt::Display for CoefficientTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max(9);
        let level = self.confidence_level * 100.0;
        writeln!(
            f,
            "{:<width$} {:>12} {:>12} {:>9} {:>10} {:>12} {:>12}",
            "Parameter",
            "Estimate",
            "Std. Error",
            "z value",
            "Pr(>|z|)",
            format!("{:.1}% lo", level),
            format!("{:.1}% hi", level),
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:<width$} {:>12.6} {:>12.6} {:>9.3} {:>10.4} {:>12.6} {:>12.6}",
                r.name, r.estimate, r.std_error, r.statistic, r.p_value, r.lower, r.upper
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ModelStatus;
    use crate::inference::{CoefficientInference, ReferenceDistribution};

    #[test]
    fn test_table_rows() {
        let mut result = EstimationResult::new(
            vec!["(Intercept)".to_string(), "x".to_string()],
            Matrix::column(&[1.0, -2.0]),
            Matrix::zeros(4, 1),
            Matrix::zeros(4, 1),
            -3.0,
            2,
            ModelStatus::Converged,
        );
        let table = CoefficientTable::from_result(&result);
        assert!(table.rows[1].std_error.is_nan());

        result.covariance = Some(Matrix::diagonal(&[0.04, 1.0]));
        CoefficientInference::apply(&mut result, ReferenceDistribution::Normal, 0.9);
        let table = CoefficientTable::from_result(&result);
        assert_eq!(table.rows[1].name, "x");
        assert!((table.rows[0].std_error - 0.2).abs() < 1e-12);
        assert!((table.rows[1].statistic + 2.0).abs() < 1e-12);
        assert!((table.confidence_level - 0.9).abs() < 1e-12);

        let text = table.to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("(Intercept)"));
    }
}
