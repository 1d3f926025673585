//! Reference-value tests for generalized linear models.
//!
//! Reference estimates were obtained with an independent Newton-Raphson fit
//! of the same likelihood on `common::reference_table()`.

mod common;

use approx::assert_relative_eq;
use copula_glm::core::{
    ConfigurationError, ConvergenceCriterion, FamilyKind, Link, OptimizerOptions,
};
use copula_glm::data::DataSet;
use copula_glm::solvers::{
    Bounds, EstimationError, FittedModel, GeneralizedLinearModel, LinearModel, Model,
    OptimizationStatus,
};
use copula_glm::Matrix;

fn coefficient(fitted: &impl FittedModel, index: usize) -> f64 {
    fitted.parameters().get_value_at(index, 0).unwrap()
}

// ============================================================================
// Reference Log-Likelihoods
// ============================================================================

#[test]
fn test_logistic_reference_log_likelihood() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "y ~ x")
        .family(FamilyKind::Bernoulli)
        .build()
        .expect("valid model")
        .estimate()
        .expect("fit should succeed");

    assert!(fitted.is_converged());
    assert_eq!(fitted.optimization_status(), OptimizationStatus::Converged);
    assert_relative_eq!(fitted.log_likelihood(), -9.67828055591321, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 0), -0.40452673850705745, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 1), 1.2816344248694462, epsilon = 1e-5);
}

#[test]
fn test_probit_reference_log_likelihood() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "y ~ x")
        .link(Link::Probit)
        .build()
        .unwrap()
        .estimate()
        .unwrap();

    assert!(fitted.is_converged());
    assert_relative_eq!(fitted.log_likelihood(), -9.647166885224502, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 0), -0.22281434880611234, epsilon = 1e-4);
    assert_relative_eq!(coefficient(&fitted, 1), 0.7620990268988709, epsilon = 1e-4);
}

#[test]
fn test_poisson_reference_log_likelihood() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "count ~ x")
        .family(FamilyKind::Poisson)
        .build()
        .unwrap()
        .estimate()
        .unwrap();

    assert!(fitted.is_converged());
    assert_relative_eq!(fitted.log_likelihood(), -28.305348108858983, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 0), 0.45154858269532516, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 1), 0.6832067164090686, epsilon = 1e-5);

    // Canonical link: fitted means sum to the observed total
    let total: f64 = fitted.fitted_values().to_vec().iter().sum();
    assert_relative_eq!(total, 63.0, epsilon = 1e-5);
}

#[test]
fn test_negative_binomial_reference_log_likelihood() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "count ~ x")
        .family(FamilyKind::NegativeBinomial)
        .extra_parameter(2.0)
        .build()
        .unwrap()
        .estimate()
        .unwrap();

    assert!(fitted.is_converged());
    assert_eq!(fitted.family().extra_parameter(), 2.0);
    assert_relative_eq!(fitted.log_likelihood(), -36.57885809827988, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 0), 0.4410174305829692, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 1), 0.694436697207211, epsilon = 1e-5);
}

#[test]
fn test_gamma_log_link_reference_log_likelihood() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "size ~ x")
        .family(FamilyKind::Gamma)
        .link(Link::Log)
        .extra_parameter(3.0)
        .build()
        .unwrap()
        .estimate()
        .unwrap();

    assert!(fitted.is_converged());
    assert_relative_eq!(fitted.log_likelihood(), -20.7365275923549, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 0), 0.34312471830769, epsilon = 1e-5);
    assert_relative_eq!(coefficient(&fitted, 1), 0.5727483488882429, epsilon = 1e-5);
}

#[test]
fn test_gaussian_identity_matches_least_squares() {
    let data = common::reference_table();
    let fitted = GeneralizedLinearModel::builder(&data, "size ~ x")
        .family(FamilyKind::Gaussian)
        .link(Link::Identity)
        .build()
        .unwrap()
        .estimate()
        .unwrap();
    let ols = LinearModel::new(&data, "size ~ x").unwrap().estimate().unwrap();

    assert!(fitted.is_converged());
    for j in 0..2 {
        assert_relative_eq!(coefficient(&fitted, j), coefficient(&ols, j), epsilon = 1e-8);
    }
    assert_relative_eq!(coefficient(&fitted, 0), 1.8185226712113738, epsilon = 1e-8);
    assert_relative_eq!(coefficient(&fitted, 1), 1.1873346190070413, epsilon = 1e-8);
    // Unit variance
    assert_relative_eq!(fitted.log_likelihood(), -21.904648136399146, epsilon = 1e-6);
}

#[test]
fn test_gradient_norm_criterion_reaches_same_optimum() {
    let options = OptimizerOptions::builder()
        .criterion(ConvergenceCriterion::GradientNorm)
        .tolerance(1e-9)
        .build()
        .unwrap();
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "y ~ x")
        .options(options)
        .build()
        .unwrap()
        .estimate()
        .unwrap();
    assert!(fitted.is_converged());
    assert_relative_eq!(fitted.log_likelihood(), -9.67828055591321, epsilon = 1e-8);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_fit_is_deterministic() {
    let fit = || {
        GeneralizedLinearModel::builder(&common::reference_table(), "count ~ x")
            .family(FamilyKind::Poisson)
            .starting_values(&[0.1, 0.1])
            .build()
            .unwrap()
            .estimate()
            .unwrap()
    };
    let first = fit();
    let second = fit();
    assert_eq!(first.log_likelihood().to_bits(), second.log_likelihood().to_bits());
    assert_eq!(first.parameters().to_vec(), second.parameters().to_vec());
    assert_eq!(first.result().iterations, second.result().iterations);
}

// ============================================================================
// Bounds, Status and Errors
// ============================================================================

#[test]
fn test_bounded_slope_stays_on_bound() {
    let bounds = Bounds::new(vec![f64::NEG_INFINITY, 0.0], vec![f64::INFINITY, 0.5]).unwrap();
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "y ~ x")
        .bounds(bounds)
        .build()
        .unwrap()
        .estimate()
        .unwrap();
    // The unconstrained slope (1.28) lies above the bound
    assert_eq!(coefficient(&fitted, 1), 0.5);
    assert!(fitted.is_converged());
}

#[test]
fn test_iteration_cap_is_a_status() {
    let options = OptimizerOptions::builder().max_iterations(1).build().unwrap();
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "count ~ x")
        .family(FamilyKind::Poisson)
        .options(options)
        .build()
        .unwrap()
        .estimate()
        .expect("non-convergence is not an error");
    assert!(!fitted.is_converged());
    assert_eq!(
        fitted.optimization_status(),
        OptimizationStatus::MaxIterationsReached
    );
}

#[test]
fn test_separated_data_is_not_converged() {
    let data = DataSet::from_numeric_columns(&[
        ("x", vec![-2.0, -1.0, -0.5, 0.5, 1.0, 2.0]),
        ("y", vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
    ])
    .unwrap();
    for criterion in [
        ConvergenceCriterion::ObjectiveChange,
        ConvergenceCriterion::GradientNorm,
    ] {
        let options = OptimizerOptions::builder().criterion(criterion).build().unwrap();
        let fitted = GeneralizedLinearModel::builder(&data, "y ~ x")
            .options(options)
            .build()
            .unwrap()
            .estimate()
            .expect("non-convergence is not an error");

        // The likelihood approaches 0 only as the slope diverges
        assert!(!fitted.is_converged());
        assert_eq!(fitted.optimization_status(), OptimizationStatus::Unbounded);
        assert!(coefficient(&fitted, 1) > 10.0);
        assert!(fitted.log_likelihood() <= 0.0);
    }
}

#[test]
fn test_configuration_errors_are_raised_at_build() {
    let data = common::reference_table();
    assert!(matches!(
        GeneralizedLinearModel::builder(&data, "y ~ x").link(Link::Log).build(),
        Err(EstimationError::Configuration(ConfigurationError::IncompatibleLink { .. }))
    ));
    assert!(matches!(
        GeneralizedLinearModel::builder(&data, "y ~ missing").build(),
        Err(EstimationError::Configuration(ConfigurationError::UnknownField(_)))
    ));
    assert!(matches!(
        GeneralizedLinearModel::builder(&data, "y ~ x")
            .starting_values(&[0.0, 2.0])
            .bounds(Bounds::new(vec![-1.0, -1.0], vec![1.0, 1.0]).unwrap())
            .build(),
        Err(EstimationError::Configuration(
            ConfigurationError::StartOutsideBounds { index: 1, .. }
        ))
    ));
    assert!(matches!(
        GeneralizedLinearModel::builder(&data, "count ~ x")
            .family(FamilyKind::NegativeBinomial)
            .extra_parameter(-2.0)
            .build(),
        Err(EstimationError::Configuration(ConfigurationError::InvalidParameter { .. }))
    ));
}

#[test]
fn test_predict_means() {
    let fitted = GeneralizedLinearModel::builder(&common::reference_table(), "count ~ x")
        .family(FamilyKind::Poisson)
        .build()
        .unwrap()
        .estimate()
        .unwrap();
    let rows = Matrix::from_rows(&[&[1.0, 0.0], &[1.0, 1.0]]).unwrap();
    let mu = fitted.predict(&rows).unwrap();
    let (b0, b1) = (coefficient(&fitted, 0), coefficient(&fitted, 1));
    assert_relative_eq!(mu.get_value_at(0, 0).unwrap(), b0.exp(), epsilon = 1e-12);
    assert_relative_eq!(mu.get_value_at(1, 0).unwrap(), (b0 + b1).exp(), epsilon = 1e-12);
    assert!(fitted.deviance() > 0.0);
}
