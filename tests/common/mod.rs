//! Common test utilities and data generators.

#![allow(dead_code)]

use copula_glm::data::{DataSet, FieldType, Value};

/// Deterministic uniform draws in [-1, 1] (SplitMix64) for reproducible tables.
pub fn uniform_sequence(n: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state.wrapping_add(0x9E3779B97F4A7C15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
            z ^= z >> 31;
            (z >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        })
        .collect()
}

/// Continuous response y = 1 + 2 x1 - 0.5 x2 + group effect + noise.
pub fn linear_table(n: usize, noise: f64, seed: u64) -> DataSet {
    let draws = uniform_sequence(3 * n, seed);
    let mut data = DataSet::new(
        &["x1", "x2", "group", "y"],
        &[
            FieldType::Numeric,
            FieldType::Numeric,
            FieldType::Text,
            FieldType::Numeric,
        ],
    )
    .expect("valid schema");

    let groups = ["a", "b", "c"];
    let effects = [0.0, 1.5, -0.75];
    for i in 0..n {
        let x1 = 5.0 * draws[3 * i];
        let x2 = 10.0 * draws[3 * i + 1];
        let g = i % 3;
        let y = 1.0 + 2.0 * x1 - 0.5 * x2 + effects[g] + noise * draws[3 * i + 2];
        data.add_record(vec![
            Value::Number(x1),
            Value::Number(x2),
            Value::from(groups[g]),
            Value::Number(y),
        ])
        .expect("valid record");
    }
    data
}

/// Fixed 20-row table with a covariate, a binary response, a count and a
/// positive continuous size.
pub fn reference_table() -> DataSet {
    let x = vec![
        0.5, 1.2, -0.3, 2.1, -1.4, 0.8, 1.7, -0.9, 0.1, 2.6, -2.2, 1.1, 0.4, -0.6, 1.9, -1.1, 0.9,
        2.3, -0.2, 1.4,
    ];
    let y = vec![
        1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0,
        0.0, 0.0,
    ];
    let count = vec![
        2.0, 4.0, 1.0, 6.0, 0.0, 3.0, 5.0, 1.0, 2.0, 9.0, 0.0, 3.0, 2.0, 1.0, 6.0, 2.0, 3.0, 8.0,
        1.0, 4.0,
    ];
    let size = vec![
        1.8, 2.9, 1.1, 4.7, 0.6, 2.2, 3.8, 0.9, 1.5, 6.3, 0.4, 2.6, 1.7, 1.0, 4.1, 0.8, 2.4, 5.5,
        1.3, 3.0,
    ];
    DataSet::from_numeric_columns(&[("x", x), ("y", y), ("count", count), ("size", size)])
        .expect("valid table")
}

/// Trees on square plots: plot label, coordinates, diameter and a binary
/// mortality outcome drawn from a logistic model with a shared plot effect,
/// so outcomes are positively dependent within a plot.
pub fn plot_table(n_plots: usize, trees_per_plot: usize, seed: u64) -> DataSet {
    let n = n_plots * trees_per_plot;
    let draws = uniform_sequence(4 * n, seed);
    let plot_effects = uniform_sequence(n_plots, seed ^ 0x5DEECE66D);
    let mut data = DataSet::new(
        &["plot", "east", "north", "dbh", "dead"],
        &[
            FieldType::Text,
            FieldType::Numeric,
            FieldType::Numeric,
            FieldType::Numeric,
            FieldType::Numeric,
        ],
    )
    .expect("valid schema");

    for i in 0..n {
        let k = i / trees_per_plot;
        let plot = format!("plot{}", k);
        let east = 20.0 * (draws[4 * i] + 1.0);
        let north = 20.0 * (draws[4 * i + 1] + 1.0);
        let dbh = 1.5 * draws[4 * i + 2];
        let eta = -0.3 + 0.8 * dbh + 1.5 * plot_effects[k];
        let p = 1.0 / (1.0 + (-eta).exp());
        let u = 0.5 * (draws[4 * i + 3] + 1.0);
        let dead = if u < p { 1.0 } else { 0.0 };
        data.add_record(vec![
            Value::Text(plot),
            Value::Number(east),
            Value::Number(north),
            Value::Number(dbh),
            Value::Number(dead),
        ])
        .expect("valid record");
    }
    data
}
