//! Model-ready views of a table: design matrix, response and clusters.

use super::distance::DistanceRecorder;
use super::formula::{parse_field_list, ModelFormula, Term};
use super::table::{numeric_field, FieldType, Table};
use crate::core::ConfigurationError;
use crate::utils::Matrix;

/// Name of the intercept column.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// Design matrix X and response Y built from a table and a model formula.
///
/// Numeric fields enter as one column. Text fields are treatment coded: one
/// indicator column per level except the first level in sorted order, named
/// `field_level`. Interaction columns are element-wise products of the
/// columns of their fields, named with `:`.
#[derive(Debug, Clone)]
pub struct DataStructure {
    formula: ModelFormula,
    column_names: Vec<String>,
    x: Matrix,
    y: Matrix,
}

/// Columns contributed by a single field.
struct FieldBlock {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

fn field_block(table: &dyn Table, field: &str) -> Result<FieldBlock, ConfigurationError> {
    let index = table
        .field_index(field)
        .ok_or_else(|| ConfigurationError::UnknownField(field.to_string()))?;

    match table.field_types()[index] {
        FieldType::Numeric => Ok(FieldBlock {
            names: vec![field.to_string()],
            columns: vec![numeric_field(table, field)?],
        }),
        FieldType::Text => {
            let keys: Vec<String> = table.records().iter().map(|r| r[index].as_key()).collect();
            let mut levels = keys.clone();
            levels.sort();
            levels.dedup();

            let (names, columns): (Vec<String>, Vec<Vec<f64>>) = levels
                .iter()
                .skip(1)
                .map(|level| {
                    let column: Vec<f64> = keys
                        .iter()
                        .map(|k| if k == level { 1.0 } else { 0.0 })
                        .collect();
                    (format!("{}_{}", field, level), column)
                })
                .unzip();
            Ok(FieldBlock { names, columns })
        }
    }
}

fn term_block(table: &dyn Table, term: &Term) -> Result<FieldBlock, ConfigurationError> {
    let n = table.n_records();
    let mut block = FieldBlock {
        names: vec![String::new()],
        columns: vec![vec![1.0; n]],
    };

    for field in &term.fields {
        let next = field_block(table, field)?;
        let mut names = Vec::with_capacity(block.names.len() * next.names.len());
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(names.capacity());
        for (left_name, left) in block.names.iter().zip(&block.columns) {
            for (right_name, right) in next.names.iter().zip(&next.columns) {
                names.push(if left_name.is_empty() {
                    right_name.clone()
                } else {
                    format!("{}:{}", left_name, right_name)
                });
                columns.push(left.iter().zip(right).map(|(a, b)| a * b).collect());
            }
        }
        block = FieldBlock { names, columns };
    }

    Ok(block)
}

impl DataStructure {
    /// Build X and Y from `table` following `formula`, e.g. `"y ~ x1 + x2:x3 + essence"`.
    pub fn new(table: &dyn Table, definition: &str) -> Result<Self, ConfigurationError> {
        let formula = ModelFormula::parse(definition)?;
        let n = table.n_records();
        if n == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "table",
                reason: "the table has no records".to_string(),
            });
        }

        let y_values = numeric_field(table, &formula.response)?;
        if let Some(row) = y_values.iter().position(|v| !v.is_finite()) {
            return Err(ConfigurationError::InvalidResponse {
                row,
                reason: format!("response must be finite, got {}", y_values[row]),
            });
        }

        let mut column_names = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        if formula.intercept {
            column_names.push(INTERCEPT_NAME.to_string());
            columns.push(vec![1.0; n]);
        }
        for term in &formula.terms {
            let block = term_block(table, term)?;
            for (name, column) in block.names.into_iter().zip(block.columns) {
                if !column_names.contains(&name) {
                    column_names.push(name);
                    columns.push(column);
                }
            }
        }

        if columns.is_empty() {
            return Err(ConfigurationError::MalformedFormula {
                formula: definition.to_string(),
                reason: "the model has no covariates".to_string(),
            });
        }

        let x = Matrix::from_fn(n, columns.len(), |i, j| columns[j][i]);
        if let Some(j) = (0..x.ncols()).find(|&j| (0..n).any(|i| !x.at(i, j).is_finite())) {
            return Err(ConfigurationError::InvalidParameter {
                name: "covariates",
                reason: format!("column '{}' contains non-finite values", column_names[j]),
            });
        }

        Ok(Self {
            formula,
            column_names,
            x,
            y: Matrix::column(&y_values),
        })
    }

    pub fn formula(&self) -> &ModelFormula {
        &self.formula
    }

    /// Names of the columns of X.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Design matrix (n × p).
    pub fn x(&self) -> &Matrix {
        &self.x
    }

    /// Response vector (n × 1).
    pub fn y(&self) -> &Matrix {
        &self.y
    }

    pub fn n_observations(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_covariates(&self) -> usize {
        self.x.ncols()
    }
}

/// Observations sharing the same value of the cluster field.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub key: String,
    /// Row indices in table order.
    pub members: Vec<usize>,
}

/// A [`DataStructure`] whose rows are grouped into clusters, optionally with
/// pairwise distances recorded within each cluster.
#[derive(Debug, Clone)]
pub struct HierarchicalStructure {
    structure: DataStructure,
    cluster_field: String,
    clusters: Vec<Cluster>,
    distances: Option<Vec<DistanceRecorder>>,
}

impl HierarchicalStructure {
    /// Group the rows of `table` by `cluster_field`. Clusters are ordered by
    /// first appearance in the table.
    pub fn new(
        table: &dyn Table,
        formula: &str,
        cluster_field: &str,
    ) -> Result<Self, ConfigurationError> {
        let structure = DataStructure::new(table, formula)?;
        let index = table
            .field_index(cluster_field)
            .ok_or_else(|| ConfigurationError::UnknownField(cluster_field.to_string()))?;

        let mut clusters: Vec<Cluster> = Vec::new();
        for (row, record) in table.records().iter().enumerate() {
            let key = record[index].as_key();
            match clusters.iter_mut().find(|c| c.key == key) {
                Some(cluster) => cluster.members.push(row),
                None => clusters.push(Cluster {
                    key,
                    members: vec![row],
                }),
            }
        }

        Ok(Self {
            structure,
            cluster_field: cluster_field.to_string(),
            clusters,
            distances: None,
        })
    }

    /// Record the Euclidean distance between every pair of observations in
    /// each cluster, over the coordinate fields named in `coordinates`
    /// (e.g. `"x + y"`).
    pub fn with_distances(
        mut self,
        table: &dyn Table,
        coordinates: &str,
    ) -> Result<Self, ConfigurationError> {
        let fields = parse_field_list(coordinates)?;
        let coordinates = fields
            .iter()
            .map(|f| numeric_field(table, f))
            .collect::<Result<Vec<_>, _>>()?;

        let mut recorders = Vec::with_capacity(self.clusters.len());
        for cluster in &self.clusters {
            let mut recorder = DistanceRecorder::new(cluster.members.clone())?;
            recorder.fill_with(|i, j| {
                coordinates
                    .iter()
                    .map(|c| (c[i] - c[j]).powi(2))
                    .sum::<f64>()
                    .sqrt()
            });
            recorders.push(recorder);
        }

        self.distances = Some(recorders);
        Ok(self)
    }

    pub fn structure(&self) -> &DataStructure {
        &self.structure
    }

    pub fn cluster_field(&self) -> &str {
        &self.cluster_field
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Distance recorders, one per cluster in cluster order, when computed.
    pub fn distances(&self) -> Option<&[DistanceRecorder]> {
        self.distances.as_deref()
    }

    /// Number of within-cluster pairs.
    pub fn n_pairs(&self) -> usize {
        self.clusters
            .iter()
            .map(|c| c.members.len() * c.members.len().saturating_sub(1) / 2)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSet;

    fn plots() -> DataSet {
        let mut data = DataSet::new(
            &["y", "dbh", "species", "plot", "x", "yc"],
            &[
                FieldType::Numeric,
                FieldType::Numeric,
                FieldType::Text,
                FieldType::Text,
                FieldType::Numeric,
                FieldType::Numeric,
            ],
        )
        .unwrap();
        let rows: [(f64, f64, &str, &str, f64, f64); 5] = [
            (1.0, 10.0, "fir", "p2", 0.0, 0.0),
            (0.0, 12.0, "spruce", "p1", 3.0, 4.0),
            (1.0, 15.0, "fir", "p2", 6.0, 8.0),
            (0.0, 20.0, "birch", "p1", 0.0, 0.0),
            (1.0, 25.0, "spruce", "p2", 1.0, 1.0),
        ];
        for (y, dbh, species, plot, x, yc) in rows {
            data.add_record(vec![
                y.into(),
                dbh.into(),
                species.into(),
                plot.into(),
                x.into(),
                yc.into(),
            ])
            .unwrap();
        }
        data
    }

    #[test]
    fn test_design_matrix_with_dummies_and_interaction() {
        let data = plots();
        let s = DataStructure::new(&data, "y ~ dbh + species + dbh:species").unwrap();
        assert_eq!(
            s.column_names(),
            &[
                "(Intercept)",
                "dbh",
                "species_fir",
                "species_spruce",
                "dbh:species_fir",
                "dbh:species_spruce"
            ]
        );
        assert_eq!(s.n_observations(), 5);
        assert_eq!(s.x().row(1), vec![1.0, 12.0, 0.0, 1.0, 0.0, 12.0]);
        assert_eq!(s.x().row(3), vec![1.0, 20.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(s.y().to_vec(), vec![1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_no_intercept() {
        let data = plots();
        let s = DataStructure::new(&data, "y ~ dbh - 1").unwrap();
        assert_eq!(s.column_names(), &["dbh"]);
        assert_eq!(s.n_covariates(), 1);
    }

    #[test]
    fn test_unknown_and_text_fields() {
        let data = plots();
        assert!(matches!(
            DataStructure::new(&data, "y ~ height"),
            Err(ConfigurationError::UnknownField(_))
        ));
        assert!(matches!(
            DataStructure::new(&data, "species ~ dbh"),
            Err(ConfigurationError::NonNumericField { .. })
        ));
    }

    #[test]
    fn test_clusters_in_order_of_appearance() {
        let data = plots();
        let h = HierarchicalStructure::new(&data, "y ~ dbh", "plot").unwrap();
        assert_eq!(h.clusters().len(), 2);
        assert_eq!(h.clusters()[0].key, "p2");
        assert_eq!(h.clusters()[0].members, vec![0, 2, 4]);
        assert_eq!(h.clusters()[1].members, vec![1, 3]);
        assert_eq!(h.n_pairs(), 4);
        assert!(h.distances().is_none());
    }

    #[test]
    fn test_distances_within_clusters() {
        let data = plots();
        let h = HierarchicalStructure::new(&data, "y ~ dbh", "plot")
            .unwrap()
            .with_distances(&data, "x + yc")
            .unwrap();
        let distances = h.distances().unwrap();
        assert_eq!(distances.len(), 2);
        assert!((distances[0].get_value_at(0, 2).unwrap() - 10.0).abs() < 1e-12);
        assert!((distances[1].get_value_at(3, 1).unwrap() - 5.0).abs() < 1e-12);
        assert!(distances[0].get_value_at(0, 1).is_err());
    }
}
