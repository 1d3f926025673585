//! Tabular input consumed by the data structure layer.

use crate::core::ConfigurationError;

/// Type of a field in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Numeric,
    Text,
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// String form used for grouping keys and factor levels.
    pub fn as_key(&self) -> String {
        match self {
            Value::Number(v) => v.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    fn field_type(&self) -> FieldType {
        match self {
            Value::Number(_) => FieldType::Numeric,
            Value::Text(_) => FieldType::Text,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Read-only access to a table of records, as supplied by an external reader.
pub trait Table {
    fn field_names(&self) -> &[String];

    fn field_types(&self) -> &[FieldType];

    fn records(&self) -> &[Vec<Value>];

    /// Position of a field by name.
    fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names().iter().position(|n| n == name)
    }

    fn n_records(&self) -> usize {
        self.records().len()
    }
}

/// In-memory table.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    field_names: Vec<String>,
    field_types: Vec<FieldType>,
    records: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create an empty data set with the given schema.
    pub fn new(field_names: &[&str], field_types: &[FieldType]) -> Result<Self, ConfigurationError> {
        if field_names.len() != field_types.len() {
            return Err(ConfigurationError::InvalidParameter {
                name: "field_types",
                reason: format!(
                    "{} field names but {} field types",
                    field_names.len(),
                    field_types.len()
                ),
            });
        }
        for (i, name) in field_names.iter().enumerate() {
            if field_names[..i].contains(name) {
                return Err(ConfigurationError::InvalidParameter {
                    name: "field_names",
                    reason: format!("duplicate field '{}'", name),
                });
            }
        }
        Ok(Self {
            field_names: field_names.iter().map(|s| s.to_string()).collect(),
            field_types: field_types.to_vec(),
            records: Vec::new(),
        })
    }

    /// Build a numeric-only data set from named columns of equal length.
    pub fn from_numeric_columns(columns: &[(&str, Vec<f64>)]) -> Result<Self, ConfigurationError> {
        let names: Vec<&str> = columns.iter().map(|(n, _)| *n).collect();
        let types = vec![FieldType::Numeric; columns.len()];
        let mut data = Self::new(&names, &types)?;
        let n = columns.first().map_or(0, |(_, v)| v.len());
        if let Some((name, _)) = columns.iter().find(|(_, v)| v.len() != n) {
            return Err(ConfigurationError::InvalidParameter {
                name: "columns",
                reason: format!("column '{}' does not have {} values", name, n),
            });
        }
        for i in 0..n {
            data.add_record(columns.iter().map(|(_, v)| Value::Number(v[i])).collect())?;
        }
        Ok(data)
    }

    /// Append a record; its length and value types must match the schema.
    pub fn add_record(&mut self, record: Vec<Value>) -> Result<(), ConfigurationError> {
        let row = self.records.len();
        if record.len() != self.field_names.len() {
            return Err(ConfigurationError::InvalidRecord {
                row,
                reason: format!(
                    "expected {} values, got {}",
                    self.field_names.len(),
                    record.len()
                ),
            });
        }
        if let Some(j) = (0..record.len()).find(|&j| record[j].field_type() != self.field_types[j]) {
            return Err(ConfigurationError::InvalidRecord {
                row,
                reason: format!(
                    "field '{}' expects {:?}",
                    self.field_names[j], self.field_types[j]
                ),
            });
        }
        self.records.push(record);
        Ok(())
    }
}

impl Table for DataSet {
    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    fn records(&self) -> &[Vec<Value>] {
        &self.records
    }
}

/// Numeric values of a field, one per record.
pub(crate) fn numeric_field(table: &dyn Table, name: &str) -> Result<Vec<f64>, ConfigurationError> {
    let index = table
        .field_index(name)
        .ok_or_else(|| ConfigurationError::UnknownField(name.to_string()))?;
    if table.field_types()[index] != FieldType::Numeric {
        return Err(ConfigurationError::NonNumericField {
            field: name.to_string(),
        });
    }
    table
        .records()
        .iter()
        .map(|r| {
            r[index].as_number().ok_or_else(|| ConfigurationError::NonNumericField {
                field: name.to_string(),
            })
        })
        .collect()
}
