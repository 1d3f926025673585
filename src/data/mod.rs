//! Data structure layer.
//!
//! Turns a [`Table`] supplied by an external reader into model-ready
//! matrices. [`DataStructure`] holds the design matrix and response,
//! [`HierarchicalStructure`] adds clusters and per-cluster
//! [`DistanceRecorder`]s.

mod distance;
mod formula;
mod structure;
mod table;

pub use distance::{packed_len, packed_offset, DistanceError, DistanceRecorder};
pub use formula::{parse_field_list, ModelFormula, Term};
pub use structure::{Cluster, DataStructure, HierarchicalStructure, INTERCEPT_NAME};
pub use table::{DataSet, FieldType, Table, Value};
