use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Read-only view of a mesh and its fields, as much as the binning controller needs.
///
/// The mesh itself lives elsewhere; only the cell count of its topology and
/// the flat length of named fields are queried.
pub trait FieldStore: Send + Sync {
    /// Number of cells in the topology.
    fn num_cells(&self) -> usize;

    /// Total number of values stored for the named field, or `None` if it does not exist.
    fn field_size(&self, name: &str) -> Option<usize>;

    /// Short human-readable description used in diagnostics.
    fn summary(&self) -> String {
        format!("num cells {}", self.num_cells())
    }
}

/// A field store holding flat per-cell (or per-cell x bin) arrays in memory.
///
/// Values for cell `c` and bin `b` are laid out at `c * num_bins + b`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDataSet {
    pub num_cells: usize,
    #[serde(default)]
    pub fields: HashMap<String, Vec<f64>>,
}

impl InMemoryDataSet {
    pub fn new(num_cells: usize) -> Self {
        Self {
            num_cells,
            fields: HashMap::new(),
        }
    }

    /// Adds (or replaces) a field and returns `self` for chaining.
    pub fn with_field(mut self, name: &str, values: Vec<f64>) -> Self {
        self.fields.insert(name.to_string(), values);
        self
    }

    pub fn add_field(&mut self, name: &str, values: Vec<f64>) {
        self.fields.insert(name.to_string(), values);
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(|v| v.as_slice())
    }
}

impl FieldStore for InMemoryDataSet {
    fn num_cells(&self) -> usize {
        self.num_cells
    }

    fn field_size(&self, name: &str) -> Option<usize> {
        self.fields.get(name).map(|v| v.len())
    }

    fn summary(&self) -> String {
        let mut names: Vec<&str> = self.fields.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        let fields: Vec<String> = names
            .iter()
            .map(|n| format!("{n}[{}]", self.fields[*n].len()))
            .collect();
        format!("num cells {}, fields: {}", self.num_cells, fields.join(", "))
    }
}
