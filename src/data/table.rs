use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{PipelineError, Result};

/// One named numeric column; `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Per-match table keyed by the match address.
///
/// Row order is fixed at construction and never changes; every derived table
/// carries the same key vector as the table it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchTable {
    keys: Vec<String>,
    columns: Vec<Column>,
}

impl MatchTable {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(keys.len());
        for key in &keys {
            if !seen.insert(key.as_str()) {
                return Err(PipelineError::Data(format!("duplicate match address '{}'", key)));
            }
        }
        Ok(Self { keys, columns: Vec::new() })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`column`](Self::column) but an absent name is a configuration error.
    pub fn require_column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.column(name).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "column '{}' not found (available: {})",
                name,
                self.column_names().join(", ")
            ))
        })
    }

    /// Column values with no missing cells allowed.
    pub fn dense_column(&self, name: &str) -> Result<Vec<f64>> {
        let values = self.require_column(name)?;
        values
            .iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| {
                    PipelineError::Data(format!(
                        "column '{}' has a missing value for match '{}'",
                        name, self.keys[row]
                    ))
                })
            })
            .collect()
    }

    /// Returns a copy of this table with `name` added (or replaced).
    pub fn with_column(&self, name: &str, values: Vec<Option<f64>>) -> Result<Self> {
        if values.len() != self.keys.len() {
            return Err(PipelineError::shape(
                format!("{} values for column '{}'", self.keys.len(), name),
                format!("{}", values.len()),
            ));
        }
        let mut table = self.clone();
        match table.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => table.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
        Ok(table)
    }

    pub fn with_dense_column(&self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, values.into_iter().map(Some).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("match-{}", i)).collect()
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let result = MatchTable::new(vec!["a".to_string(), "b".to_string(), "a".to_string()]);
        assert!(matches!(result, Err(PipelineError::Data(_))));
    }

    #[test]
    fn test_with_column_returns_new_table() {
        let base = MatchTable::new(keys(3)).unwrap();
        let extended = base.with_dense_column("kills", vec![1.0, 2.0, 3.0]).unwrap();

        assert!(!base.has_column("kills"));
        assert_eq!(extended.keys(), base.keys());
        assert_eq!(extended.dense_column("kills").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_with_column_replaces_existing() {
        let table = MatchTable::new(keys(2))
            .unwrap()
            .with_dense_column("x", vec![1.0, 2.0])
            .unwrap()
            .with_dense_column("x", vec![5.0, 6.0])
            .unwrap();
        assert_eq!(table.column_names(), vec!["x"]);
        assert_eq!(table.dense_column("x").unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_length_mismatch_is_shape_error() {
        let table = MatchTable::new(keys(3)).unwrap();
        let result = table.with_dense_column("x", vec![1.0]);
        assert!(matches!(result, Err(PipelineError::DataShape { .. })));
    }

    #[test]
    fn test_missing_column_and_missing_cells() {
        let table = MatchTable::new(keys(2))
            .unwrap()
            .with_column("gold", vec![Some(1.0), None])
            .unwrap();

        assert!(matches!(table.require_column("nope"), Err(PipelineError::Configuration(_))));
        match table.dense_column("gold") {
            Err(PipelineError::Data(msg)) => assert!(msg.contains("match-1")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_serde_keeps_missing_cells() {
        let table = MatchTable::new(keys(2))
            .unwrap()
            .with_column("gold", vec![None, Some(-250.0)])
            .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: MatchTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
