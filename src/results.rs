use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::ExecError;
use crate::types::RowValues;

/// A row from a statement's result set.
///
/// Column names are shared by every row of the same result set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    column_names: Arc<Vec<String>>,
    values: Vec<RowValues>,
    // name -> position, last duplicate wins
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultRow {
    /// Create a new row
    ///
    /// # Arguments
    ///
    /// * `column_names` - The column names
    /// * `values` - The values for this row, in column order
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            values,
            column_index,
        }
    }

    /// Get a value from the row by column name.
    ///
    /// When a statement returns the same name twice, the later column wins.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index
            .get(column_name)
            .and_then(|&idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column/value pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.column_index.len()))?;
        for (idx, name) in self.column_names.iter().enumerate() {
            if self.column_index.get(name) == Some(&idx) {
                map.serialize_entry(name, &self.values.get(idx).unwrap_or(&RowValues::Null))?;
            }
        }
        map.end()
    }
}

fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}

/// Collects rows for one statement as its events arrive.
#[derive(Debug, Default)]
pub(crate) struct RowAccumulator {
    columns: Option<(Arc<Vec<String>>, Arc<HashMap<String, usize>>)>,
    rows: Vec<ResultRow>,
}

impl RowAccumulator {
    /// Replace the active column list; applies to every following row.
    pub(crate) fn set_columns(&mut self, column_names: Vec<String>) {
        let index = Arc::new(index_columns(&column_names));
        self.columns = Some((Arc::new(column_names), index));
    }

    pub(crate) fn push(&mut self, values: Vec<RowValues>) -> Result<(), ExecError> {
        let (column_names, column_index) = self.columns.as_ref().ok_or_else(|| {
            ExecError::Protocol("row received before column metadata".to_string())
        })?;
        self.rows.push(ResultRow {
            column_names: Arc::clone(column_names),
            values,
            column_index: Arc::clone(column_index),
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> Vec<ResultRow> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn rows_use_latest_metadata() {
        let mut acc = RowAccumulator::default();
        acc.set_columns(names(&["a", "b"]));
        acc.push(vec![RowValues::Int(1), RowValues::Int(2)]).unwrap();
        acc.set_columns(names(&["c"]));
        acc.push(vec![RowValues::Text("z".into())]).unwrap();

        let rows = acc.finish();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].column_names(), ["a", "b"]);
        assert_eq!(rows[1].column_names(), ["c"]);
        assert_eq!(rows[1].get("c"), Some(&RowValues::Text("z".into())));
        assert_eq!(rows[1].get("a"), None);
    }

    #[test]
    fn row_before_metadata_is_a_protocol_error() {
        let mut acc = RowAccumulator::default();
        let err = acc.push(vec![RowValues::Int(1)]).unwrap_err();
        assert!(matches!(err, ExecError::Protocol(_)));
    }

    #[test]
    fn no_metadata_means_no_rows() {
        assert!(RowAccumulator::default().finish().is_empty());
    }

    #[test]
    fn duplicate_column_names_resolve_to_last() {
        let row = ResultRow::new(
            Arc::new(names(&["x", "x"])),
            vec![RowValues::Int(1), RowValues::Int(2)],
        );
        assert_eq!(row.get("x"), Some(&RowValues::Int(2)));
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(1)));
        assert_eq!(serde_json::to_value(&row).unwrap(), json!({"x": 2}));
    }

    #[test]
    fn serializes_as_object() {
        let row = ResultRow::new(
            Arc::new(names(&["id", "name"])),
            vec![RowValues::Int(7), RowValues::Null],
        );
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({"id": 7, "name": null})
        );
        let pairs: Vec<_> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(pairs, ["id", "name"]);
    }
}
