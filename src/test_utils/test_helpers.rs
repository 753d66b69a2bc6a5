//! Helper utilities for testing and development.

use std::sync::Arc;

use crate::config::Config;
use crate::results::ResultRow;
use crate::types::RowValues;

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: Vec<String>, values: Vec<RowValues>) -> ResultRow {
    ResultRow::new(Arc::new(column_names), values)
}

/// A config that passes validation; mock connectors ignore its contents.
#[must_use]
pub fn test_config() -> Config {
    Config::new("mock".into(), "sa".into(), "password".into())
}
