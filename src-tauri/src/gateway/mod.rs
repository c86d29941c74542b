//! Data-access operations behind every form in the UI.
//!
//! Each function takes the live connection explicitly as `&dyn DatabaseDriver`
//! and returns a [`DbResult`](crate::error::DbResult); none of them touch
//! process-wide state.

pub mod admin;
pub mod alerts;
pub mod connection;
pub mod records;
pub mod schema;
pub mod script;
pub mod stats;
pub mod watch;

use crate::models::QueryResult;

/// Integer view of a cell, accepting numbers and numeric strings.
pub(crate) fn cell_i64(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::Bool(b) => Some(*b as i64),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn cell_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn cell_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn cell_bool(value: Option<&serde_json::Value>) -> Option<bool> {
    match value? {
        serde_json::Value::Bool(b) => Some(*b),
        other => cell_i64(Some(other)).map(|v| v != 0),
    }
}

/// First column of every row as text, skipping nulls.
pub(crate) fn first_column_strings(result: &QueryResult) -> Vec<String> {
    result
        .rows
        .iter()
        .filter_map(|row| cell_string(row.first()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_coerce_loosely() {
        assert_eq!(cell_i64(Some(&json!(3))), Some(3));
        assert_eq!(cell_i64(Some(&json!("12"))), Some(12));
        assert_eq!(cell_i64(Some(&json!(true))), Some(1));
        assert_eq!(cell_i64(Some(&json!(null))), None);
        assert_eq!(cell_f64(Some(&json!("0.25"))), Some(0.25));
        assert_eq!(cell_string(Some(&json!(7))), Some("7".to_string()));
        assert_eq!(cell_string(Some(&json!(null))), None);
        assert_eq!(cell_bool(Some(&json!(0))), Some(false));
        assert_eq!(cell_bool(None), None);
    }
}
