//! Core Database Backend Traits
//!
//! This module defines the raw SQL executor the engine runs against, together
//! with the value and row types that cross that boundary.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::error::{ModelError, OrmResult};

/// Raw SQL executor over a single connection
///
/// Every engine operation runs between one `begin_transaction` and one
/// `commit` or `rollback`. Implementations are not expected to be shared
/// between threads without external locking.
pub trait SqlExecutor: Send {
    /// Execute one or more statements without parameters
    fn execute(&mut self, sql: &str) -> OrmResult<()>;

    /// Run a query with positional text arguments
    fn query(&mut self, sql: &str, args: &[String]) -> OrmResult<Vec<DatabaseRow>>;

    /// `INSERT OR REPLACE` a row and return its row identifier
    fn insert_or_replace(&mut self, table: &str, values: &[(String, DatabaseValue)]) -> OrmResult<i64>;

    /// Delete rows matching `where_clause` and return the affected count
    ///
    /// An empty clause deletes every row of the table.
    fn delete(&mut self, table: &str, where_clause: &str, args: &[String]) -> OrmResult<usize>;

    /// Begin a transaction
    fn begin_transaction(&mut self) -> OrmResult<()>;

    /// Commit the current transaction
    fn commit(&mut self) -> OrmResult<()>;

    /// Roll back the current transaction
    fn rollback(&mut self) -> OrmResult<()>;

    /// Schema version stamped on the database file
    fn user_version(&mut self) -> OrmResult<u32>;

    /// Stamp a schema version on the database file
    fn set_user_version(&mut self, version: u32) -> OrmResult<()>;
}

/// A value stored in or read from a column
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Integer(i) => Some(*i),
            DatabaseValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            DatabaseValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Integer(i) => Some(*i as f64),
            DatabaseValue::Real(f) => Some(*f),
            DatabaseValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a positional query argument
    pub fn to_arg(&self) -> String {
        match self {
            DatabaseValue::Null => String::new(),
            DatabaseValue::Integer(i) => i.to_string(),
            DatabaseValue::Real(f) => f.to_string(),
            DatabaseValue::Text(s) => s.clone(),
            DatabaseValue::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Integer(i) => JsonValue::Number(serde_json::Number::from(*i)),
            DatabaseValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Text(s) => JsonValue::String(s.clone()),
            DatabaseValue::Blob(b) => JsonValue::Array(
                b.iter()
                    .map(|&x| JsonValue::Number(serde_json::Number::from(x)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Integer(i64::from(value))
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Integer(i64::from(value))
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Integer(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Real(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::Text(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Blob(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// One materialized result row
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DatabaseRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        Self { columns, values }
    }

    /// Get a column value by index
    pub fn get_by_index(&self, index: usize) -> OrmResult<&DatabaseValue> {
        self.values.get(index).ok_or_else(|| {
            ModelError::Mapping(format!("column index {} out of range", index))
        })
    }

    /// Get a column value by name
    pub fn get_by_name(&self, name: &str) -> OrmResult<&DatabaseValue> {
        self.get(name)
            .ok_or_else(|| ModelError::Mapping(format!("column '{}' not found in row", name)))
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| self.values.get(i))
    }

    /// Get column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get column names
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Column/value pairs in select order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Convert row to JSON object
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.iter()
                .map(|(column, value)| (column.to_string(), value.to_json()))
                .collect(),
        )
    }

    /// Convert row to HashMap
    pub fn to_map(&self) -> HashMap<String, DatabaseValue> {
        self.iter()
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(DatabaseValue::from(true), DatabaseValue::Integer(1));
        assert_eq!(DatabaseValue::from(None::<i64>), DatabaseValue::Null);
        assert_eq!(DatabaseValue::from("x"), DatabaseValue::Text("x".to_string()));
        assert_eq!(DatabaseValue::Text(" 42 ".to_string()).as_i64(), Some(42));
        assert_eq!(DatabaseValue::Real(3.0).as_i64(), Some(3));
        assert_eq!(DatabaseValue::Real(3.5).as_i64(), None);
        assert_eq!(DatabaseValue::Integer(5).to_arg(), "5");
    }

    #[test]
    fn test_row_access() {
        let row = DatabaseRow::new(
            vec!["_id".to_string(), "name".to_string()],
            vec![DatabaseValue::Integer(1), DatabaseValue::from("matti")],
        );
        assert_eq!(row.column_count(), 2);
        assert_eq!(row.get_by_name("name").unwrap(), &DatabaseValue::from("matti"));
        assert!(row.get_by_name("missing").is_err());
        assert!(row.get_by_index(2).is_err());
        assert_eq!(row.to_json(), serde_json::json!({"_id": 1, "name": "matti"}));
    }
}
