// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Row representation handed to the engine
//!
//! A [`Row`] is an ordered list of [`Value`]s whose positions line up with
//! the fields of the [`Schema`] it was read with. Numeric values keep the
//! width the warehouse declared; there is no implicit widening.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Warehouse column types the connector maps losslessly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int64,
    Float64,
    Bool,
    String,
    Bytes,
    Date,
    Timestamp,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int64 => "INT64",
            FieldType::Float64 => "FLOAT64",
            FieldType::Bool => "BOOL",
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Date => "DATE",
            FieldType::Timestamp => "TIMESTAMP",
        };
        f.write_str(name)
    }
}

/// One column of a table schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
        }
    }

    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type, true)
    }

    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(name, field_type, false)
    }
}

/// Ordered column list of a table or read session
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a column, matched case-insensitively like warehouse SQL
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Sub-schema with the given columns in the given order.
    /// Returns the first unknown column name on failure.
    pub fn project(&self, columns: &[String]) -> Result<Schema, String> {
        let mut fields = Vec::with_capacity(columns.len());
        for column in columns {
            match self.field(column) {
                Some(field) => fields.push(field.clone()),
                None => return Err(column.clone()),
            }
        }
        Ok(Schema::new(fields))
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Check arity, types and nullability of a row against this schema
    pub fn validate_row(&self, row: &Row) -> Result<(), String> {
        if row.len() != self.len() {
            return Err(format!(
                "row has {} values but schema has {} columns",
                row.len(),
                self.len()
            ));
        }
        for (field, value) in self.fields.iter().zip(row.values.iter()) {
            match value.field_type() {
                None if !field.nullable => {
                    return Err(format!("column '{}' is not nullable", field.name));
                }
                Some(actual) if actual != field.field_type => {
                    return Err(format!(
                        "column '{}' expects {} but got {}",
                        field.name, field.field_type, actual
                    ));
                }
                _ if value.exceeds_microsecond_precision() => {
                    return Err(format!(
                        "column '{}' has timestamp {} finer than microseconds",
                        field.name, value
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of a non-null value
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Value::Null => None,
            Value::Int64(_) => Some(FieldType::Int64),
            Value::Float64(_) => Some(FieldType::Float64),
            Value::Bool(_) => Some(FieldType::Bool),
            Value::String(_) => Some(FieldType::String),
            Value::Bytes(_) => Some(FieldType::Bytes),
            Value::Date(_) => Some(FieldType::Date),
            Value::Timestamp(_) => Some(FieldType::Timestamp),
        }
    }

    /// Timestamps are stored with microsecond precision; anything finer
    /// cannot be written without changing the value.
    pub fn exceeds_microsecond_precision(&self) -> bool {
        matches!(self, Value::Timestamp(ts) if ts.timestamp_subsec_nanos() % 1_000 != 0)
    }

    /// SQL comparison. Integers and floats compare numerically; any
    /// comparison involving NULL or mismatched types is unknown.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One engine row, positionally aligned with its schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Keep only the given positions, in the given order
    pub fn project(&self, indices: &[usize]) -> Row {
        Row::new(
            indices
                .iter()
                .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Field::required("number", FieldType::Int64),
            Field::nullable("text", FieldType::String),
        ])
    }

    #[test]
    fn test_validate_row() {
        let schema = sample_schema();
        assert!(schema
            .validate_row(&Row::new(vec![Value::Int64(1), Value::Null]))
            .is_ok());

        let err = schema
            .validate_row(&Row::new(vec![Value::Null, Value::from("x")]))
            .unwrap_err();
        assert!(err.contains("not nullable"));

        let err = schema
            .validate_row(&Row::new(vec![Value::from("1"), Value::Null]))
            .unwrap_err();
        assert!(err.contains("expects INT64"));

        assert!(schema.validate_row(&Row::new(vec![Value::Int64(1)])).is_err());
    }

    #[test]
    fn test_validate_row_rejects_sub_microsecond_timestamps() {
        let schema = Schema::new(vec![Field::required("ts", FieldType::Timestamp)]);
        let micros = DateTime::<Utc>::from_timestamp(1_700_000_000, 5_000).unwrap();
        let nanos = DateTime::<Utc>::from_timestamp(1_700_000_000, 5_001).unwrap();
        assert!(schema
            .validate_row(&Row::new(vec![Value::Timestamp(micros)]))
            .is_ok());
        let err = schema
            .validate_row(&Row::new(vec![Value::Timestamp(nanos)]))
            .unwrap_err();
        assert!(err.contains("finer than microseconds"));
    }

    #[test]
    fn test_project_schema_keeps_requested_order() {
        let schema = sample_schema();
        let projected = schema
            .project(&["TEXT".to_string(), "number".to_string()])
            .unwrap();
        assert_eq!(projected.names(), vec!["text", "number"]);
        assert_eq!(schema.project(&["missing".to_string()]), Err("missing".to_string()));
    }

    #[test]
    fn test_sql_cmp_mixed_numeric_and_null() {
        assert_eq!(
            Value::Int64(2).sql_cmp(&Value::Float64(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Null.sql_cmp(&Value::Int64(1)), None);
        assert_eq!(Value::from("a").sql_cmp(&Value::Int64(1)), None);
    }
}
