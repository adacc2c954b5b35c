// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Filter predicates
//!
//! A [`Predicate`] is what the engine wants applied to a scan. It renders
//! back to warehouse SQL (for row restrictions and view pushdown) and can
//! be evaluated against a row with SQL three-valued logic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use super::parser::parse_predicate;
use super::SqlResult;
use crate::types::{Row, Schema, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }

    /// Operator with its operands swapped (`5 < x` becomes `x > 5`)
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Boolean filter over the columns of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse engine-supplied filter text such as `number = 999 AND name IS NOT NULL`
    pub fn parse(text: &str) -> SqlResult<Self> {
        parse_predicate(text)
    }

    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Lower-cased names of every column the predicate reads
    pub fn columns(&self) -> BTreeSet<String> {
        let mut columns = BTreeSet::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Predicate::Compare { column, .. } | Predicate::IsNull { column, .. } => {
                out.insert(column.to_ascii_lowercase());
            }
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Predicate::Not(inner) => inner.collect_columns(out),
        }
    }

    /// True when every referenced column exists in `schema`
    pub fn is_resolvable(&self, schema: &Schema) -> bool {
        self.columns()
            .iter()
            .all(|column| schema.index_of(column).is_some())
    }

    /// True when the rendered SQL parses back into this predicate. Only
    /// non-finite float literals fall outside the filter grammar.
    pub fn is_pushable(&self) -> bool {
        match self {
            Predicate::Compare { value, .. } => match value {
                Value::Float64(v) => v.is_finite(),
                _ => true,
            },
            Predicate::IsNull { .. } => true,
            Predicate::And(l, r) | Predicate::Or(l, r) => l.is_pushable() && r.is_pushable(),
            Predicate::Not(inner) => inner.is_pushable(),
        }
    }

    /// Three-valued evaluation: `None` is SQL UNKNOWN
    pub fn evaluate(&self, schema: &Schema, row: &Row) -> Option<bool> {
        match self {
            Predicate::Compare { column, op, value } => {
                let cell = row.get(schema.index_of(column)?)?;
                cell.sql_cmp(value).map(|ordering| op.holds(ordering))
            }
            Predicate::IsNull { column, negated } => {
                let cell = row.get(schema.index_of(column)?)?;
                Some(cell.is_null() != *negated)
            }
            Predicate::And(l, r) => match (l.evaluate(schema, row), r.evaluate(schema, row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(l, r) => match (l.evaluate(schema, row), r.evaluate(schema, row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Predicate::Not(inner) => inner.evaluate(schema, row).map(|b| !b),
        }
    }

    /// A row passes a filter only when the predicate is TRUE
    pub fn matches(&self, schema: &Schema, row: &Row) -> bool {
        self.evaluate(schema, row) == Some(true)
    }
}

/// Warehouse SQL literal for a value
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Float64(v) => float_literal(*v),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
        Value::Bytes(b) => {
            let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
            format!("FROM_HEX('{}')", hex)
        }
        Value::Date(d) => format!("DATE '{}'", d.format("%Y-%m-%d")),
        Value::Timestamp(ts) => format!("TIMESTAMP '{}'", ts.to_rfc3339()),
    }
}

/// Plain decimal with a fractional part, so it reads back as a float.
/// Non-finite values have no literal form and are written as casts.
fn float_literal(v: f64) -> String {
    if v.is_nan() {
        return "CAST('NaN' AS FLOAT64)".to_string();
    }
    if v.is_infinite() {
        let sign = if v > 0.0 { "" } else { "-" };
        return format!("CAST('{}inf' AS FLOAT64)", sign);
    }
    let text = v.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { column, op, value } => {
                write!(f, "`{}` {} {}", column, op.as_str(), sql_literal(value))
            }
            Predicate::IsNull { column, negated } => {
                if *negated {
                    write!(f, "`{}` IS NOT NULL", column)
                } else {
                    write!(f, "`{}` IS NULL", column)
                }
            }
            Predicate::And(l, r) => write!(f, "({} AND {})", l, r),
            Predicate::Or(l, r) => write!(f, "({} OR {})", l, r),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}
