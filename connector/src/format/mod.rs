// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Serialization formats for read-session batches and staged files
//!
//! The warehouse serves read streams in one of two interchangeable
//! formats: Arrow IPC (columnar batches) and Avro (object container
//! files). Staged files for bulk loads are written as Avro.

pub mod ipc;
pub mod avro;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{Row, Schema};

/// Encode/decode errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Schema conversion error: {0}")]
    Schema(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Column '{column}' is not nullable but row {row} has NULL")]
    NullInRequiredColumn { column: String, row: usize },

    #[error("Column '{column}' expects {expected} but row {row} has {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
        row: usize,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Wire format of a read session or staged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataFormat {
    Arrow,
    Avro,
}

impl DataFormat {
    pub const ALL: [DataFormat; 2] = [DataFormat::Arrow, DataFormat::Avro];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Arrow => "arrow",
            DataFormat::Avro => "avro",
        }
    }

    /// File extension for staged objects
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Arrow => "arrow",
            DataFormat::Avro => "avro",
        }
    }

    pub fn codec(&self) -> Box<dyn BatchCodec> {
        match self {
            DataFormat::Arrow => Box::new(ipc::ArrowCodec),
            DataFormat::Avro => Box::new(avro::AvroCodec),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrow" => Ok(DataFormat::Arrow),
            "avro" => Ok(DataFormat::Avro),
            other => Err(format!(
                "unknown data format '{}', expected one of: arrow, avro",
                other
            )),
        }
    }
}

/// Converts between engine rows and one serialized batch
pub trait BatchCodec: Send + Sync {
    fn format(&self) -> DataFormat;

    /// Serialize rows. Every row must already conform to `schema`.
    fn encode(&self, schema: &Schema, rows: &[Row]) -> CodecResult<Vec<u8>>;

    /// Deserialize a batch produced by [`BatchCodec::encode`] (or by the
    /// warehouse) back into rows in their serialized order.
    fn decode(&self, schema: &Schema, bytes: &[u8]) -> CodecResult<Vec<Row>>;
}

/// Shared pre-encode check so both codecs reject the same inputs
pub(crate) fn check_rows(schema: &Schema, rows: &[Row]) -> CodecResult<()> {
    for (row_index, row) in rows.iter().enumerate() {
        if row.len() != schema.len() {
            return Err(CodecError::Encode(format!(
                "row {} has {} values, schema has {} columns",
                row_index,
                row.len(),
                schema.len()
            )));
        }
        for (field, value) in schema.fields.iter().zip(row.values.iter()) {
            match value.field_type() {
                None if !field.nullable => {
                    return Err(CodecError::NullInRequiredColumn {
                        column: field.name.clone(),
                        row: row_index,
                    })
                }
                Some(actual) if actual != field.field_type => {
                    return Err(CodecError::TypeMismatch {
                        column: field.name.clone(),
                        expected: field.field_type.to_string(),
                        actual: actual.to_string(),
                        row: row_index,
                    })
                }
                _ if value.exceeds_microsecond_precision() => {
                    return Err(CodecError::Encode(format!(
                        "column '{}' row {} has timestamp {} finer than microseconds",
                        field.name, row_index, value
                    )))
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// `NaiveDate::num_days_from_ce` of 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) fn days_since_epoch(date: &NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub(crate) fn date_from_days(days: i32) -> CodecResult<NaiveDate> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| CodecError::Decode(format!("date out of range: {} days", days)))
}

pub(crate) fn timestamp_from_micros(micros: i64) -> CodecResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| CodecError::Decode(format!("timestamp out of range: {}us", micros)))
}
