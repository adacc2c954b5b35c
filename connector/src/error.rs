// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Connector error types

use std::time::Duration;
use thiserror::Error;

use crate::config::keys::VIEWS_ENABLED;
use crate::format::CodecError;
use crate::sql::SqlError;
use crate::storage::StorageError;
use crate::warehouse::WarehouseError;

/// Errors surfaced to the host engine
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Raised before any I/O when options are missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Format '{format}' is not supported for {table}")]
    FormatUnsupported { format: String, table: String },

    #[error(
        "Views are not enabled. You can enable views by setting '{key}' to true. \
         Notice additional cost may occur. (view: {table})",
        key = VIEWS_ENABLED
    )]
    ViewsDisabled { table: String },

    #[error("Invalid filter predicate: {0}")]
    InvalidPredicate(#[from] SqlError),

    /// Task-local; the engine may re-run the task
    #[error("Read error on partition {partition} after {attempts} attempt(s): {message}")]
    Read {
        partition: usize,
        attempts: u32,
        message: String,
    },

    #[error("Write error: {0}")]
    Write(String),

    #[error("Load job {job_id} failed: {message}")]
    LoadJob { job_id: String, message: String },

    /// The job was issued but never observed in a terminal state
    #[error("Load job {job_id} was not observed in a terminal state after {waited:?}; it is orphaned and will not be retried")]
    LoadJobOrphaned { job_id: String, waited: Duration },

    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Object storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ConnectorError {
    fn from(err: serde_json::Error) -> Self {
        ConnectorError::Serialization(err.to_string())
    }
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;
