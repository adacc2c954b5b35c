// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Warehouse API consumed by the connector
//!
//! The warehouse is an external collaborator. The connector talks to it
//! through the [`Warehouse`] trait: table metadata, query materialization,
//! partitioned read sessions, streaming inserts and bulk-load jobs. Every
//! call is blocking from the calling task's point of view.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::format::DataFormat;
use crate::types::{Row, Schema, TableReference};

pub use memory::InMemoryWarehouse;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WarehouseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Retriable: the call may succeed if repeated
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WarehouseError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WarehouseError::Transient(_))
    }
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// What kind of object a reference names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableKind {
    Table,
    View { query: String },
}

/// Table metadata returned by [`Warehouse::get_table`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub table: TableReference,
    pub kind: TableKind,
    pub schema: Schema,
    /// Formats a read session on this object can be served in
    pub read_formats: Vec<DataFormat>,
    pub num_rows: u64,
}

impl TableInfo {
    pub fn is_view(&self) -> bool {
        matches!(self.kind, TableKind::View { .. })
    }

    pub fn view_query(&self) -> Option<&str> {
        match &self.kind {
            TableKind::View { query } => Some(query),
            TableKind::Table => None,
        }
    }

    pub fn supports_format(&self, format: DataFormat) -> bool {
        self.read_formats.contains(&format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadSessionRequest {
    pub table: TableReference,
    /// Empty means every column
    pub selected_fields: Vec<String>,
    /// Warehouse SQL filter applied before rows are split into streams
    pub row_restriction: Option<String>,
    pub format: DataFormat,
    pub max_stream_count: Option<usize>,
}

/// One independently readable stream of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStream {
    pub name: String,
    pub estimated_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadSession {
    pub id: String,
    pub table: TableReference,
    /// Schema of the rows served, after column selection
    pub schema: Schema,
    pub format: DataFormat,
    pub streams: Vec<ReadStream>,
}

/// A chunk of a read stream in the session's wire format
#[derive(Debug, Clone, PartialEq)]
pub struct SerializedBatch {
    pub row_count: u64,
    pub data: Vec<u8>,
}

pub type BatchStream = Box<dyn Iterator<Item = WarehouseResult<SerializedBatch>> + Send>;

/// How a load job treats existing rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// INSERT INTO
    Append,
    /// INSERT OVERWRITE
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadJobRequest {
    pub job_id: String,
    pub destination: TableReference,
    pub source_uris: Vec<String>,
    pub format: DataFormat,
    pub disposition: WriteDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadJobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl LoadJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadJobState::Succeeded | LoadJobState::Failed)
    }
}

impl fmt::Display for LoadJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadJobState::Pending => "PENDING",
            LoadJobState::Running => "RUNNING",
            LoadJobState::Succeeded => "SUCCEEDED",
            LoadJobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadJob {
    pub id: String,
    pub state: LoadJobState,
    pub error: Option<String>,
    pub rows_loaded: u64,
}

/// Warehouse-side calls the connector depends on
pub trait Warehouse: Send + Sync {
    fn get_table(&self, table: &TableReference) -> WarehouseResult<TableInfo>;

    /// Run `query` and store its result in `destination`, replacing it
    fn materialize_query(
        &self,
        query: &str,
        destination: &TableReference,
    ) -> WarehouseResult<TableInfo>;

    fn create_read_session(&self, request: &ReadSessionRequest) -> WarehouseResult<ReadSession>;

    /// Batches of `stream` starting at row `offset`
    fn read_rows(&self, stream: &str, offset: u64) -> WarehouseResult<BatchStream>;

    /// Streaming insert. Each row carries an insert id; the warehouse drops
    /// rows whose id it has already accepted.
    fn insert_rows(&self, table: &TableReference, rows: &[(String, Row)]) -> WarehouseResult<()>;

    fn start_load_job(&self, request: &LoadJobRequest) -> WarehouseResult<LoadJob>;

    fn get_load_job(&self, job_id: &str) -> WarehouseResult<LoadJob>;
}
