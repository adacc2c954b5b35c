// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Warehouse Connector - table scans and inserts against a columnar warehouse
//!
//! Lets a task-parallel SQL engine read from and write to a warehouse table
//! as if it were a native table.
//!
//! # Features
//!
//! - **Partitioned reads**: one read session per scan, one partition per
//!   stream, decoded from Arrow IPC or Avro
//! - **Views**: expanded, filtered and materialized before reading
//! - **Two write strategies**: direct streaming inserts, or staged Avro
//!   files applied by a single bulk-load job
//! - **Commit protocol**: explicit per-job state machine driven by the
//!   engine's task and job callbacks
//!
//! The [`Connector`] facade is the entry point; the warehouse and object
//! store are supplied through the [`Warehouse`] and [`ObjectStore`] traits.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod read;
pub mod sql;
pub mod storage;
pub mod types;
pub mod warehouse;
pub mod write;

pub use config::{ConfigResolver, ConnectorConfig, ExecutionEngine, WriteMethod};
pub use coordinator::Connector;
pub use error::{ConnectorError, ConnectorResult};
pub use format::DataFormat;
pub use read::{Partition, ReadPlan, ReadRequest, SplitReader};
pub use sql::Predicate;
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore};
pub use types::{Field, FieldType, Row, Schema, TableReference, Value};
pub use warehouse::{InMemoryWarehouse, Warehouse, WriteDisposition};
pub use write::{CommitState, JobId, TaskReport, TaskWriter, WriteJob};

/// Connector version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connector crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
