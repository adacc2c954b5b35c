// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Object storage used for staged writes
//!
//! The connector only needs four operations from an object store: write an
//! object, read it back, list a prefix and delete a prefix. Paths are
//! plain strings such as `gs://bucket/tmp/job_x/task_00001.avro`.

pub mod local;
pub mod memory;

use thiserror::Error;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Object store operations consumed by the staging path
pub trait ObjectStore: Send + Sync {
    /// Create or replace an object
    fn put(&self, path: &str, bytes: Vec<u8>) -> StorageResult<()>;

    fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Paths of all objects under `prefix`, sorted
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove a single object; missing objects are not an error
    fn delete(&self, path: &str) -> StorageResult<()>;

    /// Remove every object under `prefix`, returning how many were removed
    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize>;
}

/// Join path segments with exactly one `/` between them
pub fn join_path(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}
