// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Task-local staging for indirect writes
//!
//! Each task buffers its rows and writes them as a single object named
//! after its task id. A retried task writes the same object again, so the
//! earlier attempt's output is replaced rather than duplicated.

use log::debug;
use std::sync::Arc;

use super::planner::{StagingLocation, STAGING_FORMAT};
use super::TaskReport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::storage::ObjectStore;
use crate::types::{Row, Schema};

pub struct StagingWriter {
    store: Arc<dyn ObjectStore>,
    schema: Schema,
    task_id: usize,
    path: String,
    rows: Vec<Row>,
}

impl StagingWriter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        staging: &StagingLocation,
        schema: Schema,
        task_id: usize,
    ) -> Self {
        Self {
            store,
            schema,
            task_id,
            path: staging.task_file(task_id),
            rows: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write(&mut self, row: Row) -> ConnectorResult<()> {
        self.schema.validate_row(&row).map_err(|e| {
            ConnectorError::Write(format!(
                "task {} row {}: {}",
                self.task_id,
                self.rows.len(),
                e
            ))
        })?;
        self.rows.push(row);
        Ok(())
    }

    /// Write the staged object and close the writer. A task without rows
    /// leaves no object behind, removing one an earlier attempt may have
    /// written.
    pub fn finish(self) -> ConnectorResult<TaskReport> {
        if self.rows.is_empty() {
            self.store.delete(&self.path)?;
            debug!("Task {} staged no rows", self.task_id);
            return Ok(TaskReport {
                task_id: self.task_id,
                rows: 0,
                file: None,
            });
        }

        let bytes = STAGING_FORMAT.codec().encode(&self.schema, &self.rows)?;
        let size = bytes.len();
        self.store.put(&self.path, bytes)?;
        debug!(
            "Task {} staged {} row(s) ({} bytes) at {}",
            self.task_id,
            self.rows.len(),
            size,
            self.path
        );
        Ok(TaskReport {
            task_id: self.task_id,
            rows: self.rows.len() as u64,
            file: Some(self.path),
        })
    }

    /// Drop buffered rows and remove any object this task id owns
    pub fn abort(self) -> ConnectorResult<()> {
        self.store.delete(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DataFormat;
    use crate::storage::MemoryObjectStore;
    use crate::types::{Field, FieldType, Value};
    use crate::write::JobId;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::required("id", FieldType::Int64),
            Field::nullable("note", FieldType::String),
        ])
    }

    fn staging() -> StagingLocation {
        StagingLocation::for_job("mem://tmp", &JobId::new("q", 0))
    }

    #[test]
    fn test_retry_overwrites_task_file() {
        let store = Arc::new(MemoryObjectStore::new());

        let mut first = StagingWriter::new(store.clone(), &staging(), schema(), 1);
        for i in 0..3 {
            first.write(Row::new(vec![Value::Int64(i), Value::Null])).unwrap();
        }
        first.finish().unwrap();

        let mut retry = StagingWriter::new(store.clone(), &staging(), schema(), 1);
        retry
            .write(Row::new(vec![Value::Int64(10), Value::from("again")]))
            .unwrap();
        let report = retry.finish().unwrap();

        assert_eq!(store.len(), 1);
        let path = report.file.unwrap();
        let rows = DataFormat::Avro
            .codec()
            .decode(&schema(), &store.get(&path).unwrap())
            .unwrap();
        assert_eq!(rows, vec![Row::new(vec![Value::Int64(10), Value::from("again")])]);
    }

    #[test]
    fn test_empty_task_removes_previous_attempt() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut first = StagingWriter::new(store.clone(), &staging(), schema(), 0);
        first.write(Row::new(vec![Value::Int64(1), Value::Null])).unwrap();
        first.finish().unwrap();
        assert_eq!(store.len(), 1);

        let report = StagingWriter::new(store.clone(), &staging(), schema(), 0)
            .finish()
            .unwrap();
        assert_eq!(report.rows, 0);
        assert!(report.file.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_rows_are_validated() {
        let store = Arc::new(MemoryObjectStore::new());
        let mut writer = StagingWriter::new(store, &staging(), schema(), 0);
        let err = writer
            .write(Row::new(vec![Value::Null, Value::Null]))
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Write(_)));
        assert!(err.to_string().contains("not nullable"));
    }
}
