// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Direct writes through the streaming-insert API
//!
//! Rows become visible as soon as an insert call succeeds. Every row is
//! sent with an insert id `<job>/<task>/<seq>`, so retrying a call, or the
//! whole task, never inserts a row twice.

use log::{debug, warn};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::planner::JobId;
use super::TaskReport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::types::{Row, Schema, TableReference};
use crate::warehouse::Warehouse;

const RETRY_BASE_DELAY_MS: u64 = 10;

pub struct DirectWriter {
    warehouse: Arc<dyn Warehouse>,
    table: TableReference,
    schema: Schema,
    job_tag: String,
    task_id: usize,
    batch_size: usize,
    max_retries: u32,
    pending: Vec<(String, Row)>,
    next_seq: u64,
    rows_written: u64,
}

impl DirectWriter {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        table: TableReference,
        schema: Schema,
        job: &JobId,
        task_id: usize,
        batch_size: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            warehouse,
            table,
            schema,
            job_tag: format!("{}_{}", job.sanitized_query(), job.attempt),
            task_id,
            batch_size: batch_size.max(1),
            max_retries,
            pending: Vec::new(),
            next_seq: 0,
            rows_written: 0,
        }
    }

    pub fn write(&mut self, row: Row) -> ConnectorResult<()> {
        self.schema.validate_row(&row).map_err(|e| {
            ConnectorError::Write(format!(
                "task {} row {}: {}",
                self.task_id, self.next_seq, e
            ))
        })?;
        let insert_id = format!("{}/{}/{}", self.job_tag, self.task_id, self.next_seq);
        self.next_seq += 1;
        self.pending.push((insert_id, row));
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Send buffered rows, retrying transient failures with the same ids
    pub fn flush(&mut self) -> ConnectorResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut attempt = 0;
        loop {
            match self.warehouse.insert_rows(&self.table, &self.pending) {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY_MS * (1u64 << attempt.min(6))
                        + fastrand::u64(0..RETRY_BASE_DELAY_MS);
                    warn!(
                        "Streaming insert for task {} failed (attempt {}/{}), retrying in {}ms: {}",
                        self.task_id,
                        attempt,
                        self.max_retries + 1,
                        delay,
                        e
                    );
                    thread::sleep(Duration::from_millis(delay));
                }
                Err(e) => {
                    return Err(ConnectorError::Write(format!(
                        "streaming insert into {} failed for task {} after {} attempt(s): {}",
                        self.table,
                        self.task_id,
                        attempt + 1,
                        e
                    )))
                }
            }
        }
        debug!(
            "Task {} inserted {} row(s) into {}",
            self.task_id,
            self.pending.len(),
            self.table
        );
        self.rows_written += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    pub fn finish(mut self) -> ConnectorResult<TaskReport> {
        self.flush()?;
        Ok(TaskReport {
            task_id: self.task_id,
            rows: self.rows_written,
            file: None,
        })
    }
}
