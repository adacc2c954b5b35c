// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Split reader
//!
//! Lazily decodes one partition into rows. Batches are pulled from the
//! warehouse stream on demand; after each decoded batch the offset is
//! acknowledged so an interrupted stream can be reopened where it broke
//! off without repeating or skipping rows.

use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Arc;

use super::planner::{Partition, ReadPlan};
use crate::error::{ConnectorError, ConnectorResult};
use crate::format::BatchCodec;
use crate::types::{Row, Schema};
use crate::warehouse::{BatchStream, Warehouse, WarehouseError};

/// Finite, non-restartable row sequence over one partition
pub struct SplitReader {
    warehouse: Arc<dyn Warehouse>,
    partition: Partition,
    schema: Schema,
    codec: Box<dyn BatchCodec>,
    max_retries: u32,
    stream: Option<BatchStream>,
    buffer: VecDeque<Row>,
    /// Rows acknowledged so far
    offset: u64,
    /// Failed attempts so far
    failures: u32,
    finished: bool,
}

impl SplitReader {
    pub fn open(
        warehouse: Arc<dyn Warehouse>,
        plan: &ReadPlan,
        partition_id: usize,
        max_retries: u32,
    ) -> ConnectorResult<Self> {
        let partition = plan.partition(partition_id).cloned().ok_or_else(|| {
            ConnectorError::InvalidState(format!(
                "plan for {} has no partition {}",
                plan.table, partition_id
            ))
        })?;
        Ok(Self {
            warehouse,
            codec: partition.format.codec(),
            partition,
            schema: plan.schema.clone(),
            max_retries,
            stream: None,
            buffer: VecDeque::new(),
            offset: 0,
            failures: 0,
            finished: false,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows decoded and acknowledged so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn fail(&mut self, message: String) -> ConnectorError {
        self.finished = true;
        self.stream = None;
        self.buffer.clear();
        ConnectorError::Read {
            partition: self.partition.id,
            attempts: self.failures + 1,
            message,
        }
    }

    /// Record a failed attempt. Returns an error once retries are exhausted
    /// or the failure is not retriable.
    fn on_stream_error(&mut self, error: WarehouseError) -> Option<ConnectorError> {
        self.stream = None;
        if error.is_transient() && self.failures < self.max_retries {
            self.failures += 1;
            warn!(
                "Partition {} interrupted at offset {} (attempt {}/{}): {}",
                self.partition.id,
                self.offset,
                self.failures,
                self.max_retries + 1,
                error
            );
            None
        } else {
            Some(self.fail(error.to_string()))
        }
    }

    fn fill_buffer(&mut self) -> ConnectorResult<bool> {
        loop {
            if self.stream.is_none() {
                match self.warehouse.read_rows(&self.partition.stream, self.offset) {
                    Ok(stream) => self.stream = Some(stream),
                    Err(e) => match self.on_stream_error(e) {
                        Some(err) => return Err(err),
                        None => continue,
                    },
                }
            }
            let next = match self.stream.as_mut() {
                Some(stream) => stream.next(),
                None => continue,
            };
            match next {
                None => {
                    debug!(
                        "Partition {} exhausted after {} row(s)",
                        self.partition.id, self.offset
                    );
                    self.finished = true;
                    self.stream = None;
                    return Ok(false);
                }
                Some(Ok(batch)) => {
                    let rows = match self.codec.decode(&self.schema, &batch.data) {
                        Ok(rows) => rows,
                        Err(e) => return Err(self.fail(e.to_string())),
                    };
                    if rows.len() as u64 != batch.row_count {
                        let message = format!(
                            "batch declared {} row(s) but decoded {}",
                            batch.row_count,
                            rows.len()
                        );
                        return Err(self.fail(message));
                    }
                    self.offset += batch.row_count;
                    self.buffer.extend(rows);
                    if !self.buffer.is_empty() {
                        return Ok(true);
                    }
                }
                Some(Err(e)) => {
                    if let Some(err) = self.on_stream_error(e) {
                        return Err(err);
                    }
                }
            }
        }
    }
}

impl Iterator for SplitReader {
    type Item = ConnectorResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.finished {
            return None;
        }
        match self.fill_buffer() {
            Ok(true) => self.buffer.pop_front().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
