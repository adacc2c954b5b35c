// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Write path
//!
//! Two strategies share one task-side interface. With the direct strategy
//! each task streams rows into the table. With the indirect strategy each
//! task stages an object and the job commit applies all of them through a
//! single bulk-load job.

pub mod committer;
pub mod direct;
pub mod load;
pub mod planner;
pub mod staging;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConnectorResult;
use crate::storage::ObjectStore;
use crate::types::Row;
use crate::warehouse::Warehouse;

pub use committer::{CommitState, OutputCommitter, WriteJob};
pub use direct::DirectWriter;
pub use load::LoadJobCoordinator;
pub use planner::{JobId, StagingLocation, WritePlan, WritePlanner, WriteStrategy};
pub use staging::StagingWriter;

/// What a finished task hands to the committer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: usize,
    pub rows: u64,
    /// Staged object, indirect strategy only
    pub file: Option<String>,
}

/// Per-task row sink for either strategy
pub enum TaskWriter {
    Direct(DirectWriter),
    Staged(StagingWriter),
}

impl TaskWriter {
    pub fn for_plan(
        plan: &WritePlan,
        task_id: usize,
        warehouse: Arc<dyn Warehouse>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        match &plan.strategy {
            WriteStrategy::Direct => TaskWriter::Direct(DirectWriter::new(
                warehouse,
                plan.table.clone(),
                plan.schema.clone(),
                &plan.job,
                task_id,
                plan.config.insert_batch_size,
                plan.config.write_max_retries,
            )),
            WriteStrategy::Indirect { staging } => TaskWriter::Staged(StagingWriter::new(
                store,
                staging,
                plan.schema.clone(),
                task_id,
            )),
        }
    }

    pub fn write(&mut self, row: Row) -> ConnectorResult<()> {
        match self {
            TaskWriter::Direct(writer) => writer.write(row),
            TaskWriter::Staged(writer) => writer.write(row),
        }
    }

    pub fn write_all(&mut self, rows: impl IntoIterator<Item = Row>) -> ConnectorResult<()> {
        for row in rows {
            self.write(row)?;
        }
        Ok(())
    }

    /// Flush or stage everything and report to the committer
    pub fn finish(self) -> ConnectorResult<TaskReport> {
        match self {
            TaskWriter::Direct(writer) => writer.finish(),
            TaskWriter::Staged(writer) => writer.finish(),
        }
    }
}
