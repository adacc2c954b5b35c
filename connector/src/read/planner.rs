// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Read planning
//!
//! Turns a table or view reference plus an optional filter into a
//! [`ReadPlan`]: one read session on the warehouse and one [`Partition`]
//! per stream of that session. Partitions are disjoint and together cover
//! the filtered table contents exactly.

use log::info;
use serde::{Deserialize, Serialize};

use super::view::{ViewDefinition, ViewResolver};
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::format::DataFormat;
use crate::sql::Predicate;
use crate::types::{Schema, TableReference};
use crate::warehouse::{ReadSessionRequest, TableInfo, Warehouse, WarehouseError};

/// What the engine wants out of a scan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadRequest {
    /// Selected columns in output order; `None` reads every column
    pub columns: Option<Vec<String>>,
    pub filter: Option<Predicate>,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Filter handed over by the engine as SQL text
    pub fn with_filter_text(self, text: &str) -> ConnectorResult<Self> {
        Ok(self.with_filter(Predicate::parse(text)?))
    }
}

/// One independently readable slice of a [`ReadPlan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: usize,
    /// Read-session stream token
    pub stream: String,
    pub format: DataFormat,
    pub estimated_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadPlan {
    /// Reference the engine asked for
    pub table: TableReference,
    /// Table the session was opened on; differs from `table` for views
    pub source: TableReference,
    pub session_id: String,
    /// Schema of the rows every partition produces
    pub schema: Schema,
    pub format: DataFormat,
    pub partitions: Vec<Partition>,
    pub view: Option<ViewDefinition>,
    /// Filter the engine must still apply; set only when pushdown failed
    pub residual_filter: Option<Predicate>,
}

impl ReadPlan {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partition(&self, id: usize) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.id == id)
    }

    /// Partition ids per task slot, dealt round-robin. Partitions are never
    /// merged or dropped: with fewer slots than partitions a slot reads
    /// several, with more some slots stay idle.
    pub fn assign_to_slots(&self, slots: usize) -> Vec<Vec<usize>> {
        let slots = slots.max(1);
        let mut assignment = vec![Vec::new(); slots];
        for (i, partition) in self.partitions.iter().enumerate() {
            assignment[i % slots].push(partition.id);
        }
        assignment
    }

    /// Slot assignment for the configured engine: fixed slots for `mr`,
    /// one task per partition otherwise.
    pub fn task_assignment(&self, config: &ConnectorConfig) -> Vec<Vec<usize>> {
        match config.fixed_parallelism() {
            Some(slots) => self.assign_to_slots(slots),
            None => self.partitions.iter().map(|p| vec![p.id]).collect(),
        }
    }

    pub fn to_json(&self) -> ConnectorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct ReadPlanner<'a> {
    warehouse: &'a dyn Warehouse,
    config: &'a ConnectorConfig,
}

impl<'a> ReadPlanner<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &'a ConnectorConfig) -> Self {
        Self { warehouse, config }
    }

    pub fn plan(&self, request: &ReadRequest) -> ConnectorResult<ReadPlan> {
        let table = &self.config.table;
        let info = self.warehouse.get_table(table).map_err(|e| match e {
            WarehouseError::NotFound(_) => {
                ConnectorError::Planning(format!("table {} does not exist", table))
            }
            other => other.into(),
        })?;

        if info.is_view() {
            ViewResolver::ensure_enabled(self.config, table)?;
        }
        self.check_format(&info)?;
        if let Some(columns) = &request.columns {
            info.schema.project(columns).map_err(|column| {
                ConnectorError::Planning(format!("unknown column '{}' in {}", column, table))
            })?;
        }

        if let Some(filter) = &request.filter {
            if !filter.is_pushable() {
                return Err(ConnectorError::Planning(format!(
                    "filter {} compares against a non-finite float, which has no SQL literal",
                    filter
                )));
            }
        }

        let (source, row_restriction, view, residual_filter) = if info.is_view() {
            let resolved = ViewResolver::new(self.warehouse, self.config)
                .resolve(&info, request.filter.as_ref())?;
            (
                resolved.materialized.table,
                None,
                Some(resolved.definition),
                resolved.residual,
            )
        } else {
            if let Some(filter) = &request.filter {
                if !filter.is_resolvable(&info.schema) {
                    return Err(ConnectorError::Planning(format!(
                        "filter {} references columns not in {}",
                        filter, table
                    )));
                }
            }
            (
                table.clone(),
                request.filter.as_ref().map(|f| f.to_string()),
                None,
                None,
            )
        };

        let session_request = ReadSessionRequest {
            table: source.clone(),
            selected_fields: request.columns.clone().unwrap_or_default(),
            row_restriction,
            format: self.config.read_format,
            max_stream_count: self
                .config
                .max_parallelism
                .or_else(|| self.config.fixed_parallelism()),
        };
        let session = self
            .warehouse
            .create_read_session(&session_request)
            .map_err(|e| match e {
                WarehouseError::NotFound(m) | WarehouseError::InvalidArgument(m) => {
                    ConnectorError::Planning(format!("cannot open read session on {}: {}", source, m))
                }
                other => other.into(),
            })?;

        let partitions: Vec<Partition> = session
            .streams
            .iter()
            .enumerate()
            .map(|(id, stream)| Partition {
                id,
                stream: stream.name.clone(),
                format: session.format,
                estimated_rows: stream.estimated_rows,
            })
            .collect();

        info!(
            "Planned read of {} with {} partition(s) in {} format",
            table,
            partitions.len(),
            session.format
        );

        Ok(ReadPlan {
            table: table.clone(),
            source,
            session_id: session.id,
            schema: session.schema,
            format: session.format,
            partitions,
            view,
            residual_filter,
        })
    }

    fn check_format(&self, info: &TableInfo) -> ConnectorResult<()> {
        if info.supports_format(self.config.read_format) {
            Ok(())
        } else {
            Err(ConnectorError::FormatUnsupported {
                format: self.config.read_format.to_string(),
                table: info.table.to_string(),
            })
        }
    }
}
