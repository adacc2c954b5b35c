// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Connector - entry points called by the host engine
//!
//! The engine owns the process lifecycle. It resolves a configuration,
//! plans a read or a write once per query, runs splits and tasks wherever
//! it likes, and drives the job commit. Every call receives the state it
//! needs as an explicit value ([`ConnectorConfig`], [`ReadPlan`],
//! [`WriteJob`]); the connector keeps none of its own.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigResolver, ConnectorConfig};
use crate::error::ConnectorResult;
use crate::read::{ReadPlan, ReadPlanner, ReadRequest, SplitReader};
use crate::storage::ObjectStore;
use crate::warehouse::{Warehouse, WriteDisposition};
use crate::write::{
    JobId, OutputCommitter, TaskReport, TaskWriter, WriteJob, WritePlanner,
};

/// Connector bound to a warehouse and an object store
///
/// # Example
/// ```no_run
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use warehouse_connector::{Connector, InMemoryWarehouse, MemoryObjectStore, ReadRequest};
///
/// let connector = Connector::new(
///     Arc::new(InMemoryWarehouse::new()),
///     Arc::new(MemoryObjectStore::new()),
/// );
/// let mut options = HashMap::new();
/// options.insert("warehouse.table".to_string(), "proj.ds.tbl".to_string());
/// let config = Connector::resolve_config(&HashMap::new(), &HashMap::new(), &options)?;
/// let plan = connector.plan_read(&config, &ReadRequest::new())?;
/// for partition in &plan.partitions {
///     for row in connector.open_split(&config, &plan, partition.id)? {
///         println!("{:?}", row?);
///     }
/// }
/// # Ok::<(), warehouse_connector::ConnectorError>(())
/// ```
#[derive(Clone)]
pub struct Connector {
    warehouse: Arc<dyn Warehouse>,
    store: Arc<dyn ObjectStore>,
}

impl Connector {
    pub fn new(warehouse: Arc<dyn Warehouse>, store: Arc<dyn ObjectStore>) -> Self {
        Self { warehouse, store }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Merge engine defaults, connection properties and per-query overrides
    pub fn resolve_config(
        engine_defaults: &HashMap<String, String>,
        connection: &HashMap<String, String>,
        overrides: &HashMap<String, String>,
    ) -> ConnectorResult<ConnectorConfig> {
        ConfigResolver::resolve(engine_defaults, connection, overrides)
    }

    pub fn plan_read(
        &self,
        config: &ConnectorConfig,
        request: &ReadRequest,
    ) -> ConnectorResult<ReadPlan> {
        ReadPlanner::new(self.warehouse.as_ref(), config).plan(request)
    }

    /// Row iterator over one partition of `plan`
    pub fn open_split(
        &self,
        config: &ConnectorConfig,
        plan: &ReadPlan,
        partition_id: usize,
    ) -> ConnectorResult<SplitReader> {
        SplitReader::open(
            self.warehouse.clone(),
            plan,
            partition_id,
            config.read_max_retries,
        )
    }

    pub fn plan_write(
        &self,
        config: &ConnectorConfig,
        job: JobId,
        disposition: WriteDisposition,
    ) -> ConnectorResult<WriteJob> {
        let plan = WritePlanner::new(self.warehouse.as_ref(), config).plan(job, disposition)?;
        Ok(WriteJob::new(plan))
    }

    /// Row sink for one task of `job`
    pub fn task_writer(&self, job: &WriteJob, task_id: usize) -> TaskWriter {
        TaskWriter::for_plan(
            &job.plan,
            task_id,
            self.warehouse.clone(),
            self.store.clone(),
        )
    }

    pub fn commit_task(&self, job: &mut WriteJob, report: TaskReport) -> ConnectorResult<()> {
        self.committer().commit_task(job, report)
    }

    pub fn abort_task(&self, job: &mut WriteJob, task_id: usize) -> ConnectorResult<()> {
        self.committer().abort_task(job, task_id)
    }

    pub fn commit_job(&self, job: &mut WriteJob) -> ConnectorResult<()> {
        self.committer().commit_job(job)
    }

    pub fn abort_job(&self, job: &mut WriteJob) -> ConnectorResult<()> {
        self.committer().abort_job(job)
    }

    fn committer(&self) -> OutputCommitter<'_> {
        OutputCommitter::new(self.warehouse.as_ref(), self.store.as_ref())
    }
}
