// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bulk-load job coordination for indirect writes
//!
//! Used once per job commit: issue a single load job over the whole
//! staging location, poll it to a terminal state, remove the staged
//! files. A job that is never seen finishing is reported as orphaned and
//! is not reissued, since a second load could apply the same rows twice.

use log::{info, warn};
use std::thread;
use std::time::Instant;

use super::planner::{StagingLocation, WritePlan, STAGING_FORMAT};
use crate::error::{ConnectorError, ConnectorResult};
use crate::storage::ObjectStore;
use crate::warehouse::{LoadJob, LoadJobRequest, Warehouse, WarehouseError};

pub struct LoadJobCoordinator<'a> {
    warehouse: &'a dyn Warehouse,
    store: &'a dyn ObjectStore,
}

impl<'a> LoadJobCoordinator<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, store: &'a dyn ObjectStore) -> Self {
        Self { warehouse, store }
    }

    /// Issue the load job over every object under the staging prefix
    pub fn start(&self, plan: &WritePlan, staging: &StagingLocation) -> ConnectorResult<LoadJob> {
        let source_uris = self.store.list(&staging.prefix)?;
        let request = LoadJobRequest {
            job_id: plan.job.load_job_id(),
            destination: plan.table.clone(),
            source_uris,
            format: STAGING_FORMAT,
            disposition: plan.disposition,
        };
        let job = self.warehouse.start_load_job(&request).map_err(|e| match e {
            WarehouseError::AlreadyExists(_) => ConnectorError::LoadJob {
                job_id: request.job_id.clone(),
                message: "a load job with this id was already issued".to_string(),
            },
            other => other.into(),
        })?;
        info!(
            "Issued load job {} into {} from {} staged file(s) ({:?})",
            job.id,
            plan.table,
            request.source_uris.len(),
            plan.disposition
        );
        Ok(job)
    }

    /// Poll until the job is terminal or the configured timeout passes
    pub fn await_completion(&self, plan: &WritePlan, job_id: &str) -> ConnectorResult<LoadJob> {
        let config = &plan.config;
        let started = Instant::now();
        let mut poll_failures = 0;
        let mut last_state = None;
        loop {
            match self.warehouse.get_load_job(job_id) {
                Ok(job) if job.state.is_terminal() => {
                    info!("Load job {} finished as {}", job_id, job.state);
                    return Ok(job);
                }
                Ok(job) => {
                    poll_failures = 0;
                    if last_state != Some(job.state) {
                        info!("Load job {} is {}", job_id, job.state);
                        last_state = Some(job.state);
                    }
                }
                Err(e) if e.is_transient() && poll_failures < config.write_max_retries => {
                    poll_failures += 1;
                    warn!("Polling load job {} failed: {}", job_id, e);
                }
                Err(e) => return Err(e.into()),
            }

            let waited = started.elapsed();
            if waited >= config.load_timeout {
                warn!(
                    "Load job {} not finished after {:?}; treating it as orphaned. \
                     It will not be reissued; staged files remain under {}",
                    job_id,
                    waited,
                    plan.strategy
                        .staging()
                        .map(|s| s.prefix.as_str())
                        .unwrap_or("-")
                );
                return Err(ConnectorError::LoadJobOrphaned {
                    job_id: job_id.to_string(),
                    waited,
                });
            }
            thread::sleep(config.load_poll_interval);
        }
    }

    /// Remove everything under the staging prefix. Failures are logged;
    /// the job outcome has already been decided at this point.
    pub fn cleanup(&self, staging: &StagingLocation) {
        match self.store.delete_prefix(&staging.prefix) {
            Ok(count) => info!("Removed {} staged file(s) under {}", count, staging.prefix),
            Err(e) => warn!("Failed to clean up staging {}: {}", staging.prefix, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectorConfig, WriteMethod};
    use crate::storage::MemoryObjectStore;
    use crate::types::{Field, FieldType, Row, Schema, TableReference, Value};
    use crate::warehouse::{InMemoryWarehouse, LoadJobState, WriteDisposition};
    use crate::write::{JobId, StagingWriter, WritePlanner};
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (InMemoryWarehouse, Arc<MemoryObjectStore>, WritePlan) {
        let table = TableReference::new("p", "d", "t");
        let store = Arc::new(MemoryObjectStore::new());
        let warehouse = InMemoryWarehouse::new().with_object_store(store.clone());
        warehouse
            .create_table(&table, Schema::new(vec![Field::required("id", FieldType::Int64)]))
            .unwrap();
        let mut config = ConnectorConfig::for_table(table);
        config.write_method = WriteMethod::Indirect;
        config.staging_root = Some("mem://staging".to_string());
        config.load_poll_interval = Duration::from_millis(1);
        config.load_timeout = Duration::from_millis(50);
        let plan = WritePlanner::new(&warehouse, &config)
            .plan(JobId::new("q", 0), WriteDisposition::Append)
            .unwrap();

        let staging = plan.strategy.staging().unwrap().clone();
        for task in 0..2 {
            let mut writer = StagingWriter::new(store.clone(), &staging, plan.schema.clone(), task);
            writer.write(Row::new(vec![Value::Int64(task as i64)])).unwrap();
            writer.finish().unwrap();
        }
        (warehouse, store, plan)
    }

    #[test]
    fn test_issue_poll_and_clean_up() {
        let (warehouse, store, plan) = setup();
        let staging = plan.strategy.staging().unwrap();
        let load = LoadJobCoordinator::new(&warehouse, &*store);

        let issued = load.start(&plan, staging).unwrap();
        assert_eq!(issued.id, "load_q_0");
        assert_eq!(warehouse.load_jobs().len(), 1);

        let finished = load.await_completion(&plan, &issued.id).unwrap();
        assert_eq!(finished.state, LoadJobState::Succeeded);
        assert_eq!(finished.rows_loaded, 2);
        assert_eq!(warehouse.rows(&plan.table).unwrap().len(), 2);

        load.cleanup(staging);
        assert!(store.is_empty());
    }

    #[test]
    fn test_second_issue_is_rejected() {
        let (warehouse, store, plan) = setup();
        let staging = plan.strategy.staging().unwrap();
        let load = LoadJobCoordinator::new(&warehouse, &*store);
        load.start(&plan, staging).unwrap();
        assert!(matches!(
            load.start(&plan, staging),
            Err(ConnectorError::LoadJob { .. })
        ));
        assert_eq!(warehouse.load_jobs().len(), 1);
    }

    #[test]
    fn test_failed_job_is_terminal_with_detail() {
        let (warehouse, store, plan) = setup();
        warehouse.fail_next_load_job("quota exceeded");
        let staging = plan.strategy.staging().unwrap();
        let load = LoadJobCoordinator::new(&warehouse, &*store);
        let issued = load.start(&plan, staging).unwrap();
        let finished = load.await_completion(&plan, &issued.id).unwrap();
        assert_eq!(finished.state, LoadJobState::Failed);
        assert_eq!(finished.error.as_deref(), Some("quota exceeded"));
        assert!(warehouse.rows(&plan.table).unwrap().is_empty());
    }

    #[test]
    fn test_stalled_job_times_out_as_orphaned() {
        let (warehouse, store, plan) = setup();
        warehouse.stall_load_jobs(true);
        let staging = plan.strategy.staging().unwrap();
        let load = LoadJobCoordinator::new(&warehouse, &*store);
        let issued = load.start(&plan, staging).unwrap();
        let err = load.await_completion(&plan, &issued.id).unwrap_err();
        assert!(matches!(err, ConnectorError::LoadJobOrphaned { .. }));
        assert_eq!(warehouse.load_jobs().len(), 1);
    }
}
