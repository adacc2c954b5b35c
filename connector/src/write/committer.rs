// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Output committer
//!
//! Binds a write plan to the engine's job and task lifecycle. All job state
//! lives in a [`WriteJob`] value owned by the caller; the committer itself
//! holds nothing between calls.
//!
//! ```text
//! planned -> tasks-writing -> all-tasks-committed -> job-committing
//!     direct:   -> job-committed
//!     indirect: -> load-job-running -> load-job-succeeded | load-job-failed
//! any pre-terminal state -> job-aborted
//! ```

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::load::LoadJobCoordinator;
use super::planner::WritePlan;
use super::TaskReport;
use crate::error::{ConnectorError, ConnectorResult};
use crate::storage::ObjectStore;
use crate::warehouse::{LoadJob, LoadJobState, Warehouse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitState {
    Planned,
    TasksWriting,
    AllTasksCommitted,
    JobCommitting,
    JobCommitted,
    LoadJobRunning,
    LoadJobSucceeded,
    LoadJobFailed,
    JobAborted,
}

impl CommitState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommitState::JobCommitted
                | CommitState::LoadJobSucceeded
                | CommitState::LoadJobFailed
                | CommitState::JobAborted
        )
    }

    /// True once the job's rows are visible to readers
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitState::JobCommitted | CommitState::LoadJobSucceeded)
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitState::Planned => "planned",
            CommitState::TasksWriting => "tasks-writing",
            CommitState::AllTasksCommitted => "all-tasks-committed",
            CommitState::JobCommitting => "job-committing",
            CommitState::JobCommitted => "job-committed",
            CommitState::LoadJobRunning => "load-job-running",
            CommitState::LoadJobSucceeded => "load-job-succeeded",
            CommitState::LoadJobFailed => "load-job-failed",
            CommitState::JobAborted => "job-aborted",
        };
        f.write_str(name)
    }
}

/// Explicit state of one write job, passed to every committer call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteJob {
    pub plan: WritePlan,
    pub state: CommitState,
    /// Latest committed report per task id
    pub tasks: BTreeMap<usize, TaskReport>,
    pub load_job: Option<LoadJob>,
}

impl WriteJob {
    pub fn new(plan: WritePlan) -> Self {
        Self {
            plan,
            state: CommitState::Planned,
            tasks: BTreeMap::new(),
            load_job: None,
        }
    }

    pub fn rows_committed_by_tasks(&self) -> u64 {
        self.tasks.values().map(|t| t.rows).sum()
    }

    fn transition(&mut self, to: CommitState) {
        debug!("Job {}: {} -> {}", self.plan.job, self.state, to);
        self.state = to;
    }

    fn expect_state(&self, allowed: &[CommitState], action: &str) -> ConnectorResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ConnectorError::InvalidState(format!(
                "cannot {} job {} in state {}",
                action, self.plan.job, self.state
            )))
        }
    }
}

pub struct OutputCommitter<'a> {
    warehouse: &'a dyn Warehouse,
    store: &'a dyn ObjectStore,
}

impl<'a> OutputCommitter<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, store: &'a dyn ObjectStore) -> Self {
        Self { warehouse, store }
    }

    /// Per-task pre-commit. A retried task replaces its earlier report.
    pub fn commit_task(&self, job: &mut WriteJob, report: TaskReport) -> ConnectorResult<()> {
        job.expect_state(
            &[CommitState::Planned, CommitState::TasksWriting],
            "commit a task of",
        )?;
        job.transition(CommitState::TasksWriting);
        if let Some(previous) = job.tasks.insert(report.task_id, report) {
            info!(
                "Task {} of job {} committed again, replacing its earlier attempt",
                previous.task_id, job.plan.job
            );
        }
        Ok(())
    }

    /// Discard a task attempt: forget its report and remove its staged file
    pub fn abort_task(&self, job: &mut WriteJob, task_id: usize) -> ConnectorResult<()> {
        job.expect_state(
            &[CommitState::Planned, CommitState::TasksWriting],
            "abort a task of",
        )?;
        job.tasks.remove(&task_id);
        if let Some(staging) = job.plan.strategy.staging() {
            let path = staging.task_file(task_id);
            if let Err(e) = self.store.delete(&path) {
                warn!("Failed to remove staged file {} of aborted task: {}", path, e);
            }
        } else {
            warn!(
                "Task {} of job {} aborted; rows it already streamed into {} stay visible",
                task_id, job.plan.job, job.plan.table
            );
        }
        Ok(())
    }

    /// Job-level commit, called once after every task has committed
    pub fn commit_job(&self, job: &mut WriteJob) -> ConnectorResult<()> {
        job.expect_state(&[CommitState::Planned, CommitState::TasksWriting], "commit")?;
        job.transition(CommitState::AllTasksCommitted);
        job.transition(CommitState::JobCommitting);

        let staging = match job.plan.strategy.staging() {
            None => {
                job.transition(CommitState::JobCommitted);
                info!(
                    "Committed direct write job {}: {} row(s) from {} task(s)",
                    job.plan.job,
                    job.rows_committed_by_tasks(),
                    job.tasks.len()
                );
                return Ok(());
            }
            Some(staging) => staging.clone(),
        };

        let load = LoadJobCoordinator::new(self.warehouse, self.store);
        job.transition(CommitState::LoadJobRunning);
        let issued = match load.start(&job.plan, &staging) {
            Ok(issued) => issued,
            Err(e) => {
                load.cleanup(&staging);
                job.transition(CommitState::LoadJobFailed);
                return Err(e);
            }
        };
        job.load_job = Some(issued.clone());

        // Timeouts and poll errors leave the job in load-job-running
        let finished = load.await_completion(&job.plan, &issued.id)?;
        job.load_job = Some(finished.clone());
        load.cleanup(&staging);

        if finished.state == LoadJobState::Succeeded {
            job.transition(CommitState::LoadJobSucceeded);
            info!(
                "Committed indirect write job {}: load job {} loaded {} row(s)",
                job.plan.job, finished.id, finished.rows_loaded
            );
            Ok(())
        } else {
            job.transition(CommitState::LoadJobFailed);
            Err(ConnectorError::LoadJob {
                job_id: finished.id.clone(),
                message: finished
                    .error
                    .unwrap_or_else(|| format!("job ended in state {}", finished.state)),
            })
        }
    }

    /// Job-level abort. Removes the staging location; never cancels a load
    /// job that was already issued.
    pub fn abort_job(&self, job: &mut WriteJob) -> ConnectorResult<()> {
        match job.state {
            CommitState::JobCommitted | CommitState::LoadJobSucceeded => {
                return Err(ConnectorError::InvalidState(format!(
                    "cannot abort job {}: it is already {}",
                    job.plan.job, job.state
                )))
            }
            CommitState::LoadJobRunning => {
                let job_id = job
                    .load_job
                    .as_ref()
                    .map(|j| j.id.clone())
                    .unwrap_or_else(|| job.plan.job.load_job_id());
                warn!(
                    "Aborting job {} while load job {} may still be running; \
                     it cannot be cancelled and is left orphaned",
                    job.plan.job, job_id
                );
            }
            _ => {}
        }

        match job.plan.strategy.staging() {
            Some(staging) => {
                LoadJobCoordinator::new(self.warehouse, self.store).cleanup(staging);
            }
            None if job.rows_committed_by_tasks() > 0 => warn!(
                "Aborted direct write job {}; {} streamed row(s) remain visible in {}",
                job.plan.job,
                job.rows_committed_by_tasks(),
                job.plan.table
            ),
            None => {}
        }

        if job.state != CommitState::LoadJobFailed {
            job.transition(CommitState::JobAborted);
        }
        info!("Job {} aborted", job.plan.job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectorConfig, WriteMethod};
    use crate::storage::MemoryObjectStore;
    use crate::types::{Field, FieldType, Row, Schema, TableReference, Value};
    use crate::warehouse::{InMemoryWarehouse, WriteDisposition};
    use crate::write::{JobId, StagingWriter, WritePlanner};
    use std::sync::Arc;
    use std::time::Duration;

    fn setup(method: WriteMethod) -> (InMemoryWarehouse, Arc<MemoryObjectStore>, WriteJob) {
        let table = TableReference::new("p", "d", "t");
        let store = Arc::new(MemoryObjectStore::new());
        let warehouse = InMemoryWarehouse::new().with_object_store(store.clone());
        warehouse
            .create_table(&table, Schema::new(vec![Field::required("id", FieldType::Int64)]))
            .unwrap();
        let mut config = ConnectorConfig::for_table(table);
        config.write_method = method;
        config.staging_root = Some("mem://staging".to_string());
        config.load_poll_interval = Duration::from_millis(1);
        config.load_timeout = Duration::from_millis(50);
        let plan = WritePlanner::new(&warehouse, &config)
            .plan(JobId::new("q", 0), WriteDisposition::Append)
            .unwrap();
        (warehouse, store, WriteJob::new(plan))
    }

    fn stage(store: &Arc<MemoryObjectStore>, job: &WriteJob, task_id: usize) -> TaskReport {
        let staging = job.plan.strategy.staging().unwrap();
        let mut writer = StagingWriter::new(store.clone(), staging, job.plan.schema.clone(), task_id);
        writer.write(Row::new(vec![Value::Int64(task_id as i64)])).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_direct_job_lifecycle() {
        let (warehouse, store, mut job) = setup(WriteMethod::Direct);
        let committer = OutputCommitter::new(&warehouse, &*store);
        committer
            .commit_task(&mut job, TaskReport { task_id: 0, rows: 3, file: None })
            .unwrap();
        assert_eq!(job.state, CommitState::TasksWriting);
        committer.commit_job(&mut job).unwrap();
        assert_eq!(job.state, CommitState::JobCommitted);
        assert!(job.load_job.is_none());
        assert!(matches!(
            committer.commit_job(&mut job),
            Err(ConnectorError::InvalidState(_))
        ));
        assert!(committer.abort_job(&mut job).is_err());
    }

    #[test]
    fn test_indirect_job_lifecycle() {
        let (warehouse, store, mut job) = setup(WriteMethod::Indirect);
        let committer = OutputCommitter::new(&warehouse, &*store);
        for task in 0..3 {
            let report = stage(&store, &job, task);
            committer.commit_task(&mut job, report).unwrap();
        }
        committer.commit_job(&mut job).unwrap();
        assert_eq!(job.state, CommitState::LoadJobSucceeded);
        assert_eq!(job.load_job.as_ref().map(|j| j.rows_loaded), Some(3));
        assert_eq!(warehouse.rows(&job.plan.table).unwrap().len(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_abort_task_removes_its_file() {
        let (warehouse, store, mut job) = setup(WriteMethod::Indirect);
        let committer = OutputCommitter::new(&warehouse, &*store);
        let report = stage(&store, &job, 0);
        committer.commit_task(&mut job, report).unwrap();
        stage(&store, &job, 1);
        committer.abort_task(&mut job, 1).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(job.tasks.len(), 1);

        committer.commit_job(&mut job).unwrap();
        assert_eq!(warehouse.rows(&job.plan.table).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_load_then_abort() {
        let (warehouse, store, mut job) = setup(WriteMethod::Indirect);
        warehouse.fail_next_load_job("bad file");
        let committer = OutputCommitter::new(&warehouse, &*store);
        let report = stage(&store, &job, 0);
        committer.commit_task(&mut job, report).unwrap();

        let err = committer.commit_job(&mut job).unwrap_err();
        assert!(matches!(err, ConnectorError::LoadJob { .. }));
        assert_eq!(job.state, CommitState::LoadJobFailed);
        assert!(store.is_empty());

        committer.abort_job(&mut job).unwrap();
        assert_eq!(job.state, CommitState::LoadJobFailed);
    }

    #[test]
    fn test_orphaned_load_job_is_left_alone_on_abort() {
        let (warehouse, store, mut job) = setup(WriteMethod::Indirect);
        warehouse.stall_load_jobs(true);
        let committer = OutputCommitter::new(&warehouse, &*store);
        let report = stage(&store, &job, 0);
        committer.commit_task(&mut job, report).unwrap();

        let err = committer.commit_job(&mut job).unwrap_err();
        assert!(matches!(err, ConnectorError::LoadJobOrphaned { .. }));
        assert_eq!(job.state, CommitState::LoadJobRunning);
        assert!(!store.is_empty());

        committer.abort_job(&mut job).unwrap();
        assert_eq!(job.state, CommitState::JobAborted);
        assert!(store.is_empty());
        assert_eq!(warehouse.load_jobs().len(), 1);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CommitState::LoadJobRunning.to_string(), "load-job-running");
        assert!(CommitState::JobAborted.is_terminal());
        assert!(!CommitState::JobAborted.is_committed());
    }
}
