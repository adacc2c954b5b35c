// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Write planning
//!
//! A [`WritePlan`] is created once per write query and handed to every
//! task. It fixes the strategy for the whole job and, for the indirect
//! strategy, the job-scoped staging location.

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::{ConnectorConfig, WriteMethod};
use crate::error::{ConnectorError, ConnectorResult};
use crate::format::DataFormat;
use crate::storage::join_path;
use crate::types::{Schema, TableReference};
use crate::warehouse::{Warehouse, WarehouseError, WriteDisposition};

/// Staged files are always written in this format
pub const STAGING_FORMAT: DataFormat = DataFormat::Avro;

/// Identity of one attempt of a write job, supplied by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId {
    pub query_id: String,
    pub attempt: u32,
}

impl JobId {
    pub fn new(query_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            query_id: query_id.into(),
            attempt,
        }
    }

    /// Fresh id for callers that have no query id of their own
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().simple().to_string(), 0)
    }

    /// Query id escaped for object paths and job ids. ASCII alphanumerics
    /// and `-` pass through; every other byte, `_` included, becomes `_XX`
    /// (uppercase hex), so distinct query ids never share a segment.
    pub fn sanitized_query(&self) -> String {
        let mut escaped = String::with_capacity(self.query_id.len());
        for byte in self.query_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                escaped.push(char::from(byte));
            } else {
                escaped.push_str(&format!("_{:02X}", byte));
            }
        }
        escaped
    }

    /// Warehouse load job id; one per job attempt
    pub fn load_job_id(&self) -> String {
        format!("load_{}_{}", self.sanitized_query(), self.attempt)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.query_id, self.attempt)
    }
}

/// Object-storage prefix owned by one job attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingLocation {
    /// Always ends with `/`
    pub prefix: String,
}

impl StagingLocation {
    pub fn for_job(root: &str, job: &JobId) -> Self {
        let segment = format!("job_{}_attempt_{}/", job.sanitized_query(), job.attempt);
        Self {
            prefix: join_path(root, &segment),
        }
    }

    /// File owned by `task_id`; a retried task maps to the same file
    pub fn task_file(&self, task_id: usize) -> String {
        format!(
            "{}task_{:05}.{}",
            self.prefix,
            task_id,
            STAGING_FORMAT.extension()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteStrategy {
    Direct,
    Indirect { staging: StagingLocation },
}

impl WriteStrategy {
    pub fn staging(&self) -> Option<&StagingLocation> {
        match self {
            WriteStrategy::Direct => None,
            WriteStrategy::Indirect { staging } => Some(staging),
        }
    }
}

/// Shared by every task of a write job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritePlan {
    pub job: JobId,
    pub table: TableReference,
    /// Target table schema rows are validated against
    pub schema: Schema,
    pub strategy: WriteStrategy,
    pub disposition: WriteDisposition,
    pub config: ConnectorConfig,
}

impl WritePlan {
    pub fn is_indirect(&self) -> bool {
        matches!(self.strategy, WriteStrategy::Indirect { .. })
    }

    pub fn to_json(&self) -> ConnectorResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct WritePlanner<'a> {
    warehouse: &'a dyn Warehouse,
    config: &'a ConnectorConfig,
}

impl<'a> WritePlanner<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &'a ConnectorConfig) -> Self {
        Self { warehouse, config }
    }

    pub fn plan(&self, job: JobId, disposition: WriteDisposition) -> ConnectorResult<WritePlan> {
        let table = &self.config.table;
        if disposition == WriteDisposition::Truncate && self.config.write_method == WriteMethod::Direct
        {
            return Err(ConnectorError::Configuration(
                "overwriting a table requires the indirect write method".to_string(),
            ));
        }

        let info = self.warehouse.get_table(table).map_err(|e| match e {
            WarehouseError::NotFound(_) => {
                ConnectorError::Planning(format!("table {} does not exist", table))
            }
            other => other.into(),
        })?;
        if info.is_view() {
            return Err(ConnectorError::Planning(format!(
                "{} is a view and cannot be written to",
                table
            )));
        }

        let strategy = match self.config.write_method {
            WriteMethod::Direct => WriteStrategy::Direct,
            WriteMethod::Indirect => {
                let root = self.config.staging_root.as_deref().ok_or_else(|| {
                    ConnectorError::Configuration(
                        "indirect writes need a staging path".to_string(),
                    )
                })?;
                WriteStrategy::Indirect {
                    staging: StagingLocation::for_job(root, &job),
                }
            }
        };

        match strategy.staging() {
            Some(staging) => info!(
                "Planned indirect write of job {} into {} staging under {}",
                job, table, staging.prefix
            ),
            None => info!("Planned direct write of job {} into {}", job, table),
        }

        Ok(WritePlan {
            job,
            table: table.clone(),
            schema: info.schema,
            strategy,
            disposition,
            config: self.config.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FieldType};
    use crate::warehouse::InMemoryWarehouse;
    use std::collections::HashSet;

    fn setup() -> (InMemoryWarehouse, ConnectorConfig) {
        let table = TableReference::new("p", "d", "t");
        let warehouse = InMemoryWarehouse::new();
        warehouse
            .create_table(
                &table,
                Schema::new(vec![Field::required("id", FieldType::Int64)]),
            )
            .unwrap();
        (warehouse, ConnectorConfig::for_table(table))
    }

    #[test]
    fn test_staging_location_is_scoped_per_attempt() {
        let a = StagingLocation::for_job("gs://b/tmp/", &JobId::new("query 1", 0));
        let b = StagingLocation::for_job("gs://b/tmp", &JobId::new("query 1", 1));
        assert_eq!(a.prefix, "gs://b/tmp/job_query_201_attempt_0/");
        assert_ne!(a.prefix, b.prefix);
        assert_eq!(a.task_file(3), "gs://b/tmp/job_query_201_attempt_0/task_00003.avro");
        assert_eq!(JobId::new("query 1", 1).load_job_id(), "load_query_201_1");
    }

    #[test]
    fn test_distinct_query_ids_never_share_staging_or_load_job() {
        let ids = ["a b", "a_b", "a_20b", "a/b", "a-b", "ab"];
        let prefixes: HashSet<String> = ids
            .iter()
            .map(|q| StagingLocation::for_job("gs://b/tmp", &JobId::new(*q, 0)).prefix)
            .collect();
        let load_jobs: HashSet<String> = ids
            .iter()
            .map(|q| JobId::new(*q, 0).load_job_id())
            .collect();
        assert_eq!(prefixes.len(), ids.len());
        assert_eq!(load_jobs.len(), ids.len());

        let spaced = JobId::new("a b", 0);
        let underscored = JobId::new("a_b", 0);
        assert_ne!(
            StagingLocation::for_job("gs://b/tmp", &spaced).prefix,
            StagingLocation::for_job("gs://b/tmp", &underscored).prefix
        );
        assert_ne!(spaced.load_job_id(), underscored.load_job_id());
        assert_eq!(JobId::new("x\u{e9}", 0).sanitized_query(), "x_C3_A9");
    }

    #[test]
    fn test_direct_plan_has_no_staging() {
        let (warehouse, config) = setup();
        let plan = WritePlanner::new(&warehouse, &config)
            .plan(JobId::new("q", 0), WriteDisposition::Append)
            .unwrap();
        assert!(!plan.is_indirect());
        assert_eq!(plan.schema.names(), vec!["id"]);
    }

    #[test]
    fn test_indirect_plan_allocates_staging() {
        let (warehouse, mut config) = setup();
        config.write_method = WriteMethod::Indirect;
        config.staging_root = Some("mem://staging".to_string());
        let plan = WritePlanner::new(&warehouse, &config)
            .plan(JobId::new("q", 2), WriteDisposition::Truncate)
            .unwrap();
        assert_eq!(
            plan.strategy.staging().map(|s| s.prefix.as_str()),
            Some("mem://staging/job_q_attempt_2/")
        );
        let restored = WritePlan::from_json(&plan.to_json().unwrap()).unwrap();
        assert_eq!(restored, plan);
    }

    #[test]
    fn test_overwrite_requires_indirect() {
        let (warehouse, config) = setup();
        let err = WritePlanner::new(&warehouse, &config)
            .plan(JobId::new("q", 0), WriteDisposition::Truncate)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[test]
    fn test_missing_target_and_views() {
        let (warehouse, mut config) = setup();
        config.table = TableReference::new("p", "d", "missing");
        assert!(matches!(
            WritePlanner::new(&warehouse, &config).plan(JobId::generate(), WriteDisposition::Append),
            Err(ConnectorError::Planning(_))
        ));

        let view = TableReference::new("p", "d", "v");
        warehouse.create_view(&view, "SELECT * FROM `p.d.t`").unwrap();
        config.table = view;
        assert!(matches!(
            WritePlanner::new(&warehouse, &config).plan(JobId::generate(), WriteDisposition::Append),
            Err(ConnectorError::Planning(_))
        ));
    }
}
