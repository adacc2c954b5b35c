//! Engine fixture backed by the in-memory warehouse and object store

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use warehouse_connector::{
    Connector, ConnectorConfig, ConnectorResult, Field, FieldType, InMemoryWarehouse, JobId,
    MemoryObjectStore, ObjectStore, ReadPlan, ReadRequest, Row, Schema, TableReference, Value,
    WriteDisposition, WriteJob,
};

pub const PROJECT: &str = "test-project";

/// Engines and read formats every view scenario runs against
pub const ENGINES: [&str; 2] = ["mr", "tez"];
pub const READ_FORMATS: [&str; 2] = ["arrow", "avro"];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `number INT64, text STRING`, both nullable
pub fn number_text_schema() -> Schema {
    Schema::new(vec![
        Field::nullable("number", FieldType::Int64),
        Field::nullable("text", FieldType::String),
    ])
}

pub fn number_text(number: i64, text: &str) -> Row {
    Row::new(vec![Value::Int64(number), Value::from(text)])
}

pub struct EngineFixture {
    pub warehouse: Arc<InMemoryWarehouse>,
    pub store: Arc<MemoryObjectStore>,
    pub connector: Connector,
    dataset: String,
    engine_defaults: HashMap<String, String>,
}

impl EngineFixture {
    pub fn new() -> Self {
        init_logging();
        let store = Arc::new(MemoryObjectStore::new());
        let warehouse = Arc::new(
            InMemoryWarehouse::new()
                .with_object_store(store.clone())
                .with_batch_rows(3),
        );
        let connector = Connector::new(warehouse.clone(), store.clone());

        // Unique dataset per fixture so tests never share tables
        let dataset = format!("test_ds_{}", fastrand::u64(..));
        let mut engine_defaults = HashMap::new();
        engine_defaults.insert(
            "warehouse.staging.path".to_string(),
            format!("mem://staging/{}", dataset),
        );
        engine_defaults.insert("warehouse.load.poll.interval.ms".to_string(), "1".to_string());
        engine_defaults.insert("warehouse.load.timeout.ms".to_string(), "200".to_string());

        Self {
            warehouse,
            store,
            connector,
            dataset,
            engine_defaults,
        }
    }

    pub fn table(&self, name: &str) -> TableReference {
        TableReference::new(PROJECT, self.dataset.clone(), name)
    }

    pub fn staging_root(&self) -> String {
        format!("mem://staging/{}", self.dataset)
    }

    pub fn create_table(&self, name: &str, schema: Schema, rows: Vec<Row>) -> TableReference {
        let table = self.table(name);
        self.warehouse
            .create_table(&table, schema)
            .expect("Failed to create table");
        if !rows.is_empty() {
            self.warehouse
                .insert(&table, rows)
                .expect("Failed to insert rows");
        }
        table
    }

    pub fn create_view(&self, name: &str, query: &str) -> TableReference {
        let view = self.table(name);
        self.warehouse
            .create_view(&view, query)
            .expect("Failed to create view");
        view
    }

    /// Resolve a configuration for `table` with per-query `overrides`
    pub fn config(
        &self,
        table: &TableReference,
        overrides: &[(&str, &str)],
    ) -> ConnectorResult<ConnectorConfig> {
        let mut connection = HashMap::new();
        connection.insert("warehouse.table".to_string(), table.to_string());
        connection.insert("warehouse.connection".to_string(), "fixture".to_string());
        let overrides: HashMap<String, String> = overrides
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Connector::resolve_config(&self.engine_defaults, &connection, &overrides)
    }

    /// Plan, read every partition as the engine would and apply any
    /// residual filter
    pub fn scan(
        &self,
        config: &ConnectorConfig,
        request: &ReadRequest,
    ) -> ConnectorResult<(ReadPlan, Vec<Row>)> {
        let plan = self.connector.plan_read(config, request)?;
        // Ship the plan to the "tasks" the way an engine would
        let shipped = ReadPlan::from_json(&plan.to_json()?)?;

        let mut rows = Vec::new();
        for slot in shipped.task_assignment(config) {
            for partition_id in slot {
                for row in self.connector.open_split(config, &shipped, partition_id)? {
                    rows.push(row?);
                }
            }
        }
        if let Some(residual) = &shipped.residual_filter {
            rows.retain(|row| residual.matches(&shipped.schema, row));
        }
        Ok((plan, rows))
    }

    pub fn query(&self, config: &ConnectorConfig, filter: Option<&str>) -> ConnectorResult<Vec<Row>> {
        let request = match filter {
            Some(text) => ReadRequest::new().with_filter_text(text)?,
            None => ReadRequest::new(),
        };
        self.scan(config, &request).map(|(_, rows)| rows)
    }

    /// Run one task per entry of `tasks`, then commit the job. On commit
    /// failure the job is aborted, as an engine would.
    pub fn write(
        &self,
        config: &ConnectorConfig,
        job: JobId,
        disposition: WriteDisposition,
        tasks: Vec<Vec<Row>>,
    ) -> (WriteJob, ConnectorResult<()>) {
        let mut write_job = match self.connector.plan_write(config, job, disposition) {
            Ok(job) => job,
            Err(e) => panic!("Failed to plan write: {}", e),
        };
        for (task_id, rows) in tasks.into_iter().enumerate() {
            if let Err(e) = self.run_task(&mut write_job, task_id, rows) {
                let _ = self.connector.abort_job(&mut write_job);
                return (write_job, Err(e));
            }
        }
        let result = self.connector.commit_job(&mut write_job);
        if result.is_err() {
            let _ = self.connector.abort_job(&mut write_job);
        }
        (write_job, result)
    }

    pub fn run_task(&self, job: &mut WriteJob, task_id: usize, rows: Vec<Row>) -> ConnectorResult<()> {
        let mut writer = self.connector.task_writer(job, task_id);
        writer.write_all(rows)?;
        let report = writer.finish()?;
        self.connector.commit_task(job, report)
    }

    pub fn objects_under(&self, prefix: &str) -> Vec<String> {
        self.store.list(prefix).expect("Failed to list objects")
    }
}

/// Assert two row sets are equal ignoring order and contain no duplicates
pub fn assert_same_rows(actual: &[Row], expected: &[Row]) {
    let render = |rows: &[Row]| -> Vec<String> {
        let mut rendered: Vec<String> = rows.iter().map(|r| format!("{:?}", r)).collect();
        rendered.sort();
        rendered
    };
    let actual_rendered = render(actual);
    let unique: HashSet<&String> = actual_rendered.iter().collect();
    assert_eq!(unique.len(), actual_rendered.len(), "duplicate rows in {:?}", actual);
    assert_eq!(actual_rendered, render(expected));
}
