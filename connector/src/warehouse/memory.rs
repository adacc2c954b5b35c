// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory warehouse
//!
//! A complete [`Warehouse`] backed by process memory, used by the test
//! suite and for embedding. Read sessions split the filtered rows into
//! contiguous ranges, load jobs progress one state per poll and read their
//! sources from an [`ObjectStore`]. Faults can be injected to exercise
//! retry and failure handling.

use log::debug;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{
    BatchStream, LoadJob, LoadJobRequest, LoadJobState, ReadSession, ReadSessionRequest,
    ReadStream, SerializedBatch, TableInfo, TableKind, Warehouse, WarehouseError,
    WarehouseResult, WriteDisposition,
};
use crate::format::DataFormat;
use crate::sql::{Predicate, Projection, QuerySource, SelectQuery};
use crate::storage::ObjectStore;
use crate::types::{Row, Schema, TableReference};

/// Views nested deeper than this are rejected
const MAX_VIEW_DEPTH: usize = 16;

struct StoredTable {
    info: TableInfo,
    rows: Vec<Row>,
}

struct StreamState {
    schema: Schema,
    format: DataFormat,
    rows: Vec<Row>,
}

struct JobRecord {
    request: LoadJobRequest,
    job: LoadJob,
    injected_failure: Option<String>,
}

#[derive(Default)]
struct Faults {
    stream_interruptions: u32,
    insert_failures: u32,
    load_failure: Option<String>,
    stall_load_jobs: bool,
}

#[derive(Default)]
struct State {
    tables: HashMap<TableReference, StoredTable>,
    streams: HashMap<String, StreamState>,
    jobs: HashMap<String, JobRecord>,
    job_order: Vec<String>,
    insert_ids: HashMap<TableReference, HashSet<String>>,
    faults: Faults,
    next_session: u64,
}

/// Warehouse held entirely in memory; clones share state
#[derive(Clone)]
pub struct InMemoryWarehouse {
    state: Arc<RwLock<State>>,
    store: Option<Arc<dyn ObjectStore>>,
    batch_rows: usize,
    default_streams: usize,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            store: None,
            batch_rows: 1024,
            default_streams: 4,
        }
    }

    /// Object store that load jobs read their source files from
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Rows per serialized batch on read streams
    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = rows.max(1);
        self
    }

    /// Streams per read session when the request sets no maximum
    pub fn with_default_streams(mut self, streams: usize) -> Self {
        self.default_streams = streams.max(1);
        self
    }

    pub fn create_table(&self, table: &TableReference, schema: Schema) -> WarehouseResult<()> {
        self.create_table_with_formats(table, schema, DataFormat::ALL.to_vec())
    }

    /// Create a table whose read sessions can only be served in `formats`
    pub fn create_table_with_formats(
        &self,
        table: &TableReference,
        schema: Schema,
        formats: Vec<DataFormat>,
    ) -> WarehouseResult<()> {
        let mut state = self.state.write();
        if state.tables.contains_key(table) {
            return Err(WarehouseError::AlreadyExists(table.to_string()));
        }
        state.tables.insert(
            table.clone(),
            StoredTable {
                info: TableInfo {
                    table: table.clone(),
                    kind: TableKind::Table,
                    schema,
                    read_formats: formats,
                    num_rows: 0,
                },
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Create a view over existing objects. The output schema is derived
    /// from the defining query.
    pub fn create_view(&self, view: &TableReference, query: &str) -> WarehouseResult<()> {
        let parsed = parse(query)?;
        let mut state = self.state.write();
        if state.tables.contains_key(view) {
            return Err(WarehouseError::AlreadyExists(view.to_string()));
        }
        let (schema, _) = execute(&state, &parsed, 0)?;
        state.tables.insert(
            view.clone(),
            StoredTable {
                info: TableInfo {
                    table: view.clone(),
                    kind: TableKind::View {
                        query: query.to_string(),
                    },
                    schema,
                    read_formats: DataFormat::ALL.to_vec(),
                    num_rows: 0,
                },
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append rows outside of any connector path (fixtures, DML)
    pub fn insert(&self, table: &TableReference, rows: Vec<Row>) -> WarehouseResult<()> {
        let mut state = self.state.write();
        let stored = base_table_mut(&mut state, table)?;
        for row in &rows {
            stored
                .info
                .schema
                .validate_row(row)
                .map_err(WarehouseError::InvalidArgument)?;
        }
        stored.rows.extend(rows);
        stored.info.num_rows = stored.rows.len() as u64;
        Ok(())
    }

    pub fn rows(&self, table: &TableReference) -> WarehouseResult<Vec<Row>> {
        let state = self.state.read();
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))
    }

    /// Every load job issued so far, in issue order
    pub fn load_jobs(&self) -> Vec<LoadJob> {
        let state = self.state.read();
        state
            .job_order
            .iter()
            .filter_map(|id| state.jobs.get(id).map(|r| r.job.clone()))
            .collect()
    }

    /// The next `count` calls to `read_rows` are cut off mid-stream
    pub fn interrupt_next_reads(&self, count: u32) {
        self.state.write().faults.stream_interruptions = count;
    }

    /// The next `count` streaming inserts fail transiently
    pub fn fail_next_inserts(&self, count: u32) {
        self.state.write().faults.insert_failures = count;
    }

    /// The next load job issued ends in FAILED with `message`
    pub fn fail_next_load_job(&self, message: impl Into<String>) {
        self.state.write().faults.load_failure = Some(message.into());
    }

    /// Keep load jobs RUNNING forever
    pub fn stall_load_jobs(&self, stall: bool) {
        self.state.write().faults.stall_load_jobs = stall;
    }

    fn run_load(&self, request: &LoadJobRequest, schema: &Schema) -> Result<Vec<Row>, String> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| "no object store is attached to the warehouse".to_string())?;
        let codec = request.format.codec();
        let mut rows = Vec::new();
        for uri in &request.source_uris {
            let bytes = store
                .get(uri)
                .map_err(|e| format!("cannot read source {}: {}", uri, e))?;
            let decoded = codec
                .decode(schema, &bytes)
                .map_err(|e| format!("cannot decode source {}: {}", uri, e))?;
            rows.extend(decoded);
        }
        Ok(rows)
    }
}

fn parse(query: &str) -> WarehouseResult<SelectQuery> {
    SelectQuery::parse(query)
        .map_err(|e| WarehouseError::InvalidArgument(format!("unsupported query: {}", e)))
}

fn base_table_mut<'a>(
    state: &'a mut State,
    table: &TableReference,
) -> WarehouseResult<&'a mut StoredTable> {
    match state.tables.get_mut(table) {
        Some(stored) if stored.info.is_view() => Err(WarehouseError::InvalidArgument(format!(
            "{} is a view",
            table
        ))),
        Some(stored) => Ok(stored),
        None => Err(WarehouseError::NotFound(table.to_string())),
    }
}

fn filter_rows(schema: &Schema, rows: Vec<Row>, predicate: &Predicate) -> WarehouseResult<Vec<Row>> {
    if !predicate.is_resolvable(schema) {
        return Err(WarehouseError::InvalidArgument(format!(
            "unrecognized name in filter: {}",
            predicate
        )));
    }
    Ok(rows
        .into_iter()
        .filter(|row| predicate.matches(schema, row))
        .collect())
}

fn project_rows(
    schema: &Schema,
    rows: Vec<Row>,
    columns: &[String],
) -> WarehouseResult<(Schema, Vec<Row>)> {
    let projected = schema
        .project(columns)
        .map_err(|c| WarehouseError::InvalidArgument(format!("unrecognized name: {}", c)))?;
    let indices: Vec<usize> = columns.iter().filter_map(|c| schema.index_of(c)).collect();
    Ok((projected, rows.iter().map(|r| r.project(&indices)).collect()))
}

fn execute(state: &State, query: &SelectQuery, depth: usize) -> WarehouseResult<(Schema, Vec<Row>)> {
    if depth > MAX_VIEW_DEPTH {
        return Err(WarehouseError::InvalidArgument(
            "views nested too deeply".to_string(),
        ));
    }
    let (schema, rows) = match &query.source {
        QuerySource::Table(table) => {
            let stored = state
                .tables
                .get(table)
                .ok_or_else(|| WarehouseError::NotFound(table.to_string()))?;
            match &stored.info.kind {
                TableKind::View { query } => execute(state, &parse(query)?, depth + 1)?,
                TableKind::Table => (stored.info.schema.clone(), stored.rows.clone()),
            }
        }
        QuerySource::Subquery(inner) => execute(state, inner, depth + 1)?,
    };
    let rows = match &query.filter {
        Some(predicate) => filter_rows(&schema, rows, predicate)?,
        None => rows,
    };
    match &query.projection {
        Projection::All => Ok((schema, rows)),
        Projection::Columns(columns) => project_rows(&schema, rows, columns),
    }
}

/// Split `len` rows into `count` contiguous ranges whose sizes differ by at most one
fn split_ranges(len: usize, count: usize) -> Vec<(usize, usize)> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    let count = count.min(len);
    let base = len / count;
    let extra = len % count;
    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let size = base + usize::from(i < extra);
        ranges.push((start, start + size));
        start += size;
    }
    ranges
}

impl Warehouse for InMemoryWarehouse {
    fn get_table(&self, table: &TableReference) -> WarehouseResult<TableInfo> {
        self.state
            .read()
            .tables
            .get(table)
            .map(|t| t.info.clone())
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))
    }

    fn materialize_query(
        &self,
        query: &str,
        destination: &TableReference,
    ) -> WarehouseResult<TableInfo> {
        let parsed = parse(query)?;
        let mut state = self.state.write();
        let (schema, rows) = execute(&state, &parsed, 0)?;
        let info = TableInfo {
            table: destination.clone(),
            kind: TableKind::Table,
            schema,
            read_formats: DataFormat::ALL.to_vec(),
            num_rows: rows.len() as u64,
        };
        debug!(
            "Materialized {} row(s) into {}",
            info.num_rows, destination
        );
        state.tables.insert(
            destination.clone(),
            StoredTable {
                info: info.clone(),
                rows,
            },
        );
        Ok(info)
    }

    fn create_read_session(&self, request: &ReadSessionRequest) -> WarehouseResult<ReadSession> {
        let mut state = self.state.write();
        let stored = state
            .tables
            .get(&request.table)
            .ok_or_else(|| WarehouseError::NotFound(request.table.to_string()))?;
        if stored.info.is_view() {
            return Err(WarehouseError::InvalidArgument(format!(
                "{} is a view; views must be materialized before they are read",
                request.table
            )));
        }
        if !stored.info.supports_format(request.format) {
            return Err(WarehouseError::InvalidArgument(format!(
                "{} cannot be served as {}",
                request.table, request.format
            )));
        }

        let schema = stored.info.schema.clone();
        let mut rows = stored.rows.clone();
        if let Some(restriction) = &request.row_restriction {
            let predicate = Predicate::parse(restriction).map_err(|e| {
                WarehouseError::InvalidArgument(format!("invalid row restriction: {}", e))
            })?;
            rows = filter_rows(&schema, rows, &predicate)?;
        }
        let (schema, rows) = if request.selected_fields.is_empty() {
            (schema, rows)
        } else {
            project_rows(&schema, rows, &request.selected_fields)?
        };

        state.next_session += 1;
        let session_id = format!("session_{}", state.next_session);
        let stream_count = request.max_stream_count.unwrap_or(self.default_streams);
        let mut streams = Vec::new();
        for (i, (start, end)) in split_ranges(rows.len(), stream_count).into_iter().enumerate() {
            let name = format!("{}/streams/{}", session_id, i);
            state.streams.insert(
                name.clone(),
                StreamState {
                    schema: schema.clone(),
                    format: request.format,
                    rows: rows[start..end].to_vec(),
                },
            );
            streams.push(ReadStream {
                name,
                estimated_rows: (end - start) as u64,
            });
        }
        debug!(
            "Created {} on {} with {} stream(s) over {} row(s)",
            session_id,
            request.table,
            streams.len(),
            rows.len()
        );

        Ok(ReadSession {
            id: session_id,
            table: request.table.clone(),
            schema,
            format: request.format,
            streams,
        })
    }

    fn read_rows(&self, stream: &str, offset: u64) -> WarehouseResult<BatchStream> {
        let mut state = self.state.write();
        let interrupt = if state.faults.stream_interruptions > 0 {
            state.faults.stream_interruptions -= 1;
            true
        } else {
            false
        };
        let stream_state = state
            .streams
            .get(stream)
            .ok_or_else(|| WarehouseError::NotFound(stream.to_string()))?;
        let offset = offset as usize;
        if offset > stream_state.rows.len() {
            return Err(WarehouseError::InvalidArgument(format!(
                "offset {} is beyond the end of {}",
                offset, stream
            )));
        }

        let codec = stream_state.format.codec();
        let mut items = Vec::new();
        for chunk in stream_state.rows[offset..].chunks(self.batch_rows) {
            let data = codec
                .encode(&stream_state.schema, chunk)
                .map_err(|e| WarehouseError::Internal(e.to_string()))?;
            items.push(Ok(SerializedBatch {
                row_count: chunk.len() as u64,
                data,
            }));
        }
        if interrupt {
            // Deliver at most one batch, then cut the connection
            items.truncate(usize::from(items.len() > 1));
            items.push(Err(WarehouseError::Transient(format!(
                "connection reset while reading {}",
                stream
            ))));
        }
        Ok(Box::new(items.into_iter()))
    }

    fn insert_rows(&self, table: &TableReference, rows: &[(String, Row)]) -> WarehouseResult<()> {
        let mut state = self.state.write();
        if state.faults.insert_failures > 0 {
            state.faults.insert_failures -= 1;
            return Err(WarehouseError::Transient(
                "streaming insert backend unavailable".to_string(),
            ));
        }
        let schema = base_table_mut(&mut state, table)?.info.schema.clone();
        for (insert_id, row) in rows {
            schema.validate_row(row).map_err(|e| {
                WarehouseError::InvalidArgument(format!("row {}: {}", insert_id, e))
            })?;
        }

        let seen = state.insert_ids.entry(table.clone()).or_default();
        let fresh: Vec<Row> = rows
            .iter()
            .filter(|(id, _)| seen.insert(id.clone()))
            .map(|(_, row)| row.clone())
            .collect();
        let stored = base_table_mut(&mut state, table)?;
        stored.rows.extend(fresh);
        stored.info.num_rows = stored.rows.len() as u64;
        Ok(())
    }

    fn start_load_job(&self, request: &LoadJobRequest) -> WarehouseResult<LoadJob> {
        let mut state = self.state.write();
        if state.jobs.contains_key(&request.job_id) {
            return Err(WarehouseError::AlreadyExists(format!(
                "job {}",
                request.job_id
            )));
        }
        base_table_mut(&mut state, &request.destination)?;

        let job = LoadJob {
            id: request.job_id.clone(),
            state: LoadJobState::Pending,
            error: None,
            rows_loaded: 0,
        };
        let injected_failure = state.faults.load_failure.take();
        state.jobs.insert(
            request.job_id.clone(),
            JobRecord {
                request: request.clone(),
                job: job.clone(),
                injected_failure,
            },
        );
        state.job_order.push(request.job_id.clone());
        Ok(job)
    }

    fn get_load_job(&self, job_id: &str) -> WarehouseResult<LoadJob> {
        let mut state = self.state.write();
        let stall = state.faults.stall_load_jobs;
        let record = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| WarehouseError::NotFound(format!("job {}", job_id)))?;

        match record.job.state {
            LoadJobState::Pending => {
                record.job.state = LoadJobState::Running;
                return Ok(record.job.clone());
            }
            LoadJobState::Running if stall => return Ok(record.job.clone()),
            LoadJobState::Running => {}
            LoadJobState::Succeeded | LoadJobState::Failed => return Ok(record.job.clone()),
        }

        // Running -> terminal: apply the load atomically
        let request = record.request.clone();
        let injected_failure = record.injected_failure.take();
        let outcome = match injected_failure {
            Some(message) => Err(message),
            None => {
                let schema = base_table_mut(&mut state, &request.destination)
                    .map(|t| t.info.schema.clone())
                    .map_err(|e| e.to_string());
                schema.and_then(|schema| self.run_load(&request, &schema))
            }
        };

        let finished = match outcome {
            Ok(rows) => {
                let loaded = rows.len() as u64;
                let stored = base_table_mut(&mut state, &request.destination)?;
                if request.disposition == WriteDisposition::Truncate {
                    stored.rows.clear();
                }
                stored.rows.extend(rows);
                stored.info.num_rows = stored.rows.len() as u64;
                LoadJob {
                    id: job_id.to_string(),
                    state: LoadJobState::Succeeded,
                    error: None,
                    rows_loaded: loaded,
                }
            }
            Err(message) => LoadJob {
                id: job_id.to_string(),
                state: LoadJobState::Failed,
                error: Some(message),
                rows_loaded: 0,
            },
        };
        if let Some(record) = state.jobs.get_mut(job_id) {
            record.job = finished.clone();
        }
        Ok(finished)
    }
}
