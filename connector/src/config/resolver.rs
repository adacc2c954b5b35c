// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Layered option resolution

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::keys;
use crate::error::{ConnectorError, ConnectorResult};
use crate::format::DataFormat;
use crate::types::TableReference;

/// How rows reach the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMethod {
    /// Streaming insert from every task
    Direct,
    /// Stage files in object storage, then one bulk-load job
    Indirect,
}

impl FromStr for WriteMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(WriteMethod::Direct),
            "indirect" => Ok(WriteMethod::Indirect),
            other => Err(format!(
                "unknown write method '{}', expected one of: direct, indirect",
                other
            )),
        }
    }
}

impl fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMethod::Direct => f.write_str("direct"),
            WriteMethod::Indirect => f.write_str("indirect"),
        }
    }
}

/// Execution runtime of the host engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionEngine {
    /// Fixed number of task slots
    MapReduce,
    /// Engine picks parallelism from the split count
    Tez,
}

impl FromStr for ExecutionEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mr" => Ok(ExecutionEngine::MapReduce),
            "tez" => Ok(ExecutionEngine::Tez),
            other => Err(format!(
                "unknown execution engine '{}', expected one of: mr, tez",
                other
            )),
        }
    }
}

impl fmt::Display for ExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionEngine::MapReduce => f.write_str("mr"),
            ExecutionEngine::Tez => f.write_str("tez"),
        }
    }
}

/// Resolved, validated options for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub table: TableReference,
    pub read_format: DataFormat,
    pub write_method: WriteMethod,
    pub staging_root: Option<String>,
    pub views_enabled: bool,
    pub materialization_project: Option<String>,
    pub materialization_dataset: Option<String>,
    pub engine: ExecutionEngine,
    pub engine_parallelism: Option<usize>,
    pub connection: Option<String>,
    pub max_parallelism: Option<usize>,
    pub read_max_retries: u32,
    pub insert_batch_size: usize,
    pub write_max_retries: u32,
    pub load_poll_interval: Duration,
    pub load_timeout: Duration,
}

impl ConnectorConfig {
    pub const DEFAULT_READ_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;
    pub const DEFAULT_WRITE_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_LOAD_POLL_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

    /// Configuration with every optional key at its default
    pub fn for_table(table: TableReference) -> Self {
        Self {
            table,
            read_format: DataFormat::Arrow,
            write_method: WriteMethod::Direct,
            staging_root: None,
            views_enabled: false,
            materialization_project: None,
            materialization_dataset: None,
            engine: ExecutionEngine::MapReduce,
            engine_parallelism: None,
            connection: None,
            max_parallelism: None,
            read_max_retries: Self::DEFAULT_READ_MAX_RETRIES,
            insert_batch_size: Self::DEFAULT_INSERT_BATCH_SIZE,
            write_max_retries: Self::DEFAULT_WRITE_MAX_RETRIES,
            load_poll_interval: Self::DEFAULT_LOAD_POLL_INTERVAL,
            load_timeout: Self::DEFAULT_LOAD_TIMEOUT,
        }
    }

    /// Task slot count when the engine runs a fixed number of tasks
    pub fn fixed_parallelism(&self) -> Option<usize> {
        match self.engine {
            ExecutionEngine::MapReduce => self.engine_parallelism,
            ExecutionEngine::Tez => None,
        }
    }
}

/// Merges option layers into a [`ConnectorConfig`]
pub struct ConfigResolver;

impl ConfigResolver {
    /// Resolve with precedence `overrides` > `connection` > `engine_defaults`.
    /// Fails before any I/O when a required key is missing or a value does
    /// not validate.
    pub fn resolve(
        engine_defaults: &HashMap<String, String>,
        connection: &HashMap<String, String>,
        overrides: &HashMap<String, String>,
    ) -> ConnectorResult<ConnectorConfig> {
        let options = Self::merge(&[engine_defaults, connection, overrides]);
        Self::from_options(&options)
    }

    /// Later layers win. Keys are lower-cased and trimmed; values trimmed.
    pub fn merge(layers: &[&HashMap<String, String>]) -> HashMap<String, String> {
        let mut merged = HashMap::new();
        for layer in layers {
            for (key, value) in layer.iter() {
                merged.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }
        merged
    }

    /// Build a configuration from an already merged, lower-cased map
    pub fn from_options(options: &HashMap<String, String>) -> ConnectorResult<ConnectorConfig> {
        for key in options.keys() {
            if key.starts_with(keys::PREFIX) && !keys::ALL.contains(&key.as_str()) {
                warn!("Ignoring unrecognized option '{}'", key);
            }
        }

        let table_text = options
            .get(keys::TABLE)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing(keys::TABLE))?;
        let table = TableReference::parse(table_text).ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "'{}' must be a fully qualified project.dataset.table, got '{}'",
                keys::TABLE,
                table_text
            ))
        })?;

        let mut config = ConnectorConfig::for_table(table);

        if let Some(value) = options.get(keys::READ_DATA_FORMAT) {
            config.read_format = parse_enum(keys::READ_DATA_FORMAT, value)?;
        }
        if let Some(value) = options.get(keys::WRITE_METHOD) {
            config.write_method = parse_enum(keys::WRITE_METHOD, value)?;
        }
        if let Some(value) = options.get(keys::EXECUTION_ENGINE) {
            config.engine = parse_enum(keys::EXECUTION_ENGINE, value)?;
        }
        if let Some(value) = options.get(keys::VIEWS_ENABLED) {
            config.views_enabled = parse_bool(keys::VIEWS_ENABLED, value)?;
        }

        config.staging_root = non_empty(options, keys::STAGING_PATH);
        config.materialization_project = non_empty(options, keys::MATERIALIZATION_PROJECT);
        config.materialization_dataset = non_empty(options, keys::MATERIALIZATION_DATASET);
        config.connection = non_empty(options, keys::CONNECTION);

        config.engine_parallelism = parse_positive(options, keys::ENGINE_PARALLELISM)?;
        config.max_parallelism = parse_positive(options, keys::READ_MAX_PARALLELISM)?;
        if let Some(size) = parse_positive(options, keys::INSERT_BATCH_SIZE)? {
            config.insert_batch_size = size;
        }
        if let Some(retries) = parse_number::<u32>(options, keys::READ_MAX_RETRIES)? {
            config.read_max_retries = retries;
        }
        if let Some(retries) = parse_number::<u32>(options, keys::WRITE_MAX_RETRIES)? {
            config.write_max_retries = retries;
        }
        if let Some(ms) = parse_number::<u64>(options, keys::LOAD_POLL_INTERVAL_MS)? {
            config.load_poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number::<u64>(options, keys::LOAD_TIMEOUT_MS)? {
            config.load_timeout = Duration::from_millis(ms);
        }

        if config.write_method == WriteMethod::Indirect && config.staging_root.is_none() {
            return Err(ConnectorError::Configuration(format!(
                "'{}' is required when '{}' is indirect",
                keys::STAGING_PATH,
                keys::WRITE_METHOD
            )));
        }

        debug!(
            "Resolved configuration for {}: format={}, write={}, engine={}, views={}",
            config.table,
            config.read_format,
            config.write_method,
            config.engine,
            config.views_enabled
        );
        Ok(config)
    }
}

fn missing(key: &str) -> ConnectorError {
    ConnectorError::Configuration(format!("missing required option '{}'", key))
}

fn non_empty(options: &HashMap<String, String>, key: &str) -> Option<String> {
    options.get(key).filter(|v| !v.is_empty()).cloned()
}

fn parse_enum<T: FromStr<Err = String>>(key: &str, value: &str) -> ConnectorResult<T> {
    value
        .parse()
        .map_err(|e| ConnectorError::Configuration(format!("invalid '{}': {}", key, e)))
}

fn parse_bool(key: &str, value: &str) -> ConnectorResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConnectorError::Configuration(format!(
            "invalid '{}': expected true or false, got '{}'",
            key, value
        ))),
    }
}

fn parse_number<T: FromStr>(
    options: &HashMap<String, String>,
    key: &str,
) -> ConnectorResult<Option<T>> {
    match options.get(key) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            ConnectorError::Configuration(format!(
                "invalid '{}': expected a non-negative integer, got '{}'",
                key, value
            ))
        }),
    }
}

fn parse_positive(options: &HashMap<String, String>, key: &str) -> ConnectorResult<Option<usize>> {
    match parse_number::<usize>(options, key)? {
        Some(0) => Err(ConnectorError::Configuration(format!(
            "'{}' must be greater than zero",
            key
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigResolver::resolve(
            &HashMap::new(),
            &HashMap::new(),
            &map(&[("warehouse.table", "proj.ds.tbl")]),
        )
        .unwrap();
        assert_eq!(config.table, TableReference::new("proj", "ds", "tbl"));
        assert_eq!(config.read_format, DataFormat::Arrow);
        assert_eq!(config.write_method, WriteMethod::Direct);
        assert_eq!(config.engine, ExecutionEngine::MapReduce);
        assert!(!config.views_enabled);
        assert_eq!(config.read_max_retries, 3);
        assert_eq!(config.insert_batch_size, 500);
        assert_eq!(config.load_timeout, Duration::from_secs(21_600));
    }

    #[test]
    fn test_precedence_and_case_insensitivity() {
        let engine = map(&[
            ("warehouse.read.data.format", "avro"),
            ("warehouse.execution.engine", "tez"),
            ("warehouse.views.enabled", "false"),
        ]);
        let connection = map(&[
            ("WAREHOUSE.TABLE", "proj.ds.tbl"),
            ("warehouse.views.enabled", "TRUE"),
            ("warehouse.connection", "conn-1"),
        ]);
        let overrides = map(&[("Warehouse.Read.Data.Format", "ARROW")]);

        let config = ConfigResolver::resolve(&engine, &connection, &overrides).unwrap();
        assert_eq!(config.read_format, DataFormat::Arrow);
        assert_eq!(config.engine, ExecutionEngine::Tez);
        assert!(config.views_enabled);
        assert_eq!(config.connection.as_deref(), Some("conn-1"));
    }

    #[test]
    fn test_missing_table_is_configuration_error() {
        let err = ConfigResolver::resolve(&HashMap::new(), &HashMap::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
        assert!(err.to_string().contains("warehouse.table"));
    }

    #[test]
    fn test_indirect_requires_staging_path() {
        let options = map(&[
            ("warehouse.table", "proj.ds.tbl"),
            ("warehouse.write.method", "indirect"),
        ]);
        let err = ConfigResolver::from_options(&options).unwrap_err();
        assert!(err.to_string().contains("warehouse.staging.path"));

        let mut options = options;
        options.insert("warehouse.staging.path".to_string(), "gs://b/tmp".to_string());
        let config = ConfigResolver::from_options(&options).unwrap();
        assert_eq!(config.staging_root.as_deref(), Some("gs://b/tmp"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        for (key, value) in [
            ("warehouse.read.data.format", "parquet"),
            ("warehouse.execution.engine", "spark"),
            ("warehouse.views.enabled", "yes"),
            ("warehouse.engine.parallelism", "0"),
            ("warehouse.read.max.retries", "-1"),
            ("warehouse.table", "just_a_table"),
        ] {
            let mut options = map(&[("warehouse.table", "proj.ds.tbl")]);
            options.insert(key.to_string(), value.to_string());
            let result = ConfigResolver::from_options(&options);
            assert!(
                matches!(result, Err(ConnectorError::Configuration(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_fixed_parallelism_only_for_mr() {
        let mut config = ConnectorConfig::for_table(TableReference::new("p", "d", "t"));
        config.engine_parallelism = Some(4);
        assert_eq!(config.fixed_parallelism(), Some(4));
        config.engine = ExecutionEngine::Tez;
        assert_eq!(config.fixed_parallelism(), None);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = ConnectorConfig::for_table(TableReference::new("p", "d", "t"));
        let json = serde_json::to_string(&config).unwrap();
        let back: ConnectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
