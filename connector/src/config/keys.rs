// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Recognized configuration keys
//!
//! Keys are matched case-insensitively; they are stored lower-cased.

pub const PREFIX: &str = "warehouse.";

pub const TABLE: &str = "warehouse.table";
pub const READ_DATA_FORMAT: &str = "warehouse.read.data.format";
pub const WRITE_METHOD: &str = "warehouse.write.method";
pub const STAGING_PATH: &str = "warehouse.staging.path";
pub const VIEWS_ENABLED: &str = "warehouse.views.enabled";
pub const MATERIALIZATION_PROJECT: &str = "warehouse.materialization.project";
pub const MATERIALIZATION_DATASET: &str = "warehouse.materialization.dataset";
pub const EXECUTION_ENGINE: &str = "warehouse.execution.engine";
pub const ENGINE_PARALLELISM: &str = "warehouse.engine.parallelism";
pub const CONNECTION: &str = "warehouse.connection";
pub const READ_MAX_PARALLELISM: &str = "warehouse.read.max.parallelism";
pub const READ_MAX_RETRIES: &str = "warehouse.read.max.retries";
pub const INSERT_BATCH_SIZE: &str = "warehouse.write.insert.batch.size";
pub const WRITE_MAX_RETRIES: &str = "warehouse.write.max.retries";
pub const LOAD_POLL_INTERVAL_MS: &str = "warehouse.load.poll.interval.ms";
pub const LOAD_TIMEOUT_MS: &str = "warehouse.load.timeout.ms";

pub const ALL: [&str; 16] = [
    TABLE,
    READ_DATA_FORMAT,
    WRITE_METHOD,
    STAGING_PATH,
    VIEWS_ENABLED,
    MATERIALIZATION_PROJECT,
    MATERIALIZATION_DATASET,
    EXECUTION_ENGINE,
    ENGINE_PARALLELISM,
    CONNECTION,
    READ_MAX_PARALLELISM,
    READ_MAX_RETRIES,
    INSERT_BATCH_SIZE,
    WRITE_MAX_RETRIES,
    LOAD_POLL_INTERVAL_MS,
    LOAD_TIMEOUT_MS,
];
