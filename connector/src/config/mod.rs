// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Connector configuration
//!
//! Options arrive as three string maps (engine defaults, connection
//! properties, per-query overrides) and are resolved once into an
//! immutable [`ConnectorConfig`] shared by every task of a query.

pub mod keys;
pub mod resolver;

pub use resolver::{ConfigResolver, ConnectorConfig, ExecutionEngine, WriteMethod};
