// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! View expansion, policy and predicate pushdown
//!
//! Read sessions cannot be opened on a view directly. A view is expanded to
//! its defining query, the caller's filter is substituted into that query
//! when possible, and the result is materialized into a table that the
//! read planner then treats like any other.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::sql::{Predicate, SelectQuery};
use crate::types::TableReference;
use crate::warehouse::{TableInfo, Warehouse};

/// Digest bytes kept in materialized table names
const MATERIALIZED_NAME_BYTES: usize = 16;

/// A view expanded for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub view: TableReference,
    /// Defining query as stored by the warehouse
    pub query: String,
    /// Filter substituted into the query, if pushdown succeeded
    pub pushed_predicate: Option<Predicate>,
    /// Query text sent to the warehouse
    pub expanded_query: String,
}

/// Outcome of resolving a view reference
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedView {
    pub definition: ViewDefinition,
    /// Filter the engine still has to apply itself
    pub residual: Option<Predicate>,
    /// Table holding the view's (filtered) contents
    pub materialized: TableInfo,
}

pub struct ViewResolver<'a> {
    warehouse: &'a dyn Warehouse,
    config: &'a ConnectorConfig,
}

impl<'a> ViewResolver<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, config: &'a ConnectorConfig) -> Self {
        Self { warehouse, config }
    }

    /// Fails with [`ConnectorError::ViewsDisabled`] unless views are enabled
    pub fn ensure_enabled(config: &ConnectorConfig, view: &TableReference) -> ConnectorResult<()> {
        if config.views_enabled {
            Ok(())
        } else {
            Err(ConnectorError::ViewsDisabled {
                table: view.to_string(),
            })
        }
    }

    /// Expand and materialize `view`
    pub fn resolve(
        &self,
        view: &TableInfo,
        predicate: Option<&Predicate>,
    ) -> ConnectorResult<ResolvedView> {
        Self::ensure_enabled(self.config, &view.table)?;
        let (definition, residual) = self.expand(view, predicate)?;

        let target = self.materialization_target(&view.table, &definition.expanded_query);
        let materialized = self
            .warehouse
            .materialize_query(&definition.expanded_query, &target)
            .map_err(|e| {
                ConnectorError::Planning(format!("cannot materialize view {}: {}", view.table, e))
            })?;
        info!(
            "Materialized view {} into {} ({} row(s))",
            view.table, target, materialized.num_rows
        );

        Ok(ResolvedView {
            definition,
            residual,
            materialized,
        })
    }

    /// Substitute `predicate` into the view's query. Pushdown is skipped,
    /// and the predicate returned as residual, when the query text is
    /// outside the supported subset or the predicate names columns the view
    /// does not expose.
    pub fn expand(
        &self,
        view: &TableInfo,
        predicate: Option<&Predicate>,
    ) -> ConnectorResult<(ViewDefinition, Option<Predicate>)> {
        let query = view.view_query().ok_or_else(|| {
            ConnectorError::Planning(format!("{} is not a view", view.table))
        })?;

        let mut definition = ViewDefinition {
            view: view.table.clone(),
            query: query.to_string(),
            pushed_predicate: None,
            expanded_query: query.to_string(),
        };
        let Some(predicate) = predicate else {
            return Ok((definition, None));
        };

        if !predicate.is_resolvable(&view.schema) {
            debug!(
                "Not pushing filter into view {}: it references columns outside the view",
                view.table
            );
            return Ok((definition, Some(predicate.clone())));
        }
        match SelectQuery::parse(query) {
            Ok(parsed) => {
                definition.expanded_query = parsed.filtered(predicate.clone()).to_string();
                definition.pushed_predicate = Some(predicate.clone());
                debug!(
                    "Pushed filter into view {}: {}",
                    view.table, definition.expanded_query
                );
                Ok((definition, None))
            }
            Err(e) => {
                debug!(
                    "Not pushing filter into view {}: cannot rewrite its query ({})",
                    view.table, e
                );
                Ok((definition, Some(predicate.clone())))
            }
        }
    }

    /// Deterministic table for a given expanded query, named after the
    /// first 128 bits of its SHA-256. Nothing drops these tables; expiring
    /// them is left to the warehouse (dataset default table expiration).
    pub fn materialization_target(&self, view: &TableReference, query: &str) -> TableReference {
        let project = self
            .config
            .materialization_project
            .clone()
            .unwrap_or_else(|| view.project.clone());
        let dataset = self
            .config
            .materialization_dataset
            .clone()
            .unwrap_or_else(|| view.dataset.clone());
        let digest = Sha256::digest(query.as_bytes());
        let name: String = digest[..MATERIALIZED_NAME_BYTES]
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect();
        TableReference::new(project, dataset, format!("_view_{}", name))
    }
}
