// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Minimal `SELECT` AST used for view definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use super::parser::parse_query;
use super::predicate::Predicate;
use super::SqlResult;
use crate::types::TableReference;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QuerySource {
    Table(TableReference),
    Subquery(Box<SelectQuery>),
}

/// `SELECT <projection> FROM <source> [WHERE <filter>]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub projection: Projection,
    pub source: QuerySource,
    pub filter: Option<Predicate>,
}

impl SelectQuery {
    pub fn parse(text: &str) -> SqlResult<Self> {
        parse_query(text)
    }

    /// `SELECT * FROM <table>`
    pub fn scan(table: TableReference) -> Self {
        Self {
            projection: Projection::All,
            source: QuerySource::Table(table),
            filter: None,
        }
    }

    /// Wrap this query as a subquery filtered by `predicate`. The inner
    /// query text is kept intact so the warehouse sees the view unchanged.
    pub fn filtered(self, predicate: Predicate) -> Self {
        Self {
            projection: Projection::All,
            source: QuerySource::Subquery(Box::new(self)),
            filter: Some(predicate),
        }
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        match &self.projection {
            Projection::All => f.write_str("*")?,
            Projection::Columns(columns) => {
                let quoted: Vec<String> = columns.iter().map(|c| format!("`{}`", c)).collect();
                f.write_str(&quoted.join(", "))?;
            }
        }
        match &self.source {
            QuerySource::Table(table) => write!(f, " FROM {}", table.quoted())?,
            QuerySource::Subquery(inner) => write!(f, " FROM ({})", inner)?,
        }
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {}", filter)?;
        }
        Ok(())
    }
}
