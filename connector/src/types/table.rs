// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Warehouse table identity

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `project.dataset.table`, also accepting `project:dataset.table`
static TABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^`?([A-Za-z0-9][A-Za-z0-9_\-]*)[.:]([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_$][A-Za-z0-9_$\-]*)`?$")
        .expect("table reference pattern is valid")
});

/// Identifies one warehouse object (table, view or materialized result)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableReference {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableReference {
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parse a fully qualified reference. Returns `None` when any part is
    /// missing or contains characters the warehouse does not allow.
    pub fn parse(text: &str) -> Option<Self> {
        let captures = TABLE_REFERENCE.captures(text.trim())?;
        Some(Self::new(&captures[1], &captures[2], &captures[3]))
    }

    /// Same project and dataset, different table name
    pub fn sibling(&self, table: impl Into<String>) -> Self {
        Self::new(self.project.clone(), self.dataset.clone(), table)
    }

    /// Backtick-quoted form used inside warehouse SQL
    pub fn quoted(&self) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_and_colon_forms() {
        let dotted = TableReference::parse("my-project.sales.orders").unwrap();
        assert_eq!(dotted, TableReference::new("my-project", "sales", "orders"));

        let colon = TableReference::parse("my-project:sales.orders").unwrap();
        assert_eq!(colon, dotted);

        let quoted = TableReference::parse("`my-project.sales.orders`").unwrap();
        assert_eq!(quoted, dotted);
    }

    #[test]
    fn test_parse_rejects_partial_references() {
        assert!(TableReference::parse("sales.orders").is_none());
        assert!(TableReference::parse("").is_none());
        assert!(TableReference::parse("p.d.t.extra").is_none());
    }

    #[test]
    fn test_display_and_quoted() {
        let table = TableReference::new("p", "d", "t");
        assert_eq!(table.to_string(), "p.d.t");
        assert_eq!(table.quoted(), "`p.d.t`");
        assert_eq!(table.sibling("other").to_string(), "p.d.other");
    }
}
