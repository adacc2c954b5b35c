// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Warehouse SQL fragments the connector has to understand
//!
//! Two inputs reach the connector as text: the filter the engine wants
//! applied to a scan, and the defining query of a view. Both are parsed
//! into small ASTs so filters can be sent to the warehouse as row
//! restrictions or substituted into a view's query.

pub mod lexer;
pub mod parser;
pub mod predicate;
pub mod query;

use thiserror::Error;

pub use predicate::{CompareOp, Predicate};
pub use query::{Projection, QuerySource, SelectQuery};

/// Lexing and parsing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    #[error("Lexer error at '{0}'")]
    LexerError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unexpected trailing input: {0}")]
    TrailingInput(String),
}

pub type SqlResult<T> = Result<T, SqlError>;
