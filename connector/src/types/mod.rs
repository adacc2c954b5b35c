// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Core value types shared by the read and write paths

pub mod table;
pub mod value;

pub use table::TableReference;
pub use value::{Field, FieldType, Row, Schema, Value};
