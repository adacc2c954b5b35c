// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Read path: planning, view resolution and per-partition decoding

pub mod planner;
pub mod reader;
pub mod view;

pub use planner::{Partition, ReadPlan, ReadPlanner, ReadRequest};
pub use reader::SplitReader;
pub use view::{ResolvedView, ViewDefinition, ViewResolver};
