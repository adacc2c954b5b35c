//! Test utilities for connector integration tests
//!
//! `EngineFixture` plays the host engine: it resolves options, plans, runs
//! every split or task in turn and drives commit and abort through the
//! public `Connector` API only.

pub mod engine_fixture;
