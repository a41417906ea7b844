//! Shared testing utilities for the cbsched workspace
//!
//! Hand-rolled mocks and builders used by the per-crate test suites.
//! Kept out of the production dependency graph; only dev-dependencies
//! point here.

pub mod builders;
pub mod mocks;

pub use builders::{EndpointBuilder, TaskBuilder};
pub use mocks::{MockQueuePublisher, MockTriggerStore, ScriptedCallbackDispatch};
