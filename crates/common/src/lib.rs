//! Shared types for the saga workflow orchestrator.

pub mod types;

pub use types::OrderId;
