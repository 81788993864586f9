//! Persistence for the saga orchestrator.
//!
//! The repositories are capability traits; [`InMemoryStore`] backs tests and
//! local runs, [`PostgresStore`] backs production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    AgentRepository, ExecutionLedger, OrderRepository, RecordOutcome, SagaStore,
    WorkflowRepository,
};
