//! Statement execution
//!
//! The asynchronous execution API, its connection-pool backed implementation
//! and the tracker every generated statement passes through.

pub mod api;
pub mod postgres;
pub mod tracker;

#[cfg(test)]
pub mod fake;

pub use api::{StatementApi, StatementResult, WarehouseSession};
pub use postgres::PostgresStatementApi;
pub use tracker::AsyncStatementTracker;
