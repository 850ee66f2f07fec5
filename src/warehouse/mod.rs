//! Warehouse connection abstraction.
//!
//! The pipeline only needs two things from the warehouse: run a statement to
//! completion, and read back a single count. Keeping that behind a trait lets
//! the stages run against a recording double in tests and against Redshift
//! (or PostgreSQL) through [`PgWarehouse`] in production.

pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;

pub use postgres::PgWarehouse;

/// A SQL endpoint the pipeline exclusively owns for one run.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Execute `sql` and wait for the server to acknowledge completion.
    ///
    /// Each call is committed on its own. Returns the number of rows the
    /// statement reported as affected, or 0 for DDL.
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Run a query returning a single integer in its first row and column.
    async fn query_scalar(&self, sql: &str) -> Result<i64>;
}
