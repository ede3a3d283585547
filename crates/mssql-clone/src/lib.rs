//! # mssql-clone
//!
//! Table-by-table cloning of one SQL Server database into another.
//!
//! For every selected table the library:
//!
//! - **Reconciles the schema**: creates the destination table when it is
//!   missing, adds missing columns, and warns about type drift
//! - **Copies in pages** with `OFFSET`/`FETCH NEXT`, never holding more than
//!   one page in memory
//! - **Coerces values** the destination would reject (out-of-range dates,
//!   base64-encoded binaries)
//! - **Preserves identity values** with `SET IDENTITY_INSERT`
//! - **Isolates row failures**: a rejected row is counted and skipped
//!
//! Cancellation is cooperative and checked before every page and every row.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_clone::{Config, Replicator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_clone::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let replicator = Replicator::new(config).await?;
//!     let report = replicator.run(&CancellationToken::new()).await?;
//!     println!("Copied {} rows", report.rows_copied);
//!     Ok(())
//! }
//! ```

pub mod coerce;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod transfer;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, CopyConfig, DatabaseConfig};
pub use error::{CloneError, Result};
pub use orchestrator::{HealthCheckResult, ReplicationReport, Replicator, RunStatus, TableReport};
pub use transfer::{
    BatchCopier, CopyStatus, JsonLinesReporter, LogReporter, NoopReporter, ProgressReporter,
    ReplicationOutcome, TransferConfig,
};
pub use verify::{RowCountCheck, VerifyResult};
