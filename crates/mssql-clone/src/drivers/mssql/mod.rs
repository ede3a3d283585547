//! Microsoft SQL Server driver.
//!
//! - [`MssqlReader`]: source-side metadata and paged reads
//! - [`MssqlWriter`]: target-side DDL and insert sessions
//! - [`MssqlAdmin`]: database create/drop against `master`
//! - [`MssqlDialect`]: T-SQL builders shared by all three

mod admin;
mod connection;
mod dialect;
mod metadata;
mod reader;
mod writer;

pub use admin::MssqlAdmin;
pub use connection::MssqlPool;
pub use dialect::MssqlDialect;
pub use reader::MssqlReader;
pub use writer::{MssqlSession, MssqlWriter};
