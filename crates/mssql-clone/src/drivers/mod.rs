//! Database driver implementations of the endpoint traits in [`crate::core`].
//!
//! Only SQL Server is supported: the source and the target are both
//! SQL Server databases.

pub mod mssql;

pub use mssql::{MssqlAdmin, MssqlDialect, MssqlReader, MssqlWriter};
