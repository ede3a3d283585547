//! Endpoint traits used by the replication engine.
//!
//! - [`SchemaInspector`]: metadata and counts, shared by both endpoints
//! - [`SourceReader`]: table listing and paged reads from the source
//! - [`TargetWriter`]: DDL, identity detection and write sessions on the target
//! - [`DatabaseAdmin`]: database-level exists/create/drop
//!
//! The SQL Server implementations live in `drivers::mssql`; the copy engine
//! only sees these traits.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::ColumnSchema;
use super::value::{Batch, Row};

/// Read-only metadata queries against one database.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    /// Read the column set of a table.
    ///
    /// `Ok(None)` means the table does not exist; callers branch on it
    /// (skip on the source, create on the target).
    async fn table_schema(&self, table: &str) -> Result<Option<ColumnSchema>>;

    /// Exact row count of a table (`SELECT COUNT_BIG(*)`).
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Round-trip a trivial query to prove the endpoint is reachable.
    async fn test_connection(&self) -> Result<()>;
}

/// Source side of a copy.
#[async_trait]
pub trait SourceReader: SchemaInspector {
    /// User table names, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Fetch one page of rows.
    ///
    /// Rows come back in a fixed order that is stable between calls with the
    /// same `schema`, so consecutive offsets never overlap or skip rows.
    /// Each call uses its own pooled connection.
    async fn read_page(
        &self,
        table: &str,
        schema: &ColumnSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Batch>;
}

/// Target side of a copy.
#[async_trait]
pub trait TargetWriter: SchemaInspector {
    /// Whether the table has an IDENTITY column.
    async fn has_identity_column(&self, table: &str) -> Result<bool>;

    /// Execute a single DDL statement.
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// Open a write session bound to one connection.
    ///
    /// Session-scoped settings such as `IDENTITY_INSERT` only apply to the
    /// statements issued through the same session.
    async fn open_session(&self) -> Result<Box<dyn WriteSession>>;
}

/// A connection-scoped sequence of writes.
#[async_trait]
pub trait WriteSession: Send {
    /// Execute a statement without parameters.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Insert one row using the row's own column list.
    async fn insert_row(&mut self, table: &str, row: &Row) -> Result<()>;
}

/// Database-level administration on a server.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Whether a database with this name exists.
    async fn database_exists(&self, database: &str) -> Result<bool>;

    /// Create the database. Returns `false` if it already existed.
    async fn create_database(&self, database: &str) -> Result<bool>;

    /// Drop the database, disconnecting other sessions first.
    /// Returns `false` if it did not exist.
    async fn drop_database(&self, database: &str) -> Result<bool>;
}
