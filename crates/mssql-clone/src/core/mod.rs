//! Core abstractions shared by the engine and the drivers.
//!
//! - [`identifier`]: T-SQL identifier quoting
//! - [`schema`]: column metadata snapshots
//! - [`value`]: dynamically typed cells and rows
//! - [`traits`]: endpoint traits implemented by `drivers::mssql`

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::{quote_ident, validate_identifier};
pub use schema::{base_type_name, render_type, ColumnDef, ColumnSchema};
pub use traits::{DatabaseAdmin, SchemaInspector, SourceReader, TargetWriter, WriteSession};
pub use value::{Batch, Row, SqlNullType, SqlValue};
