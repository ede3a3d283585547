//! SQL Server target writer.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::ToSql;
use tracing::debug;
use uuid::Uuid;

use super::connection::{build_pool, checkout, ping, MssqlConnection, MssqlPool};
use super::dialect::MssqlDialect;
use super::metadata;
use crate::config::DatabaseConfig;
use crate::core::{
    ColumnSchema, Row, SchemaInspector, SqlNullType, SqlValue, TargetWriter, WriteSession,
};
use crate::error::{CloneError, Result};

/// Applies DDL to the target database and hands out insert sessions.
pub struct MssqlWriter {
    pool: MssqlPool,
}

impl MssqlWriter {
    /// Create a writer with its own connection pool.
    pub async fn new(config: &DatabaseConfig, max_size: u32) -> Result<Self> {
        let pool = build_pool(config, max_size).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SchemaInspector for MssqlWriter {
    async fn table_schema(&self, table: &str) -> Result<Option<ColumnSchema>> {
        let mut conn = checkout(&self.pool, "loading target schema").await?;
        metadata::load_table_schema(&mut conn, table).await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = checkout(&self.pool, "counting target rows").await?;
        metadata::count_rows(&mut conn, table).await
    }

    async fn test_connection(&self) -> Result<()> {
        ping(&self.pool).await
    }
}

#[async_trait]
impl TargetWriter for MssqlWriter {
    async fn has_identity_column(&self, table: &str) -> Result<bool> {
        let mut conn = checkout(&self.pool, "checking identity column").await?;
        metadata::has_identity_column(&mut conn, table).await
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        let mut conn = checkout(&self.pool, "applying DDL").await?;
        debug!("DDL: {}", sql);
        conn.execute(sql, &[]).await?;
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn WriteSession>> {
        let conn = checkout(&self.pool, "opening write session").await?;
        Ok(Box::new(MssqlSession { conn }))
    }
}

/// One pooled connection held for the duration of a batch.
///
/// `SET IDENTITY_INSERT` is connection-scoped, so the toggle and the inserts
/// it covers must run here.
pub struct MssqlSession {
    conn: MssqlConnection,
}

#[async_trait]
impl WriteSession for MssqlSession {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute(sql, &[]).await?;
        Ok(())
    }

    async fn insert_row(&mut self, table: &str, row: &Row) -> Result<()> {
        let sql = MssqlDialect::insert_row(table, row.columns());
        let params: Vec<Box<dyn ToSql>> = row.iter().map(|(_, v)| sql_value_to_sql_param(v)).collect();
        let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        self.conn
            .execute(sql.as_str(), &param_refs)
            .await
            .map_err(|e| CloneError::transfer(table, format!("INSERT: {}", e)))?;
        Ok(())
    }
}

/// Bind a value as a parameter. NULLs keep their type so the server does not
/// have to convert from nvarchar (which fails for varbinary columns).
fn sql_value_to_sql_param(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null(null_type) => typed_null(*null_type),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::I16(i) => Box::new(*i),
        SqlValue::I32(i) => Box::new(*i),
        SqlValue::I64(i) => Box::new(*i),
        SqlValue::F32(f) if f.is_finite() => Box::new(*f),
        SqlValue::F32(_) => Box::new(Option::<f32>::None),
        SqlValue::F64(f) if f.is_finite() => Box::new(*f),
        SqlValue::F64(_) => Box::new(Option::<f64>::None),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Decimal(d) => Box::new(*d),
        SqlValue::DateTime(dt) => Box::new(*dt),
        SqlValue::DateTimeOffset(dto) => Box::new(*dto),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
    }
}

fn typed_null(null_type: SqlNullType) -> Box<dyn ToSql> {
    match null_type {
        SqlNullType::Bool => Box::new(Option::<bool>::None),
        SqlNullType::I16 => Box::new(Option::<i16>::None),
        SqlNullType::I32 => Box::new(Option::<i32>::None),
        SqlNullType::I64 => Box::new(Option::<i64>::None),
        SqlNullType::F32 => Box::new(Option::<f32>::None),
        SqlNullType::F64 => Box::new(Option::<f64>::None),
        SqlNullType::String => Box::new(Option::<String>::None),
        SqlNullType::Bytes => Box::new(Option::<Vec<u8>>::None),
        SqlNullType::Uuid => Box::new(Option::<Uuid>::None),
        SqlNullType::Decimal => Box::new(Option::<Decimal>::None),
        SqlNullType::DateTime => Box::new(Option::<NaiveDateTime>::None),
        SqlNullType::DateTimeOffset => Box::new(Option::<DateTime<FixedOffset>>::None),
        SqlNullType::Date => Box::new(Option::<NaiveDate>::None),
        SqlNullType::Time => Box::new(Option::<NaiveTime>::None),
    }
}
