//! SQL Server source reader.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{Query, Row as TdsRow};
use tracing::debug;
use uuid::Uuid;

use super::connection::{build_pool, checkout, ping, MssqlPool};
use super::dialect::MssqlDialect;
use super::metadata;
use crate::config::DatabaseConfig;
use crate::core::{
    Batch, ColumnSchema, Row, SchemaInspector, SourceReader, SqlNullType, SqlValue,
};
use crate::error::Result;

/// Reads schema metadata and ordered pages of rows from the source database.
pub struct MssqlReader {
    pool: MssqlPool,
}

impl MssqlReader {
    /// Create a reader with its own connection pool.
    pub async fn new(config: &DatabaseConfig, max_size: u32) -> Result<Self> {
        let pool = build_pool(config, max_size).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SchemaInspector for MssqlReader {
    async fn table_schema(&self, table: &str) -> Result<Option<ColumnSchema>> {
        let mut conn = checkout(&self.pool, "loading source schema").await?;
        metadata::load_table_schema(&mut conn, table).await
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = checkout(&self.pool, "counting source rows").await?;
        metadata::count_rows(&mut conn, table).await
    }

    async fn test_connection(&self) -> Result<()> {
        ping(&self.pool).await
    }
}

#[async_trait]
impl SourceReader for MssqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = checkout(&self.pool, "listing source tables").await?;
        metadata::list_tables(&mut conn).await
    }

    async fn read_page(
        &self,
        table: &str,
        schema: &ColumnSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Batch> {
        let sql = MssqlDialect::select_page(table, schema);
        let mut conn = checkout(&self.pool, "reading source page").await?;

        let mut query = Query::new(sql);
        query.bind(offset);
        query.bind(limit as i64);
        let rows = query.query(&mut conn).await?.into_first_result().await?;

        let mut batch = Vec::with_capacity(rows.len());
        for tds_row in &rows {
            batch.push(convert_row(tds_row, schema)?);
        }

        debug!(
            "{}: fetched {} rows at offset {}",
            table,
            batch.len(),
            offset
        );
        Ok(batch)
    }
}

/// Convert one result row using the declared type of each column.
fn convert_row(tds_row: &TdsRow, schema: &ColumnSchema) -> Result<Row> {
    let mut row = Row::with_capacity(tds_row.len());
    for (idx, column) in tds_row.columns().iter().enumerate() {
        let base_type = schema
            .get(column.name())
            .map(|c| c.base_type())
            .unwrap_or_default();
        let value = convert_value(tds_row, idx, &base_type)?;
        row.set(column.name(), value);
    }
    Ok(row)
}

fn convert_value(row: &TdsRow, idx: usize, base_type: &str) -> Result<SqlValue> {
    let value = match base_type {
        "bit" => row
            .try_get::<bool, _>(idx)?
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
        "tinyint" => row
            .try_get::<u8, _>(idx)?
            .map(|v| SqlValue::I16(v as i16))
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "smallint" => row
            .try_get::<i16, _>(idx)?
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "int" => row
            .try_get::<i32, _>(idx)?
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null(SqlNullType::I32)),
        "bigint" => row
            .try_get::<i64, _>(idx)?
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        "real" => row
            .try_get::<f32, _>(idx)?
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        "float" => row
            .try_get::<f64, _>(idx)?
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        "decimal" | "numeric" => row
            .try_get::<rust_decimal::Decimal, _>(idx)?
            .map(SqlValue::Decimal)
            .unwrap_or(SqlValue::Null(SqlNullType::Decimal)),
        // Money arrives as a float on the wire
        "money" | "smallmoney" => match row.try_get::<f64, _>(idx)? {
            Some(f) => rust_decimal::Decimal::try_from(f)
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::F64(f)),
            None => SqlValue::Null(SqlNullType::Decimal),
        },
        "uniqueidentifier" => row
            .try_get::<Uuid, _>(idx)?
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
        "datetime" | "datetime2" | "smalldatetime" => row
            .try_get::<NaiveDateTime, _>(idx)?
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        "datetimeoffset" => row
            .try_get::<DateTime<FixedOffset>, _>(idx)?
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        "date" => row
            .try_get::<NaiveDate, _>(idx)?
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        "time" => row
            .try_get::<NaiveTime, _>(idx)?
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .try_get::<&[u8], _>(idx)?
            .map(|v| SqlValue::Bytes(v.to_vec()))
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        "xml" => row
            .try_get::<&tiberius::xml::XmlData, _>(idx)?
            .map(|x| SqlValue::Text(x.as_ref().to_string()))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
        _ => match row.try_get::<&str, _>(idx) {
            Ok(v) => v
                .map(|s| SqlValue::Text(s.to_string()))
                .unwrap_or(SqlValue::Null(SqlNullType::String)),
            // CLR types (hierarchyid, geography) come back as raw bytes
            Err(_) => row
                .try_get::<&[u8], _>(idx)?
                .map(|v| SqlValue::Bytes(v.to_vec()))
                .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        },
    };
    Ok(value)
}
