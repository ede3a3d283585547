//! Catalog queries shared by the reader, the writer and the admin.

use tiberius::Query;
use tracing::debug;

use super::connection::MssqlClient;
use super::dialect::{MssqlDialect, IDENTITY_COLUMNS, LIST_TABLES, TABLE_COLUMNS};
use crate::core::{render_type, ColumnDef, ColumnSchema};
use crate::error::Result;

/// Column schema of `table`, or `None` if the table does not exist.
pub async fn load_table_schema(
    client: &mut MssqlClient,
    table: &str,
) -> Result<Option<ColumnSchema>> {
    let mut query = Query::new(TABLE_COLUMNS);
    query.bind(table);
    let rows = query.query(client).await?.into_first_result().await?;

    if rows.is_empty() {
        debug!("{}: not found", table);
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: &str = row.try_get(0)?.unwrap_or_default();
        let data_type: &str = row.try_get(1)?.unwrap_or_default();
        let max_length: Option<i32> = row.try_get(2)?;
        let precision: Option<i32> = row.try_get(3)?;
        let scale: Option<i32> = row.try_get(4)?;
        let is_nullable = row.try_get::<i32, _>(5)?.unwrap_or(1) == 1;
        let is_identity = row.try_get::<i32, _>(6)?.unwrap_or(0) == 1;
        let is_primary_key = row.try_get::<i32, _>(7)?.unwrap_or(0) == 1;

        columns.push(ColumnDef {
            name: name.to_string(),
            data_type: render_type(data_type, max_length, precision, scale),
            is_nullable,
            is_identity,
            is_primary_key,
        });
    }

    debug!("{}: loaded {} columns", table, columns.len());
    ColumnSchema::new(columns).map(Some)
}

/// Exact row count.
pub async fn count_rows(client: &mut MssqlClient, table: &str) -> Result<i64> {
    let row = client
        .simple_query(MssqlDialect::count_rows(table))
        .await?
        .into_row()
        .await?;
    Ok(match row {
        Some(row) => row.try_get::<i64, _>(0)?.unwrap_or(0),
        None => 0,
    })
}

/// User table names, sorted.
pub async fn list_tables(client: &mut MssqlClient) -> Result<Vec<String>> {
    let rows = client
        .simple_query(LIST_TABLES)
        .await?
        .into_first_result()
        .await?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(name) = row.try_get::<&str, _>(0)? {
            tables.push(name.to_string());
        }
    }
    Ok(tables)
}

/// Whether `table` has an identity column.
pub async fn has_identity_column(client: &mut MssqlClient, table: &str) -> Result<bool> {
    let mut query = Query::new(IDENTITY_COLUMNS);
    query.bind(table);
    let row = query.query(client).await?.into_row().await?;
    Ok(match row {
        Some(row) => row.try_get::<i32, _>(0)?.unwrap_or(0) > 0,
        None => false,
    })
}
