//! T-SQL text for every statement the driver issues.
//!
//! Identifiers are bracket-quoted; values are always bound as `@P1..@Pn`.

use crate::core::{quote_ident, ColumnSchema};

/// User tables in the login's default schema, sorted by name.
pub const LIST_TABLES: &str = r#"
    SELECT t.name
    FROM sys.tables t
    WHERE t.is_ms_shipped = 0
      AND t.schema_id = SCHEMA_ID()
    ORDER BY t.name
"#;

/// Columns of one table (`@P1` = table name) in declaration order.
///
/// Yields no rows when the table does not exist.
pub const TABLE_COLUMNS: &str = r#"
    SELECT
        c.COLUMN_NAME,
        c.DATA_TYPE,
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS INT),
        CAST(c.NUMERIC_PRECISION AS INT),
        CAST(COALESCE(c.NUMERIC_SCALE, c.DATETIME_PRECISION) AS INT),
        CAST(CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS INT),
        CAST(ISNULL(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)),
            c.COLUMN_NAME, 'IsIdentity'), 0) AS INT),
        CAST(CASE WHEN pk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS INT)
    FROM INFORMATION_SCHEMA.COLUMNS c
    LEFT JOIN (
        SELECT ku.TABLE_SCHEMA, ku.TABLE_NAME, ku.COLUMN_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
            ON ku.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
            AND ku.TABLE_SCHEMA = tc.TABLE_SCHEMA
            AND ku.TABLE_NAME = tc.TABLE_NAME
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
    ) pk
        ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND pk.TABLE_NAME = c.TABLE_NAME
        AND pk.COLUMN_NAME = c.COLUMN_NAME
    WHERE c.TABLE_NAME = @P1
      AND c.TABLE_SCHEMA = SCHEMA_NAME()
    ORDER BY c.ORDINAL_POSITION
"#;

/// Number of identity columns on a table (`@P1` = table name).
pub const IDENTITY_COLUMNS: &str = r#"
    SELECT COUNT(*)
    FROM sys.columns c
    INNER JOIN sys.tables t ON c.object_id = t.object_id
    WHERE t.name = @P1
      AND t.schema_id = SCHEMA_ID()
      AND c.is_identity = 1
"#;

/// Whether a database exists (`@P1` = database name).
pub const DATABASE_EXISTS: &str = "SELECT COUNT(*) FROM sys.databases WHERE name = @P1";

/// Stateless T-SQL builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Exact row count.
    pub fn count_rows(table: &str) -> String {
        format!("SELECT COUNT_BIG(*) FROM {}", quote_ident(table))
    }

    /// Ordering expression that stays fixed for a given schema: the primary
    /// key columns when there are any, otherwise `(SELECT NULL)`.
    pub fn page_order(schema: &ColumnSchema) -> String {
        let pk = schema.primary_key();
        if pk.is_empty() {
            "(SELECT NULL)".to_string()
        } else {
            pk.iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }

    /// One page of rows; `@P1` = offset, `@P2` = page size.
    pub fn select_page(table: &str, schema: &ColumnSchema) -> String {
        let columns = if schema.is_empty() {
            "*".to_string()
        } else {
            schema
                .names()
                .map(quote_ident)
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "SELECT {} FROM {} ORDER BY {} OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY",
            columns,
            quote_ident(table),
            Self::page_order(schema)
        )
    }

    /// Single-row insert with one placeholder per column.
    pub fn insert_row<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> String {
        let columns: Vec<String> = columns.into_iter().map(quote_ident).collect();
        if columns.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table));
        }
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("@P{}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    pub fn create_database(database: &str) -> String {
        format!("CREATE DATABASE {}", quote_ident(database))
    }

    /// Kick other sessions off, then drop.
    pub fn drop_database(database: &str) -> String {
        let db = quote_ident(database);
        format!(
            "ALTER DATABASE {db} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; DROP DATABASE {db}",
            db = db
        )
    }
}
