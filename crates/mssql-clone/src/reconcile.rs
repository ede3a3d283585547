//! Schema comparison and additive DDL generation.
//!
//! The reconciler only ever adds: it creates missing tables and adds missing
//! columns. Columns that exist on both sides with different types are
//! reported as [`ColumnDrift`] and left alone.

use serde::Serialize;

use crate::core::{quote_ident, ColumnDef, ColumnSchema};

/// A column whose declared type differs between source and destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDrift {
    pub column: String,
    pub source_type: String,
    pub destination_type: String,
}

/// Same column names (case-insensitive) with the same declared types
/// (case-sensitive).
pub fn schemas_equal(a: &ColumnSchema, b: &ColumnSchema) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|col| b.type_of(&col.name) == Some(col.data_type.as_str()))
}

/// `CREATE TABLE` for the whole schema, columns in declaration order.
pub fn generate_create_table(schema: &ColumnSchema, table: &str) -> String {
    let columns: Vec<String> = schema.iter().map(column_definition).collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(table),
        columns.join(", ")
    )
}

/// One `ALTER TABLE ... ADD` per source column missing from the destination,
/// in source declaration order.
pub fn generate_alter_table(
    source: &ColumnSchema,
    destination: &ColumnSchema,
    table: &str,
) -> Vec<String> {
    source
        .iter()
        .filter(|col| !destination.contains(&col.name))
        .map(|col| {
            format!(
                "ALTER TABLE {} ADD {}",
                quote_ident(table),
                column_definition(col)
            )
        })
        .collect()
}

/// Columns present on both sides whose types differ.
pub fn type_drift(source: &ColumnSchema, destination: &ColumnSchema) -> Vec<ColumnDrift> {
    source
        .iter()
        .filter_map(|col| {
            let dst_type = destination.type_of(&col.name)?;
            (dst_type != col.data_type).then(|| ColumnDrift {
                column: col.name.clone(),
                source_type: col.data_type.clone(),
                destination_type: dst_type.to_string(),
            })
        })
        .collect()
}

fn column_definition(col: &ColumnDef) -> String {
    let mut def = format!("{} {}", quote_ident(&col.name), col.data_type);
    if col.is_identity {
        def.push_str(" IDENTITY(1,1)");
    }
    if !col.is_nullable {
        def.push_str(" NOT NULL");
    }
    def
}
