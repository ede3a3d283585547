//! In-memory source, target and admin used by unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::core::{
    Batch, ColumnSchema, DatabaseAdmin, Row, SchemaInspector, SourceReader, SqlValue,
    TargetWriter, WriteSession,
};
use crate::error::{CloneError, Result};

fn key(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Default)]
struct SourceTable {
    name: String,
    schema: ColumnSchema,
    rows: Vec<Row>,
    row_count: Option<i64>,
    fail_page: Option<usize>,
}

/// Source with fixed tables; records every page request.
#[derive(Default)]
pub struct FakeSource {
    tables: BTreeMap<String, SourceTable>,
    pages: Mutex<Vec<(String, i64, usize, usize)>>,
    unreachable: bool,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, schema: ColumnSchema, rows: Vec<Row>) -> Self {
        self.tables.insert(
            key(name),
            SourceTable {
                name: name.to_string(),
                schema,
                rows,
                ..Default::default()
            },
        );
        self
    }

    /// Report a row count that differs from the stored rows.
    pub fn with_row_count(mut self, name: &str, count: i64) -> Self {
        if let Some(t) = self.tables.get_mut(&key(name)) {
            t.row_count = Some(count);
        }
        self
    }

    /// Make the n-th page request (1-based) for a table fail.
    pub fn fail_page(mut self, name: &str, page: usize) -> Self {
        if let Some(t) = self.tables.get_mut(&key(name)) {
            t.fail_page = Some(page);
        }
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// `(offset, limit)` of every page requested for a table.
    pub fn page_requests(&self, table: &str) -> Vec<(i64, usize)> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, ..)| t.eq_ignore_ascii_case(table))
            .map(|(_, offset, limit, _)| (*offset, *limit))
            .collect()
    }

    /// Number of rows returned by each page request.
    pub fn page_sizes(&self, table: &str) -> Vec<usize> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, ..)| t.eq_ignore_ascii_case(table))
            .map(|(.., returned)| *returned)
            .collect()
    }
}

#[async_trait]
impl SchemaInspector for FakeSource {
    async fn table_schema(&self, table: &str) -> Result<Option<ColumnSchema>> {
        Ok(self.tables.get(&key(table)).map(|t| t.schema.clone()))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let t = self
            .tables
            .get(&key(table))
            .ok_or_else(|| CloneError::Schema(format!("no table {}", table)))?;
        Ok(t.row_count.unwrap_or(t.rows.len() as i64))
    }

    async fn test_connection(&self) -> Result<()> {
        if self.unreachable {
            return Err(CloneError::pool("connection refused", "fake source"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.values().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn read_page(
        &self,
        table: &str,
        _schema: &ColumnSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Batch> {
        let t = self
            .tables
            .get(&key(table))
            .ok_or_else(|| CloneError::Schema(format!("no table {}", table)))?;

        let mut pages = self.pages.lock().unwrap();
        let request = pages
            .iter()
            .filter(|(name, ..)| name.eq_ignore_ascii_case(table))
            .count()
            + 1;
        if t.fail_page == Some(request) {
            pages.push((t.name.clone(), offset, limit, 0));
            return Err(CloneError::transfer(table, "simulated fetch failure"));
        }

        let rows: Batch = t
            .rows
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit)
            .cloned()
            .collect();
        pages.push((t.name.clone(), offset, limit, rows.len()));
        Ok(rows)
    }
}

/// Something the fake target was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Ddl(String),
    Execute(String),
    Insert { table: String, row: Row },
}

#[derive(Default)]
struct TargetState {
    statements: Vec<Statement>,
    sessions: usize,
    live_sessions: usize,
}

/// Target that records statements and never touches real tables.
#[derive(Default)]
pub struct FakeTarget {
    schemas: BTreeMap<String, ColumnSchema>,
    identity: HashSet<String>,
    preexisting_rows: BTreeMap<String, i64>,
    failures: Vec<(String, SqlValue)>,
    failing_ddl: Vec<String>,
    single_connection: bool,
    state: Arc<Mutex<TargetState>>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, schema: ColumnSchema) -> Self {
        self.schemas.insert(key(name), schema);
        self
    }

    pub fn with_identity(mut self, name: &str) -> Self {
        self.identity.insert(key(name));
        self
    }

    pub fn with_existing_rows(mut self, name: &str, rows: i64) -> Self {
        self.preexisting_rows.insert(key(name), rows);
        self
    }

    /// Reject inserts whose `column` holds `value`.
    pub fn fail_when(mut self, column: &str, value: SqlValue) -> Self {
        self.failures.push((column.to_string(), value));
        self
    }

    /// Reject DDL statements containing `fragment`.
    pub fn fail_ddl_containing(mut self, fragment: &str) -> Self {
        self.failing_ddl.push(fragment.to_string());
        self
    }

    /// Behave like a pool of one: other calls fail while a session is open.
    pub fn single_connection(mut self) -> Self {
        self.single_connection = true;
        self
    }

    fn checkout(&self, context: &str) -> Result<()> {
        if self.single_connection && self.state.lock().unwrap().live_sessions > 0 {
            return Err(CloneError::pool("timed out waiting for connection", context));
        }
        Ok(())
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter_map(|s| match s {
                Statement::Ddl(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    pub fn inserted_rows(&self, table: &str) -> Vec<Row> {
        self.statements()
            .into_iter()
            .filter_map(|s| match s {
                Statement::Insert { table: t, row } if t.eq_ignore_ascii_case(table) => Some(row),
                _ => None,
            })
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.lock().unwrap().sessions
    }

    /// A session without going through the trait object.
    pub fn open_fake_session(&self) -> FakeSession {
        let mut state = self.state.lock().unwrap();
        state.sessions += 1;
        state.live_sessions += 1;
        drop(state);
        FakeSession {
            failures: self.failures.clone(),
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl SchemaInspector for FakeTarget {
    async fn table_schema(&self, table: &str) -> Result<Option<ColumnSchema>> {
        self.checkout("loading target schema")?;
        Ok(self.schemas.get(&key(table)).cloned())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.checkout("counting target rows")?;
        let existing = self.preexisting_rows.get(&key(table)).copied().unwrap_or(0);
        Ok(existing + self.inserted_rows(table).len() as i64)
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl TargetWriter for FakeTarget {
    async fn has_identity_column(&self, table: &str) -> Result<bool> {
        self.checkout("checking identity column")?;
        Ok(self.identity.contains(&key(table)))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.checkout("applying DDL")?;
        if self.failing_ddl.iter().any(|f| sql.contains(f.as_str())) {
            return Err(CloneError::Schema(format!("simulated DDL failure: {}", sql)));
        }
        self.state
            .lock()
            .unwrap()
            .statements
            .push(Statement::Ddl(sql.to_string()));
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn WriteSession>> {
        self.checkout("opening write session")?;
        Ok(Box::new(self.open_fake_session()))
    }
}

pub struct FakeSession {
    failures: Vec<(String, SqlValue)>,
    state: Arc<Mutex<TargetState>>,
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.live_sessions -= 1;
        }
    }
}

#[async_trait]
impl WriteSession for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .statements
            .push(Statement::Execute(sql.to_string()));
        Ok(())
    }

    async fn insert_row(&mut self, table: &str, row: &Row) -> Result<()> {
        if self
            .failures
            .iter()
            .any(|(column, value)| row.get(column) == Some(value))
        {
            return Err(CloneError::transfer(table, "simulated constraint violation"));
        }
        self.state.lock().unwrap().statements.push(Statement::Insert {
            table: table.to_string(),
            row: row.clone(),
        });
        Ok(())
    }
}

/// Admin that tracks database names in memory.
#[derive(Default)]
pub struct FakeAdmin {
    databases: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, name: &str) -> Self {
        self.databases.lock().unwrap().insert(key(name));
        self
    }

    /// `"exists X"`, `"create X"`, `"drop X"` in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{} {}", call, name));
    }
}

#[async_trait]
impl DatabaseAdmin for FakeAdmin {
    async fn database_exists(&self, database: &str) -> Result<bool> {
        self.record("exists", database);
        Ok(self.databases.lock().unwrap().contains(&key(database)))
    }

    async fn create_database(&self, database: &str) -> Result<bool> {
        self.record("create", database);
        Ok(self.databases.lock().unwrap().insert(key(database)))
    }

    async fn drop_database(&self, database: &str) -> Result<bool> {
        self.record("drop", database);
        Ok(self.databases.lock().unwrap().remove(&key(database)))
    }
}
