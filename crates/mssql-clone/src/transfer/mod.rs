//! Paged, identity-aware table copy.
//!
//! One table is copied by one sequential loop:
//!
//! 1. read the source column schema and row count once
//! 2. fetch a page with `OFFSET`/`FETCH NEXT` on a fresh read connection
//! 3. coerce every cell against the source column's declared type
//! 4. check the destination for an identity column, open a write session,
//!    enable `IDENTITY_INSERT` if needed, insert row by row, disable it again
//! 5. advance the offset by the rows actually fetched
//!
//! A failed insert is logged and counted, never propagated. Fetch, session
//! and identity failures abort the table. Cancellation is checked before each
//! page and before each row, so at most the row in flight completes after a
//! cancel.

pub mod identity;
pub mod progress;

pub use identity::IdentityGuard;
pub use progress::{JsonLinesReporter, LogReporter, NoopReporter, ProgressReporter};

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coerce::TypeCoercer;
use crate::core::{Batch, ColumnSchema, SourceReader, SqlValue, TargetWriter};
use crate::error::{CloneError, Result};

/// Row faults kept verbatim in an outcome; the rest are only counted.
const MAX_FAULT_SAMPLES: usize = 20;

/// Transfer configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows per page.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// How a table copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStatus {
    /// The page loop ran to the end of the source.
    Completed,
    /// Cancellation stopped the loop early.
    Interrupted,
}

/// A single row that could not be inserted.
#[derive(Debug, Clone, Serialize)]
pub struct RowFault {
    /// Zero-based position of the row in the source ordering.
    pub position: i64,
    pub message: String,
}

/// Per-table copy result.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationOutcome {
    pub table: String,
    pub status: CopyStatus,
    /// Source row count taken before the first page.
    pub total_rows: i64,
    pub rows_copied: i64,
    pub rows_failed: i64,
    /// Cells changed by coercion (clamped dates, undecodable binaries).
    pub values_adjusted: i64,
    pub pages: usize,
    pub elapsed_seconds: f64,
    pub avg_ms_per_row: f64,
    /// First few row faults.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub row_faults: Vec<RowFault>,
}

impl ReplicationOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == CopyStatus::Completed
    }
}

#[derive(Debug, Default)]
struct CopyCounters {
    copied: i64,
    failed: i64,
    adjusted: i64,
    pages: usize,
    faults: Vec<RowFault>,
}

impl CopyCounters {
    fn record_fault(&mut self, position: i64, err: &CloneError) {
        self.failed += 1;
        if self.faults.len() < MAX_FAULT_SAMPLES {
            self.faults.push(RowFault {
                position,
                message: err.to_string(),
            });
        }
    }
}

/// Copies one table at a time from a source reader to a target writer.
pub struct BatchCopier {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    coercer: TypeCoercer,
    reporter: Arc<dyn ProgressReporter>,
}

impl BatchCopier {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            coercer: TypeCoercer::new(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Replace the default tracing-based progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Copy all rows of `table`.
    ///
    /// The destination table must already be compatible with the source
    /// schema. Returns `Err` only for page-level failures; row failures are
    /// reported in the outcome.
    pub async fn copy_table(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<ReplicationOutcome> {
        let start = Instant::now();
        let batch_size = self.config.batch_size.max(1);

        let schema = self
            .source
            .table_schema(table)
            .await?
            .ok_or_else(|| CloneError::transfer(table, "table not found on source"))?;
        let total = self.source.row_count(table).await?;

        info!(
            "{}: copying {} rows ({} columns, batch size {})",
            table,
            total,
            schema.len(),
            batch_size
        );

        let mut counters = CopyCounters::default();
        let mut status = CopyStatus::Completed;
        let mut offset: i64 = 0;

        while offset < total {
            if cancel.is_cancelled() {
                status = CopyStatus::Interrupted;
                break;
            }

            let mut batch = self
                .source
                .read_page(table, &schema, offset, batch_size)
                .await?;
            counters.pages += 1;

            if batch.is_empty() {
                debug!("{}: empty page at offset {}, stopping", table, offset);
                break;
            }
            let fetched = batch.len() as i64;

            counters.adjusted += self.coerce_batch(table, &schema, &mut batch);

            let finished = self
                .write_batch(table, &batch, offset, total, &mut counters, cancel)
                .await?;
            offset += fetched;

            if !finished {
                status = CopyStatus::Interrupted;
                break;
            }
        }

        let elapsed = start.elapsed();
        let elapsed_seconds = elapsed.as_secs_f64();
        let avg_ms_per_row = if counters.copied > 0 {
            elapsed_seconds * 1000.0 / counters.copied as f64
        } else {
            0.0
        };

        self.reporter
            .timing(table, counters.copied, elapsed_seconds, avg_ms_per_row);

        if status == CopyStatus::Interrupted {
            warn!(
                "{}: interrupted after {} of {} rows",
                table, counters.copied, total
            );
        }
        if counters.failed > 0 {
            warn!("{}: {} rows failed to insert", table, counters.failed);
        }

        Ok(ReplicationOutcome {
            table: table.to_string(),
            status,
            total_rows: total,
            rows_copied: counters.copied,
            rows_failed: counters.failed,
            values_adjusted: counters.adjusted,
            pages: counters.pages,
            elapsed_seconds,
            avg_ms_per_row,
            row_faults: counters.faults,
        })
    }

    /// Coerce every cell in place. Returns the number of changed cells.
    fn coerce_batch(&self, table: &str, schema: &ColumnSchema, batch: &mut Batch) -> i64 {
        let mut adjusted = 0;
        for row in batch.iter_mut() {
            for (column, value) in row.iter_mut() {
                let Some(declared) = schema.type_of(column) else {
                    continue;
                };
                let placeholder = SqlValue::Null(value.null_type());
                let coerced = self.coercer.coerce(std::mem::replace(value, placeholder), declared);
                *value = coerced.value;
                if let Some(adjustment) = coerced.adjustment {
                    adjusted += 1;
                    info!("{}.{}: {}", table, column, adjustment);
                }
            }
        }
        adjusted
    }

    /// Write one page through a single session. Returns `false` if
    /// cancellation stopped it before the last row.
    async fn write_batch(
        &self,
        table: &str,
        batch: &Batch,
        offset: i64,
        total: i64,
        counters: &mut CopyCounters,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        // Checked before the session takes its pooled connection.
        let guard = IdentityGuard::resolve(self.target.as_ref(), table).await?;
        let mut session = self.target.open_session().await?;
        guard.begin(session.as_mut()).await?;

        let mut finished = true;
        for (i, row) in batch.iter().enumerate() {
            if cancel.is_cancelled() {
                finished = false;
                break;
            }
            match session.insert_row(table, row).await {
                Ok(()) => {
                    counters.copied += 1;
                    self.reporter.progress(table, counters.copied, total);
                }
                Err(e) => {
                    error!("{}: failed to insert row {}: {}", table, offset + i as i64, e);
                    counters.record_fault(offset + i as i64, &e);
                }
            }
        }

        guard.end(session.as_mut()).await?;
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnDef, Row, SqlNullType};
    use crate::testing::{FakeSource, FakeTarget, Statement};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn numbered_rows(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| Row::new().with("Id", i).with("Name", format!("row {}", i)))
            .collect()
    }

    fn orders_schema() -> ColumnSchema {
        ColumnSchema::new(vec![
            ColumnDef::new("Id", "bigint").identity().primary_key(),
            ColumnDef::new("Name", "nvarchar(50)"),
        ])
        .unwrap()
    }

    fn copier(source: &Arc<FakeSource>, target: &Arc<FakeTarget>, batch_size: usize) -> BatchCopier {
        BatchCopier::new(
            source.clone(),
            target.clone(),
            TransferConfig { batch_size },
        )
        .with_reporter(Arc::new(NoopReporter))
    }

    /// Cancels the token once `at` rows have been reported.
    struct CancelAt {
        at: i64,
        token: CancellationToken,
    }

    impl ProgressReporter for CancelAt {
        fn progress(&self, _table: &str, rows_so_far: i64, _total: i64) {
            if rows_so_far == self.at {
                self.token.cancel();
            }
        }
        fn timing(&self, _: &str, _: i64, _: f64, _: f64) {}
    }

    #[derive(Default)]
    struct Recorder {
        timings: Mutex<Vec<(String, i64)>>,
    }

    impl ProgressReporter for Recorder {
        fn progress(&self, _: &str, _: i64, _: i64) {}
        fn timing(&self, table: &str, rows: i64, _: f64, _: f64) {
            self.timings.lock().unwrap().push((table.to_string(), rows));
        }
    }

    #[tokio::test]
    async fn test_pages_follow_batch_size() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(2500)));
        let target = Arc::new(FakeTarget::new());

        let outcome = copier(&source, &target, 1000)
            .copy_table("Orders", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.page_requests("Orders"), vec![(0, 1000), (1000, 1000), (2000, 1000)]);
        assert_eq!(source.page_sizes("Orders"), vec![1000, 1000, 500]);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.rows_copied, 2500);
        assert_eq!(outcome.status, CopyStatus::Completed);
        assert_eq!(target.inserted_rows("Orders").len(), 2500);
    }

    #[tokio::test]
    async fn test_page_count_is_ceiling() {
        for (n, b, expected) in [(1, 1, 1), (10, 3, 4), (9, 3, 3), (7, 100, 1)] {
            let source = Arc::new(FakeSource::new().with_table("T", orders_schema(), numbered_rows(n)));
            let target = Arc::new(FakeTarget::new());
            let outcome = copier(&source, &target, b)
                .copy_table("T", &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(outcome.pages, expected, "n={} b={}", n, b);
            assert_eq!(outcome.rows_copied, n);
        }
    }

    #[tokio::test]
    async fn test_no_row_skipped_or_repeated() {
        let source = Arc::new(FakeSource::new().with_table("T", orders_schema(), numbered_rows(10)));
        let target = Arc::new(FakeTarget::new());
        copier(&source, &target, 3)
            .copy_table("T", &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<SqlValue> = target
            .inserted_rows("T")
            .iter()
            .map(|r| r.get("Id").cloned().unwrap())
            .collect();
        let expected: Vec<SqlValue> = (1..=10).map(SqlValue::I64).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_zero_rows_finishes_immediately() {
        let source = Arc::new(FakeSource::new().with_table("Empty", orders_schema(), Vec::new()));
        let target = Arc::new(FakeTarget::new());
        let recorder = Arc::new(Recorder::default());

        let outcome = copier(&source, &target, 100)
            .with_reporter(recorder.clone())
            .copy_table("Empty", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rows_copied, 0);
        assert_eq!(outcome.pages, 0);
        assert_eq!(outcome.avg_ms_per_row, 0.0);
        assert!(outcome.is_complete());
        assert!(source.page_requests("Empty").is_empty());
        assert_eq!(target.sessions_opened(), 0);
        assert_eq!(*recorder.timings.lock().unwrap(), vec![("Empty".to_string(), 0)]);
    }

    #[tokio::test]
    async fn test_empty_page_stops_loop_when_total_is_stale() {
        // Count says 50 but only 20 rows are readable
        let source = Arc::new(
            FakeSource::new()
                .with_table("T", orders_schema(), numbered_rows(20))
                .with_row_count("T", 50),
        );
        let target = Arc::new(FakeTarget::new());

        let outcome = copier(&source, &target, 10)
            .copy_table("T", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rows_copied, 20);
        assert_eq!(outcome.pages, 3);
        assert_eq!(source.page_requests("T").last(), Some(&(20, 10)));
        assert_eq!(outcome.status, CopyStatus::Completed);
    }

    #[tokio::test]
    async fn test_identity_insert_bracketing_once_per_session() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(10)));
        let target = Arc::new(FakeTarget::new().with_identity("Orders"));

        copier(&source, &target, 1000)
            .copy_table("Orders", &CancellationToken::new())
            .await
            .unwrap();

        let statements = target.statements();
        assert_eq!(statements.len(), 12);
        assert_eq!(
            statements.first(),
            Some(&Statement::Execute("SET IDENTITY_INSERT [Orders] ON".into()))
        );
        assert_eq!(
            statements.last(),
            Some(&Statement::Execute("SET IDENTITY_INSERT [Orders] OFF".into()))
        );
        assert!(statements[1..11]
            .iter()
            .all(|s| matches!(s, Statement::Insert { table, .. } if table == "Orders")));
        assert_eq!(target.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn test_identity_bracketing_per_page() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(5)));
        let target = Arc::new(FakeTarget::new().with_identity("Orders"));

        copier(&source, &target, 2)
            .copy_table("Orders", &CancellationToken::new())
            .await
            .unwrap();

        let toggles: Vec<Statement> = target
            .statements()
            .into_iter()
            .filter(|s| matches!(s, Statement::Execute(_)))
            .collect();
        assert_eq!(toggles.len(), 6);
        assert_eq!(target.sessions_opened(), 3);
    }

    #[tokio::test]
    async fn test_no_identity_statements_without_identity() {
        let source = Arc::new(FakeSource::new().with_table("Notes", orders_schema(), numbered_rows(4)));
        let target = Arc::new(FakeTarget::new());
        copier(&source, &target, 10)
            .copy_table("Notes", &CancellationToken::new())
            .await
            .unwrap();
        assert!(target
            .statements()
            .iter()
            .all(|s| matches!(s, Statement::Insert { .. })));
    }

    #[tokio::test]
    async fn test_cancel_after_first_page() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(2500)));
        let target = Arc::new(FakeTarget::new());
        let token = CancellationToken::new();

        let outcome = copier(&source, &target, 1000)
            .with_reporter(Arc::new(CancelAt {
                at: 1000,
                token: token.clone(),
            }))
            .copy_table("Orders", &token)
            .await
            .unwrap();

        assert_eq!(outcome.status, CopyStatus::Interrupted);
        assert_eq!(outcome.rows_copied, 1000);
        assert_eq!(source.page_requests("Orders"), vec![(0, 1000)]);
    }

    #[tokio::test]
    async fn test_cancel_mid_page_stops_before_next_row() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(10)));
        let target = Arc::new(FakeTarget::new().with_identity("Orders"));
        let token = CancellationToken::new();

        let outcome = copier(&source, &target, 10)
            .with_reporter(Arc::new(CancelAt {
                at: 4,
                token: token.clone(),
            }))
            .copy_table("Orders", &token)
            .await
            .unwrap();

        assert_eq!(outcome.status, CopyStatus::Interrupted);
        assert_eq!(outcome.rows_copied, 4);
        // identity is still switched off after the partial page
        assert_eq!(
            target.statements().last(),
            Some(&Statement::Execute("SET IDENTITY_INSERT [Orders] OFF".into()))
        );
    }

    #[tokio::test]
    async fn test_already_cancelled_fetches_nothing() {
        let source = Arc::new(FakeSource::new().with_table("T", orders_schema(), numbered_rows(5)));
        let target = Arc::new(FakeTarget::new());
        let token = CancellationToken::new();
        token.cancel();

        let outcome = copier(&source, &target, 2).copy_table("T", &token).await.unwrap();
        assert_eq!(outcome.status, CopyStatus::Interrupted);
        assert_eq!(outcome.rows_copied, 0);
        assert!(source.page_requests("T").is_empty());
    }

    #[tokio::test]
    async fn test_row_failures_are_absorbed() {
        let source = Arc::new(FakeSource::new().with_table("T", orders_schema(), numbered_rows(10)));
        let target = Arc::new(
            FakeTarget::new()
                .fail_when("Id", SqlValue::I64(3))
                .fail_when("Id", SqlValue::I64(7)),
        );

        let outcome = copier(&source, &target, 4)
            .copy_table("T", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rows_copied, 8);
        assert_eq!(outcome.rows_failed, 2);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.status, CopyStatus::Completed);
        let positions: Vec<i64> = outcome.row_faults.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![2, 6]);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_table() {
        let source = Arc::new(
            FakeSource::new()
                .with_table("T", orders_schema(), numbered_rows(30))
                .fail_page("T", 2),
        );
        let target = Arc::new(FakeTarget::new());

        let result = copier(&source, &target, 10)
            .copy_table("T", &CancellationToken::new())
            .await;
        assert!(result.is_err());
        assert_eq!(target.inserted_rows("T").len(), 10);
    }

    #[tokio::test]
    async fn test_missing_source_table_is_error() {
        let source = Arc::new(FakeSource::new());
        let target = Arc::new(FakeTarget::new());
        let result = copier(&source, &target, 10)
            .copy_table("Ghost", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CloneError::Transfer { .. })));
        assert!(source.page_requests("Ghost").is_empty());
    }

    #[tokio::test]
    async fn test_single_connection_target_copies_identity_table() {
        let source = Arc::new(FakeSource::new().with_table("Orders", orders_schema(), numbered_rows(3)));
        let target = Arc::new(FakeTarget::new().with_identity("Orders").single_connection());

        let outcome = copier(&source, &target, 2)
            .copy_table("Orders", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.rows_copied, 3);
        assert_eq!(outcome.status, CopyStatus::Completed);
        assert_eq!(target.sessions_opened(), 2);
        assert_eq!(target.inserted_rows("Orders").len(), 3);
    }

    #[tokio::test]
    async fn test_cells_are_coerced_before_insert() {
        let schema = ColumnSchema::new(vec![
            ColumnDef::new("Id", "int"),
            ColumnDef::new("Born", "datetime"),
            ColumnDef::new("Blob", "varbinary(MAX)"),
        ])
        .unwrap();
        let ancient = NaiveDate::from_ymd_opt(1200, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let rows = vec![
            Row::new()
                .with("Id", 1)
                .with("Born", ancient)
                .with("Blob", "AQID"),
            Row::new()
                .with("Id", 2)
                .with("Born", ancient)
                .with("Blob", "***"),
        ];
        let source = Arc::new(FakeSource::new().with_table("People", schema, rows));
        let target = Arc::new(FakeTarget::new());

        let outcome = copier(&source, &target, 10)
            .copy_table("People", &CancellationToken::new())
            .await
            .unwrap();

        let inserted = target.inserted_rows("People");
        let min = TypeCoercer::new().min();
        assert_eq!(inserted[0].get("Born"), Some(&SqlValue::DateTime(min)));
        assert_eq!(inserted[0].get("Blob"), Some(&SqlValue::Bytes(vec![1, 2, 3])));
        assert_eq!(
            inserted[1].get("Blob"),
            Some(&SqlValue::Null(SqlNullType::Bytes))
        );
        assert_eq!(outcome.values_adjusted, 3);
    }
}
