//! Replication driver - picks tables, reconciles schemas, runs the copier.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::{validate_identifier, DatabaseAdmin, SourceReader, TargetWriter};
use crate::drivers::{MssqlAdmin, MssqlReader, MssqlWriter};
use crate::error::{CloneError, Result};
use crate::reconcile::{
    generate_alter_table, generate_create_table, schemas_equal, type_drift, ColumnDrift,
};
use crate::transfer::{
    BatchCopier, LogReporter, ProgressReporter, ReplicationOutcome, TransferConfig,
};
use crate::verify::{verify_row_counts, VerifyResult};

/// Replication driver.
pub struct Replicator {
    config: Config,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    admin: Option<Arc<dyn DatabaseAdmin>>,
    reporter: Arc<dyn ProgressReporter>,
}

/// What was done to the destination table before copying.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SchemaAction {
    /// Source table does not exist; nothing copied.
    SourceMissing,
    /// Destination table was created from the source schema.
    Created,
    /// Missing columns were added to the destination.
    Altered {
        columns_added: usize,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        drift: Vec<ColumnDrift>,
    },
    /// Schemas already matched.
    Unchanged,
}

/// Result for a single table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_action: Option<SchemaAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReplicationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    fn failed(table: &str, schema_action: Option<SchemaAction>, err: &CloneError) -> Self {
        Self {
            table: table.to_string(),
            schema_action,
            outcome: None,
            error: Some(err.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_skipped(&self) -> bool {
        self.schema_action == Some(SchemaAction::SourceMissing)
    }

    pub fn is_interrupted(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| !o.is_complete())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithErrors,
    Interrupted,
}

/// Result of a replication run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    /// Unique run identifier.
    pub run_id: String,

    pub status: RunStatus,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    /// Tables selected for the run, including ones never reached.
    pub tables_total: usize,
    pub tables_completed: usize,
    pub tables_failed: usize,
    pub tables_skipped: usize,

    pub rows_copied: i64,
    pub rows_failed: i64,

    pub failed_tables: Vec<String>,

    pub tables: Vec<TableReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerifyResult>,
}

impl ReplicationReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `Ok` only for a run that reached every table without failures or
    /// row count mismatches.
    pub fn ensure_complete(&self) -> Result<()> {
        if self.status == RunStatus::Interrupted {
            return Err(CloneError::Cancelled);
        }
        if !self.failed_tables.is_empty() {
            return Err(CloneError::Transfer {
                table: self.failed_tables.join(", "),
                message: "One or more tables failed to copy".into(),
            });
        }
        match &self.verification {
            Some(v) if !v.all_match() => Err(CloneError::Validation(format!(
                "row counts differ for: {}",
                v.mismatched().join(", ")
            ))),
            _ => Ok(()),
        }
    }
}

/// Health check result for both endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Replicator {
    /// Create a replicator connected to the configured SQL Server endpoints.
    ///
    /// Pools open connections lazily, so the target database does not need
    /// to exist yet.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let max_connections = config.copy.max_connections;

        let source = MssqlReader::new(&config.source, max_connections).await?;
        let target = MssqlWriter::new(&config.target, max_connections).await?;
        let admin = MssqlAdmin::new(&config.target).await?;

        Ok(Self::with_parts(
            config,
            Arc::new(source),
            Arc::new(target),
            Some(Arc::new(admin)),
        ))
    }

    /// Build from explicit endpoints. Without an admin the target database is
    /// assumed to exist.
    pub fn with_parts(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        admin: Option<Arc<dyn DatabaseAdmin>>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            admin,
            reporter: Arc::new(LogReporter),
        }
    }

    /// Replace the default progress reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the replication.
    ///
    /// Per-table failures are recorded in the report and do not stop the
    /// run. Only target preparation and table selection can fail the run.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ReplicationReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        info!("Starting replication run: {}", run_id);

        info!("Phase 1: Preparing target database");
        self.prepare_target().await?;

        info!("Phase 2: Selecting tables");
        let tables = self.select_tables().await?;
        info!("Found {} tables to copy", tables.len());

        info!("Phase 3: Copying tables");
        let copier = BatchCopier::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig {
                batch_size: self.config.copy.batch_size,
            },
        )
        .with_reporter(self.reporter.clone());

        let mut reports = Vec::with_capacity(tables.len());
        for table in &tables {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopping before {}", table);
                break;
            }
            let report = self.replicate_table(&copier, table, cancel).await;
            reports.push(report);
        }

        let interrupted =
            reports.len() < tables.len() || reports.iter().any(|r| r.is_interrupted());

        let verification = if self.config.copy.verify_row_counts && !interrupted {
            info!("Phase 4: Verifying row counts");
            let copied: Vec<String> = reports
                .iter()
                .filter(|r| r.outcome.is_some())
                .map(|r| r.table.clone())
                .collect();
            Some(verify_row_counts(self.source.as_ref(), self.target.as_ref(), &copied).await?)
        } else {
            None
        };

        let report = self.build_report(
            run_id,
            started_at,
            start,
            tables.len(),
            reports,
            interrupted,
            verification,
        );

        info!(
            "Replication {:?}: {} tables, {} rows copied, {} rows failed in {:.1}s",
            report.status,
            report.tables_total,
            report.rows_copied,
            report.rows_failed,
            report.duration_seconds
        );

        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_report(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
        start: Instant,
        tables_total: usize,
        tables: Vec<TableReport>,
        interrupted: bool,
        verification: Option<VerifyResult>,
    ) -> ReplicationReport {
        let mut tables_completed = 0;
        let mut tables_skipped = 0;
        let mut rows_copied = 0;
        let mut rows_failed = 0;
        let mut failed_tables = Vec::new();

        for report in &tables {
            if report.is_failed() {
                failed_tables.push(report.table.clone());
            } else if report.is_skipped() {
                tables_skipped += 1;
            }
            if let Some(outcome) = &report.outcome {
                rows_copied += outcome.rows_copied;
                rows_failed += outcome.rows_failed;
                if outcome.is_complete() {
                    tables_completed += 1;
                }
            }
        }

        let status = if interrupted {
            RunStatus::Interrupted
        } else if failed_tables.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        };

        ReplicationReport {
            run_id,
            status,
            started_at,
            completed_at: Utc::now(),
            duration_seconds: start.elapsed().as_secs_f64(),
            tables_total,
            tables_completed,
            tables_failed: failed_tables.len(),
            tables_skipped,
            rows_copied,
            rows_failed,
            failed_tables,
            tables,
            verification,
        }
    }

    /// Drop and/or create the target database as configured.
    async fn prepare_target(&self) -> Result<()> {
        let Some(admin) = &self.admin else {
            debug!("No admin connection, assuming target database exists");
            return Ok(());
        };
        let database = &self.config.target.database;

        if self.config.copy.drop_target_database && admin.drop_database(database).await? {
            warn!("Dropped target database {}", database);
        }

        if admin.database_exists(database).await? {
            return Ok(());
        }

        if !self.config.copy.create_target_database {
            return Err(CloneError::Config(format!(
                "target database {} does not exist and create_target_database is false",
                database
            )));
        }

        admin.create_database(database).await?;
        info!("Created target database {}", database);
        Ok(())
    }

    /// Configured tables in order (deduplicated), or every user table on the
    /// source when none are configured.
    pub async fn select_tables(&self) -> Result<Vec<String>> {
        if self.config.copy.tables.is_empty() {
            return self.source.list_tables().await;
        }

        let mut tables: Vec<String> = Vec::with_capacity(self.config.copy.tables.len());
        for name in &self.config.copy.tables {
            let name = name.trim();
            validate_identifier(name)?;
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                tables.push(name.to_string());
            }
        }
        Ok(tables)
    }

    async fn replicate_table(
        &self,
        copier: &BatchCopier,
        table: &str,
        cancel: &CancellationToken,
    ) -> TableReport {
        let schema_action = match self.reconcile_schema(table).await {
            Ok(action) => action,
            Err(e) => {
                error!("{}: schema reconciliation failed - {}", table, e);
                return TableReport::failed(table, None, &e);
            }
        };

        if schema_action == SchemaAction::SourceMissing {
            warn!("{}: not found on source, skipping", table);
            return TableReport {
                table: table.to_string(),
                schema_action: Some(schema_action),
                outcome: None,
                error: None,
            };
        }

        match copier.copy_table(table, cancel).await {
            Ok(outcome) => TableReport {
                table: table.to_string(),
                schema_action: Some(schema_action),
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                error!("{}: failed - {}", table, e);
                TableReport::failed(table, Some(schema_action), &e)
            }
        }
    }

    /// Make the destination table compatible with the source schema.
    async fn reconcile_schema(&self, table: &str) -> Result<SchemaAction> {
        let Some(source_schema) = self.source.table_schema(table).await? else {
            return Ok(SchemaAction::SourceMissing);
        };

        let Some(destination_schema) = self.target.table_schema(table).await? else {
            let ddl = generate_create_table(&source_schema, table);
            debug!("{}: creating table", table);
            self.target.execute_ddl(&ddl).await?;
            info!("{}: created on target", table);
            return Ok(SchemaAction::Created);
        };

        if schemas_equal(&source_schema, &destination_schema) {
            return Ok(SchemaAction::Unchanged);
        }

        let alters = generate_alter_table(&source_schema, &destination_schema, table);
        for ddl in &alters {
            self.target.execute_ddl(ddl).await?;
        }
        if !alters.is_empty() {
            info!("{}: added {} missing columns", table, alters.len());
        }

        let drift = type_drift(&source_schema, &destination_schema);
        for d in &drift {
            warn!(
                "{}: column {} is {} on source but {} on target",
                table, d.column, d.source_type, d.destination_type
            );
        }

        Ok(SchemaAction::Altered {
            columns_added: alters.len(),
            drift,
        })
    }

    /// Compare row counts for the selected tables.
    pub async fn validate(&self) -> Result<VerifyResult> {
        let tables = self.select_tables().await?;
        verify_row_counts(self.source.as_ref(), self.target.as_ref(), &tables).await
    }

    /// User tables on the source.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.source.list_tables().await
    }

    /// Test connectivity to both endpoints.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source_result = self.source.test_connection().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target_result = self.target.test_connection().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        let source_connected = source_result.is_ok();
        let target_connected = target_result.is_ok();

        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error: source_result.err().map(|e| e.to_string()),
            target_connected,
            target_latency_ms,
            target_error: target_result.err().map(|e| e.to_string()),
            healthy: source_connected && target_connected,
        })
    }
}
