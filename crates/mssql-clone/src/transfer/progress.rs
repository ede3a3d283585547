//! Progress and timing sinks for the batch copier.

use std::io::Write;

use serde::Serialize;
use tracing::info;

/// Receives copy progress. Implementations decide how (and how often) to
/// surface it; the copier calls [`progress`](Self::progress) after every row.
pub trait ProgressReporter: Send + Sync {
    /// A row was written: `rows_so_far` of the `total` counted at start.
    fn progress(&self, table: &str, rows_so_far: i64, total: i64);

    /// The table is done (or was interrupted).
    fn timing(&self, table: &str, rows_copied: i64, elapsed_seconds: f64, avg_ms_per_row: f64);
}

/// True when `rows_so_far` is the first row to reach a new `step`-percent mark,
/// or the last row.
fn crosses_step(rows_so_far: i64, total: i64, step: i64) -> bool {
    if total <= 0 || rows_so_far <= 0 {
        return false;
    }
    if rows_so_far >= total {
        return rows_so_far == total;
    }
    let pct = |n: i64| n.saturating_mul(100) / total / step;
    pct(rows_so_far) != pct(rows_so_far - 1)
}

/// Logs through `tracing`, every 10%.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn progress(&self, table: &str, rows_so_far: i64, total: i64) {
        if crosses_step(rows_so_far, total, 10) {
            info!(
                "{}: {}/{} rows ({}%)",
                table,
                rows_so_far,
                total,
                rows_so_far.saturating_mul(100) / total
            );
        }
    }

    fn timing(&self, table: &str, rows_copied: i64, elapsed_seconds: f64, avg_ms_per_row: f64) {
        info!(
            "{}: copied {} rows in {:.3}s ({:.3} ms/row)",
            table, rows_copied, elapsed_seconds, avg_ms_per_row
        );
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ProgressLine<'a> {
    Progress {
        table: &'a str,
        rows: i64,
        total: i64,
    },
    Timing {
        table: &'a str,
        rows: i64,
        elapsed_seconds: f64,
        avg_ms_per_row: f64,
    },
}

/// Writes one JSON object per line to stderr, every whole percent.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesReporter;

impl JsonLinesReporter {
    fn emit(line: &ProgressLine<'_>) {
        if let Ok(json) = serde_json::to_string(line) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", json);
        }
    }
}

impl ProgressReporter for JsonLinesReporter {
    fn progress(&self, table: &str, rows_so_far: i64, total: i64) {
        if crosses_step(rows_so_far, total, 1) {
            Self::emit(&ProgressLine::Progress {
                table,
                rows: rows_so_far,
                total,
            });
        }
    }

    fn timing(&self, table: &str, rows_copied: i64, elapsed_seconds: f64, avg_ms_per_row: f64) {
        Self::emit(&ProgressLine::Timing {
            table,
            rows: rows_copied,
            elapsed_seconds,
            avg_ms_per_row,
        });
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn progress(&self, _table: &str, _rows_so_far: i64, _total: i64) {}

    fn timing(&self, _table: &str, _rows: i64, _elapsed: f64, _avg: f64) {}
}
