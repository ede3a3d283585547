//! mssql-clone CLI - copy tables from one SQL Server database to another.

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use mssql_clone::{
    CloneError, Config, JsonLinesReporter, ReplicationReport, Replicator, RunStatus, VerifyResult,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-clone")]
#[command(about = "Clone tables from one SQL Server database into another")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy tables from source to target
    Run {
        /// Copy only these tables (comma-separated); default is every user table
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,

        /// Override rows per page
        #[arg(long)]
        batch_size: Option<usize>,

        /// Drop the target database before copying
        #[arg(long)]
        drop_target: bool,

        /// Compare row counts after copying
        #[arg(long)]
        verify: bool,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Validate row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// List user tables on the source
    ListTables,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CloneError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            tables,
            batch_size,
            drop_target,
            verify,
            yes,
        } => {
            if let Some(tables) = tables {
                config.copy.tables = tables
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            if let Some(size) = batch_size {
                config.copy.batch_size = size;
            }
            if drop_target {
                config.copy.drop_target_database = true;
            }
            if verify {
                config.copy.verify_row_counts = true;
            }
            config.validate()?;

            if !yes && !confirm_run(&config)? {
                println!("Aborted.");
                return Ok(());
            }

            let cancel_token = setup_signal_handler();

            let mut replicator = Replicator::new(config).await?;
            if cli.progress {
                replicator = replicator.with_reporter(Arc::new(JsonLinesReporter));
            }

            let report = replicator.run(&cancel_token).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }

            report.ensure_complete()?;
        }

        Commands::Validate => {
            let replicator = Replicator::new(config).await?;
            let result = replicator.validate().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Row Count Validation:");
                print_verification(&result);
            }

            check_verification(&result)?;
        }

        Commands::HealthCheck => {
            let replicator = Replicator::new(config).await?;
            let result = replicator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(CloneError::Config("Health check failed".to_string()));
            }
        }

        Commands::ListTables => {
            let replicator = Replicator::new(config).await?;
            let tables = replicator.list_tables().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in &tables {
                    println!("{}", table);
                }
            }
        }
    }

    Ok(())
}

/// Ask before writing into the target. Requires a terminal.
fn confirm_run(config: &Config) -> Result<bool, CloneError> {
    let tables = if config.copy.tables.is_empty() {
        "all user tables".to_string()
    } else {
        config.copy.tables.join(", ")
    };

    println!("Source: {}:{}/{}", config.source.host, config.source.port, config.source.database);
    println!("Target: {}:{}/{}", config.target.host, config.target.port, config.target.database);
    println!("Tables: {}", tables);
    if config.copy.drop_target_database {
        println!("The target database will be DROPPED first.");
    }

    Confirm::new()
        .with_prompt("Rows will be inserted into the target database. Continue?")
        .default(false)
        .interact()
        .map_err(|e| {
            CloneError::Config(format!(
                "confirmation prompt failed ({}); pass --yes to run unattended",
                e
            ))
        })
}

fn print_report(report: &ReplicationReport) {
    let status_msg = match report.status {
        RunStatus::Completed => "Clone completed!",
        RunStatus::CompletedWithErrors => "Clone completed with errors.",
        RunStatus::Interrupted => "Clone interrupted.",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Tables: {}/{} ({} skipped)",
        report.tables_completed, report.tables_total, report.tables_skipped
    );
    println!("  Rows copied: {}", report.rows_copied);
    if report.rows_failed > 0 {
        println!("  Rows failed: {}", report.rows_failed);
    }
    if !report.failed_tables.is_empty() {
        println!("  Failed tables: {:?}", report.failed_tables);
    }
    if let Some(verification) = &report.verification {
        println!("\nRow Count Verification:");
        print_verification(verification);
    }
}

fn print_verification(result: &VerifyResult) {
    for check in &result.checks {
        let target = check
            .target_rows
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        println!(
            "  {}: source={} target={} {}",
            check.table,
            check.source_rows,
            target,
            if check.matches { "OK" } else { "MISMATCH" }
        );
    }
}

fn check_verification(result: &VerifyResult) -> Result<(), CloneError> {
    if result.all_match() {
        return Ok(());
    }
    Err(CloneError::Validation(format!(
        "row counts differ for: {}",
        result.mismatched().join(", ")
    )))
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM. The copier finishes the
/// row in flight and stops.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Stopping after the current row...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Ctrl-C only on non-unix platforms.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Stopping after the current row...");
        token.cancel();
    });

    cancel_token
}
