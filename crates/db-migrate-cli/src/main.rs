//! db-migrate CLI - schema and data migration between MySQL, SQLite and PostgreSQL.

use clap::{Parser, Subcommand};
use db_migrate::error::{EXIT_CANCELLED, EXIT_MIGRATION_INCOMPLETE};
use db_migrate::{
    export_sql, DialectKind, JsonLinesSink, MigrateError, MigrationJob, MigrationPlan,
    MigrationResult, OnErrorPolicy, Orchestrator, ProgressSink, RunStatus, TableStatus,
    TracingSink,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-migrate")]
#[command(about = "Schema and data migration between MySQL, SQLite and PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML job file
    #[arg(short, long, default_value = "migration.yaml")]
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

    /// Seconds to wait for the current table to roll back after a shutdown signal
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress events as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration job
    Run {
        /// Dry run: list tables and mapped column types without writing
        #[arg(long)]
        dry_run: bool,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the failure policy: abort, skip-table, skip-row
        #[arg(long)]
        on_error: Option<String>,

        /// Drop each target table before creating it
        #[arg(long)]
        drop_target: bool,
    },

    /// Load and validate the job file without connecting
    Validate,

    /// Test database connections
    HealthCheck,

    /// Dump source tables as a SQL script
    Export {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Dialect of the script (default: the target's dialect)
        #[arg(long)]
        dialect: Option<String>,

        /// Only DROP and CREATE statements, no data
        #[arg(long)]
        schema_only: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut job = MigrationJob::load(&cli.config)?;
    info!("Loaded job from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            dry_run,
            batch_size,
            on_error,
            drop_target,
        } => {
            if let Some(size) = batch_size {
                job.batch_size = size;
            }
            if let Some(policy) = on_error {
                job.on_error = OnErrorPolicy::parse(&policy).ok_or_else(|| {
                    MigrateError::Config(format!(
                        "invalid --on-error '{}'. Valid values: abort, skip-table, skip-row",
                        policy
                    ))
                })?;
            }
            if drop_target {
                job.drop_target_tables_first = true;
            }
            job.validate()?;

            let orchestrator = Orchestrator::new(job);
            if dry_run {
                let plan = orchestrator.plan().await?;
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    print_plan(&plan);
                }
                return Ok(ExitCode::SUCCESS);
            }

            let cancel = setup_signal_handler(cli.shutdown_timeout);
            let sink: Box<dyn ProgressSink> = if cli.progress {
                Box::new(JsonLinesSink::stderr())
            } else {
                Box::new(TracingSink)
            };

            let result = run_with_grace(
                &orchestrator,
                sink.as_ref(),
                cancel,
                Duration::from_secs(cli.shutdown_timeout),
            )
            .await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                print_result(&result);
            }

            Ok(match result.status {
                RunStatus::Success => ExitCode::SUCCESS,
                RunStatus::Cancelled => ExitCode::from(EXIT_CANCELLED),
                RunStatus::Partial | RunStatus::Failed => {
                    ExitCode::from(EXIT_MIGRATION_INCOMPLETE)
                }
            })
        }

        Commands::Validate => {
            if cli.output_json {
                println!("{}", serde_json::json!({ "valid": true }));
            } else {
                println!("Configuration is valid");
                println!("  Source: {}", job.source.describe());
                println!("  Target: {}", job.target.describe());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&job).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for (role, endpoint) in [("Source", &result.source), ("Target", &result.target)] {
                    println!(
                        "  {} ({}): {} ({}ms)",
                        role,
                        endpoint.dialect.display_name(),
                        if endpoint.connected { "OK" } else { "FAILED" },
                        endpoint.latency_ms
                    );
                    if let Some(ref version) = endpoint.server_version {
                        println!("    Version: {}", version);
                    }
                    if let Some(ref err) = endpoint.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let message = [&result.source, &result.target]
                    .iter()
                    .find_map(|e| e.error.clone())
                    .unwrap_or_else(|| "health check failed".to_string());
                return Err(MigrateError::connection("health-check", message));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Export {
            output,
            dialect,
            schema_only,
        } => {
            let dialect = match dialect {
                Some(name) => DialectKind::parse(&name).ok_or_else(|| {
                    MigrateError::Config(format!(
                        "invalid --dialect '{}'. Valid values: mysql, sqlite, postgresql",
                        name
                    ))
                })?,
                None => job.target.dialect,
            };

            let mut out = BufWriter::new(File::create(&output)?);
            let tables = export_sql(&job, dialect, schema_only, &mut out).await?;
            let rows: u64 = tables.iter().map(|t| t.rows).sum();

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "output": output,
                        "dialect": dialect,
                        "tables": tables,
                        "rows": rows,
                    }))?
                );
            } else {
                println!(
                    "Exported {} tables ({} rows) to {}",
                    tables.len(),
                    rows,
                    output.display()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run the job; once cancelled, give it `grace` to roll back the table in
/// flight before giving up.
async fn run_with_grace(
    orchestrator: &Orchestrator,
    sink: &dyn ProgressSink,
    cancel: CancellationToken,
    grace: Duration,
) -> Result<MigrationResult, MigrateError> {
    let watchdog = cancel.clone();
    let run = orchestrator.run_with(sink, cancel);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = async {
            watchdog.cancelled().await;
            tokio::time::sleep(grace).await;
        } => {
            eprintln!("Shutdown timeout of {}s exceeded", grace.as_secs());
            Err(MigrateError::Cancelled)
        }
    }
}

fn print_plan(plan: &MigrationPlan) {
    println!(
        "Dry run: {} -> {}, {} tables",
        plan.source.display_name(),
        plan.target.display_name(),
        plan.tables.len()
    );
    for table in &plan.tables {
        println!("\n  {}", table.name);
        for col in &table.columns {
            let pk = if table.primary_key.contains(&col.name) { " (pk)" } else { "" };
            println!(
                "    {}{}: {} -> {}",
                col.name, pk, col.source_type, col.target_type
            );
            if let Some(ref warning) = col.warning {
                println!("      warning: {}", warning);
            }
        }
    }
}

fn print_result(result: &MigrationResult) {
    println!("\nMigration {}!", result.status.as_str());
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {}/{}",
        result.count(TableStatus::Success),
        result.tables.len()
    );
    println!("  Rows: {}", result.rows_copied);
    if !result.warnings.is_empty() {
        println!("  Warnings: {}", result.warnings.len());
    }
    for table in result.tables.iter().filter(|t| t.status != TableStatus::Success) {
        match &table.error {
            Some(err) => println!(
                "  {} {:?} in {}: {}",
                table.name, table.status, err.phase, err.message
            ),
            None => println!(
                "  {} {:?}: {} rows skipped",
                table.name, table.status, table.rows_skipped
            ),
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json keeps stdout parseable.
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

/// Cancel the returned token on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
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
                    eprintln!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!(
                "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
                name, shutdown_timeout
            );
            token.cancel();
        });
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\nReceived Ctrl-C. Shutting down gracefully (timeout: {}s)...",
                shutdown_timeout
            );
            token.cancel();
        }
    });

    cancel_token
}
