pub mod cli;
pub mod config;
pub mod error;
pub mod formatter;
pub mod inspector;
pub mod models;
pub mod setup;
pub mod status;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{Connection, PgPool};
use tokio::time;
use tracing::{info, warn};

use self::cli::{Cli, Command, OutputFormat, StatusArgs};
use self::config::{AppConfig, DbSettings, resolve_config};
use self::error::{QueryPhase, ReportError};
use self::formatter::OutputGenerator;
use self::models::{ConnectionCheck, ProjectStatus, Report};

pub use self::inspector::generate_report;

/// Opens a single-connection pool. The caller owns it and must close it.
///
/// A direct connection attempt runs first so a refused or rejected login
/// surfaces its own error at once instead of the pool's retry timeout.
pub async fn connect(
    settings: &DbSettings,
    connect_timeout: Duration,
) -> Result<PgPool, ReportError> {
    let options = settings.connect_options();

    let attempt = PgConnection::connect_with(&options);
    let conn = match time::timeout(connect_timeout, attempt).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(source)) => return Err(ReportError::ConnectionFailure { source }),
        Err(_) => {
            return Err(ReportError::Timeout {
                phase: QueryPhase::Connect {
                    host: settings.host.clone(),
                    port: settings.port,
                },
                after: connect_timeout,
            });
        }
    };
    conn.close()
        .await
        .map_err(|source| ReportError::ConnectionFailure { source })?;

    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(connect_timeout)
        .connect_with(options)
        .await
        .map_err(|source| ReportError::ConnectionFailure { source })
}

pub async fn run(cli: Cli) -> Result<()> {
    // 1. Resolve Config
    let config = resolve_config(&cli)?;

    // 2. Execute
    let output = match cli.command.unwrap_or(Command::Check) {
        Command::Check => with_pool(&config, |pool| check(pool, &config)).await?,
        Command::Tables => with_pool(&config, |pool| tables(pool, &config)).await?,
        Command::Setup(args) => {
            let outcome =
                setup::ensure_database(&config.db, &args.maintenance_db, config.connect_timeout)
                    .await?;
            render(config.format, &outcome, OutputGenerator::generate_setup)?
        }
        Command::Status(args) => project_status(&config, &args).await?,
    };

    // 3. Output
    print!("{}", output);

    Ok(())
}

/// Connects, runs `body`, and closes the pool whether or not `body` failed.
async fn with_pool<F, Fut>(config: &AppConfig, body: F) -> Result<String>
where
    F: FnOnce(PgPool) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    info!(
        host = %config.db.host,
        port = config.db.port,
        database = %config.db.database,
        "connecting"
    );
    let pool = connect(&config.db, config.connect_timeout).await?;
    let result = body(pool.clone()).await;
    pool.close().await;
    result
}

async fn scan(pool: &PgPool, config: &AppConfig) -> Result<Report> {
    let report = generate_report(pool, &config.schema, config.timeouts).await?;
    if report.is_partial() {
        warn!(
            skipped = report.skipped.len(),
            "report is partial: some tables could not be counted"
        );
    }
    Ok(report)
}

async fn check(pool: PgPool, config: &AppConfig) -> Result<String> {
    let server = setup::server_info(&pool, &config.db).await?;
    let report = scan(&pool, config).await?;
    let check = ConnectionCheck { server, report };
    render(config.format, &check, OutputGenerator::generate_check)
}

async fn tables(pool: PgPool, config: &AppConfig) -> Result<String> {
    let report = scan(&pool, config).await?;
    render(config.format, &report, OutputGenerator::generate_tables)
}

async fn project_status(config: &AppConfig, args: &StatusArgs) -> Result<String> {
    let expected: Vec<String> = if args.notebooks.is_empty() {
        status::DEFAULT_NOTEBOOKS.iter().map(|s| s.to_string()).collect()
    } else {
        args.notebooks.clone()
    };

    let notebooks = status::check_notebooks(&args.dir, &expected, args.min_size)
        .with_context(|| format!("Failed to inspect notebooks in {}", args.dir.display()))?;
    let visualizations = status::list_visualizations(&args.dir)
        .with_context(|| format!("Failed to list images in {}", args.dir.display()))?;

    with_pool(config, |pool| async move {
        let report = scan(&pool, config).await?;
        let status = ProjectStatus {
            directory: args.dir.clone(),
            notebooks,
            visualizations,
            report,
        };
        render(config.format, &status, OutputGenerator::generate_status)
    })
    .await
}

fn render<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: fn(&T) -> Result<String, std::fmt::Error>,
) -> Result<String> {
    match format {
        OutputFormat::Text => text(value).context("Failed to format report"),
        OutputFormat::Json => {
            OutputGenerator::generate_json(value).context("Failed to serialize report")
        }
    }
}
