use std::time::Duration;

use sqlx::PgPool;
use tracing::info;

use crate::app::config::DbSettings;
use crate::app::connect;
use crate::app::error::{ReportError, is_connection_error, sqlstate};
use crate::app::inspector::quote_identifier;
use crate::app::models::{ServerInfo, SetupOutcome};

/// SQLSTATE `duplicate_database`.
const DUPLICATE_DATABASE: &str = "42P04";

/// Asks the server for its version string.
pub async fn server_info(pool: &PgPool, settings: &DbSettings) -> Result<ServerInfo, ReportError> {
    let version: String = sqlx::query_scalar("SELECT version()")
        .fetch_one(pool)
        .await
        .map_err(|source| ReportError::ConnectionFailure { source })?;

    Ok(ServerInfo {
        database: settings.database.clone(),
        host: settings.host.clone(),
        port: settings.port,
        user: settings.user.clone(),
        version,
    })
}

pub async fn database_exists(pool: &PgPool, name: &str) -> Result<bool, ReportError> {
    let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(|source| setup_error(name, source))?;
    Ok(found.is_some())
}

/// Runs `CREATE DATABASE` for `name`. Returns false if it already existed.
pub async fn create_database(pool: &PgPool, name: &str) -> Result<bool, ReportError> {
    // CREATE DATABASE refuses to run inside a transaction block, so use the simple protocol.
    let sql = format!("CREATE DATABASE {}", quote_identifier(name));
    match sqlx::raw_sql(&sql).execute(pool).await {
        Ok(_) => Ok(true),
        Err(e) if sqlstate(&e).as_deref() == Some(DUPLICATE_DATABASE) => Ok(false),
        Err(source) => Err(setup_error(name, source)),
    }
}

/// Creates the configured database through `maintenance_db` when missing,
/// then connects to it to confirm it is usable.
pub async fn ensure_database(
    settings: &DbSettings,
    maintenance_db: &str,
    connect_timeout: Duration,
) -> Result<SetupOutcome, ReportError> {
    let target = settings.database.as_str();

    info!(server = %settings.host, maintenance_db, "connecting to maintenance database");
    let admin = connect(&settings.with_database(maintenance_db), connect_timeout).await?;
    let created = match database_exists(&admin, target).await {
        Ok(true) => {
            info!(database = target, "database already exists");
            Ok(false)
        }
        Ok(false) => {
            info!(database = target, "creating database");
            create_database(&admin, target).await
        }
        Err(e) => Err(e),
    };
    admin.close().await;
    let created = created?;

    info!(database = target, "verifying connection");
    let pool = connect(settings, connect_timeout).await?;
    let server = server_info(&pool, settings).await;
    pool.close().await;

    Ok(SetupOutcome {
        database: target.to_string(),
        created,
        server: server?,
    })
}

fn setup_error(database: &str, source: sqlx::Error) -> ReportError {
    if is_connection_error(&source) {
        ReportError::ConnectionFailure { source }
    } else {
        ReportError::Setup {
            database: database.to_string(),
            source,
        }
    }
}
