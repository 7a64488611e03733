use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgConnectOptions;

use crate::app::cli::{Cli, OutputFormat};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-query time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeouts {
    pub catalog: Duration,
    pub count: Duration,
}

impl Default for QueryTimeouts {
    fn default() -> Self {
        Self {
            catalog: Duration::from_secs(5),
            count: Duration::from_secs(30),
        }
    }
}

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

// Hand-written so the password never ends up in logs.
impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DbSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }

    /// Same server and credentials, different database.
    pub fn with_database(&self, database: &str) -> Self {
        Self {
            database: database.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db: DbSettings,
    pub schema: String,
    pub connect_timeout: Duration,
    pub timeouts: QueryTimeouts,
    pub format: OutputFormat,
}

pub fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    // Load environment variables from the dotenv file if present
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    resolve_with(cli, |key| env::var(key).ok())
}

/// Resolves settings with CLI flags taking precedence over `lookup`.
pub fn resolve_with<F>(cli: &Cli, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let host = cli
        .host
        .clone()
        .or_else(|| lookup("POSTGRES_HOST"))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match cli.port {
        Some(port) => port,
        None => match lookup("POSTGRES_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("POSTGRES_PORT is not a valid port: {raw:?}"))?,
            None => DEFAULT_PORT,
        },
    };

    let database = cli
        .database
        .clone()
        .or_else(|| lookup("POSTGRES_DB"))
        .context("POSTGRES_DB must be set via --database or in .env/environment variables")?;

    let user = cli
        .user
        .clone()
        .or_else(|| lookup("POSTGRES_USER"))
        .context("POSTGRES_USER must be set via --user or in .env/environment variables")?;

    let password = lookup("POSTGRES_PASSWORD");

    let schema = cli
        .schema
        .clone()
        .or_else(|| lookup("POSTGRES_SCHEMA"))
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());

    let defaults = QueryTimeouts::default();
    let connect_timeout =
        seconds(&lookup, "PG_PROBE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT)?;
    let timeouts = QueryTimeouts {
        catalog: seconds(&lookup, "PG_PROBE_CATALOG_TIMEOUT_SECS", defaults.catalog)?,
        count: seconds(&lookup, "PG_PROBE_COUNT_TIMEOUT_SECS", defaults.count)?,
    };

    Ok(AppConfig {
        db: DbSettings {
            host,
            port,
            database,
            user,
            password,
        },
        schema,
        connect_timeout,
        timeouts,
        format: cli.format,
    })
}

fn seconds<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds, got {raw:?}"))?;
    anyhow::ensure!(secs > 0, "{key} must be greater than zero");
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn resolve(args: &[&str], pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let cli = Cli::try_parse_from(args).unwrap();
        let vars = env_of(pairs);
        resolve_with(&cli, |k| vars.get(k).cloned())
    }

    #[test]
    fn reads_environment() {
        let config = resolve(
            &["pg-probe"],
            &[
                ("POSTGRES_HOST", "db.internal"),
                ("POSTGRES_PORT", "6543"),
                ("POSTGRES_DB", "Uk_collision"),
                ("POSTGRES_USER", "analyst"),
                ("POSTGRES_PASSWORD", "s3cret"),
            ],
        )
        .unwrap();

        assert_eq!(config.db.host, "db.internal");
        assert_eq!(config.db.port, 6543);
        assert_eq!(config.db.database, "Uk_collision");
        assert_eq!(config.db.user, "analyst");
        assert_eq!(config.db.password.as_deref(), Some("s3cret"));
        assert_eq!(config.schema, "public");
        assert_eq!(config.timeouts, QueryTimeouts::default());
    }

    #[test]
    fn flags_override_environment() {
        let config = resolve(
            &["pg-probe", "--host", "cli-host", "-d", "cli_db", "--schema", "staging"],
            &[
                ("POSTGRES_HOST", "env-host"),
                ("POSTGRES_DB", "env_db"),
                ("POSTGRES_USER", "analyst"),
                ("POSTGRES_SCHEMA", "env_schema"),
            ],
        )
        .unwrap();

        assert_eq!(config.db.host, "cli-host");
        assert_eq!(config.db.database, "cli_db");
        assert_eq!(config.schema, "staging");
        assert_eq!(config.db.port, DEFAULT_PORT);
    }

    #[test]
    fn missing_database_is_an_error() {
        let err = resolve(&["pg-probe"], &[("POSTGRES_USER", "analyst")]).unwrap_err();
        assert!(err.to_string().contains("POSTGRES_DB"));
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = resolve(
            &["pg-probe"],
            &[
                ("POSTGRES_DB", "db"),
                ("POSTGRES_USER", "u"),
                ("POSTGRES_PORT", "fifty"),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("POSTGRES_PORT"));
    }

    #[test]
    fn timeouts_from_environment() {
        let config = resolve(
            &["pg-probe"],
            &[
                ("POSTGRES_DB", "db"),
                ("POSTGRES_USER", "u"),
                ("PG_PROBE_COUNT_TIMEOUT_SECS", "120"),
            ],
        )
        .unwrap();
        assert_eq!(config.timeouts.count, Duration::from_secs(120));
        assert_eq!(config.timeouts.catalog, Duration::from_secs(5));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let result = resolve(
            &["pg-probe"],
            &[
                ("POSTGRES_DB", "db"),
                ("POSTGRES_USER", "u"),
                ("PG_PROBE_CATALOG_TIMEOUT_SECS", "0"),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn debug_hides_password() {
        let settings = DbSettings {
            host: "h".into(),
            port: 1,
            database: "d".into(),
            user: "u".into(),
            password: Some("hunter2".into()),
        };
        let printed = format!("{settings:?}");
        assert!(!printed.contains("hunter2"));
        assert_eq!(settings.with_database("postgres").database, "postgres");
    }
}
