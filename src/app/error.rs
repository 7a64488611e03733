//! Error taxonomy for probing a database.
//!
//! Connection and catalog errors abort a report. Per-table errors that only
//! affect one table (missing, not permitted, too slow) are turned into
//! [`SkippedTable`](crate::app::models::SkippedTable) entries by the inspector.

use std::fmt;
use std::time::Duration;

use crate::app::models::SkipReason;

/// SQLSTATE `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";
/// SQLSTATE `insufficient_privilege`.
const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE `invalid_catalog_name`, raised when the target database is missing.
const INVALID_CATALOG_NAME: &str = "3D000";
/// SQLSTATE `cannot_connect_now`.
const CANNOT_CONNECT_NOW: &str = "57P03";

/// Which query a timeout interrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPhase {
    Connect { host: String, port: u16 },
    Catalog { schema: String },
    Count { table: String },
}

impl fmt::Display for QueryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { host, port } => write!(f, "connecting to {host}:{port}"),
            Self::Catalog { schema } => write!(f, "listing tables in schema `{schema}`"),
            Self::Count { table } => write!(f, "counting rows in `{table}`"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("cannot reach or authenticate to the database server: {source}")]
    ConnectionFailure { source: sqlx::Error },

    #[error("listing tables in schema `{schema}` failed: {source}")]
    CatalogQueryFailure { schema: String, source: sqlx::Error },

    #[error("table `{table}` no longer exists")]
    TableNotFound { table: String },

    #[error("permission denied counting rows in `{table}`")]
    PermissionDenied { table: String },

    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: QueryPhase, after: Duration },

    #[error("counting rows in `{table}` failed: {source}")]
    QueryFailure { table: String, source: sqlx::Error },

    #[error("creating database `{database}` failed: {source}")]
    Setup { database: String, source: sqlx::Error },
}

impl ReportError {
    /// Classifies a failure of the catalog listing query.
    pub(crate) fn from_catalog(schema: &str, err: sqlx::Error) -> Self {
        if is_connection_error(&err) {
            Self::ConnectionFailure { source: err }
        } else {
            Self::CatalogQueryFailure {
                schema: schema.to_string(),
                source: err,
            }
        }
    }

    /// Classifies a failure of a single `COUNT(*)` query.
    pub(crate) fn from_count(table: &str, err: sqlx::Error) -> Self {
        match sqlstate(&err).as_deref() {
            Some(UNDEFINED_TABLE) => Self::TableNotFound {
                table: table.to_string(),
            },
            Some(INSUFFICIENT_PRIVILEGE) => Self::PermissionDenied {
                table: table.to_string(),
            },
            _ if is_connection_error(&err) => Self::ConnectionFailure { source: err },
            _ => Self::QueryFailure {
                table: table.to_string(),
                source: err,
            },
        }
    }

    /// The skip reason if this error only invalidates a single table.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::TableNotFound { .. } => Some(SkipReason::NotFound),
            Self::PermissionDenied { .. } => Some(SkipReason::PermissionDenied),
            Self::Timeout {
                phase: QueryPhase::Count { .. },
                ..
            } => Some(SkipReason::Timeout),
            _ => None,
        }
    }

    /// Short user-facing category used as the headline of an error message.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConnectionFailure { .. } => "Connection failed",
            Self::CatalogQueryFailure { .. } => "Server reachable but listing tables failed",
            Self::TableNotFound { .. } | Self::PermissionDenied { .. } => "Table inaccessible",
            Self::Timeout {
                phase: QueryPhase::Connect { .. },
                ..
            } => "Connection timed out",
            Self::Timeout { .. } => "Query timed out",
            Self::QueryFailure { .. } => "Server reachable but query failed",
            Self::Setup { .. } => "Database operation failed",
        }
    }

    /// Things worth checking for this kind of failure.
    pub fn hints(&self) -> &'static [&'static str] {
        match self {
            Self::ConnectionFailure { .. } => &[
                "PostgreSQL service is not running",
                "Host/port is incorrect",
                "Username/password is incorrect",
                "The target database does not exist (run `pg-probe setup`)",
                "PostgreSQL is not accepting connections",
            ],
            Self::CatalogQueryFailure { .. } => &[
                "The schema name is misspelled",
                "The user lacks USAGE on the schema",
            ],
            Self::Timeout {
                phase: QueryPhase::Connect { .. },
                ..
            } => &[
                "The server is not answering on that host/port",
                "A firewall is dropping the connection",
                "Raise the limit with PG_PROBE_CONNECT_TIMEOUT_SECS",
            ],
            Self::Timeout { .. } => &[
                "Raise the limit with PG_PROBE_COUNT_TIMEOUT_SECS or PG_PROBE_CATALOG_TIMEOUT_SECS",
            ],
            Self::Setup { .. } => &["The user needs the CREATEDB privilege"],
            _ => &[],
        }
    }
}

/// Extracts the SQLSTATE code of a server-side error.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// True when the error means the server could not be reached or refused the session.
pub(crate) fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(_) => sqlstate(err).is_some_and(|code| {
            // Class 08 is connection exception, class 28 is invalid authorization.
            code.starts_with("08")
                || code.starts_with("28")
                || code == INVALID_CATALOG_NAME
                || code == CANNOT_CONNECT_NOW
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::io;

    /// Server error carrying only a SQLSTATE.
    #[derive(Debug)]
    struct ServerError(&'static str);

    impl fmt::Display for ServerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "server error {}", self.0)
        }
    }

    impl std::error::Error for ServerError {}

    impl DatabaseError for ServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn server(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ServerError(code)))
    }

    fn refused() -> sqlx::Error {
        sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }

    #[test]
    fn undefined_table_becomes_table_not_found() {
        let err = ReportError::from_count("vehicles", server(UNDEFINED_TABLE));
        assert!(matches!(err, ReportError::TableNotFound { ref table } if table == "vehicles"));
        assert_eq!(err.skip_reason(), Some(SkipReason::NotFound));
    }

    #[test]
    fn insufficient_privilege_becomes_permission_denied() {
        let err = ReportError::from_count("payroll", server(INSUFFICIENT_PRIVILEGE));
        assert!(matches!(err, ReportError::PermissionDenied { ref table } if table == "payroll"));
        assert_eq!(err.skip_reason(), Some(SkipReason::PermissionDenied));
    }

    #[test]
    fn auth_and_missing_database_are_connection_errors() {
        assert!(is_connection_error(&server("28P01")));
        assert!(is_connection_error(&server(INVALID_CATALOG_NAME)));
        assert!(is_connection_error(&server("08006")));
        assert!(!is_connection_error(&server(UNDEFINED_TABLE)));
    }

    #[test]
    fn other_server_errors_abort_with_table_context() {
        // division_by_zero stands in for any unexpected failure
        let err = ReportError::from_count("accidents", server("22012"));
        assert!(matches!(err, ReportError::QueryFailure { ref table, .. } if table == "accidents"));
        assert!(err.to_string().starts_with("counting rows in `accidents` failed"));
    }

    #[test]
    fn io_errors_are_connection_failures() {
        assert!(is_connection_error(&refused()));
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn catalog_error_keeps_schema_context() {
        let err = ReportError::from_catalog("analytics", sqlx::Error::RowNotFound);
        match &err {
            ReportError::CatalogQueryFailure { schema, .. } => assert_eq!(schema, "analytics"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.skip_reason().is_none());
    }

    #[test]
    fn catalog_error_on_lost_connection_is_connection_failure() {
        let err = ReportError::from_catalog("public", refused());
        assert!(matches!(err, ReportError::ConnectionFailure { .. }));
    }

    #[test]
    fn count_error_without_sqlstate_is_query_failure() {
        let err = ReportError::from_count("accidents", sqlx::Error::RowNotFound);
        assert!(matches!(err, ReportError::QueryFailure { ref table, .. } if table == "accidents"));
        assert!(err.skip_reason().is_none());
    }

    #[test]
    fn per_table_errors_are_skippable() {
        let missing = ReportError::TableNotFound { table: "t".into() };
        let denied = ReportError::PermissionDenied { table: "t".into() };
        let slow = ReportError::Timeout {
            phase: QueryPhase::Count { table: "t".into() },
            after: Duration::from_secs(30),
        };
        assert_eq!(missing.skip_reason(), Some(SkipReason::NotFound));
        assert_eq!(denied.skip_reason(), Some(SkipReason::PermissionDenied));
        assert_eq!(slow.skip_reason(), Some(SkipReason::Timeout));
    }

    #[test]
    fn catalog_timeout_is_fatal() {
        let err = ReportError::Timeout {
            phase: QueryPhase::Catalog {
                schema: "public".into(),
            },
            after: Duration::from_secs(5),
        };
        assert!(err.skip_reason().is_none());
        assert_eq!(
            err.to_string(),
            "listing tables in schema `public` timed out after 5s"
        );
    }

    #[test]
    fn connect_timeout_names_the_server() {
        let err = ReportError::Timeout {
            phase: QueryPhase::Connect {
                host: "db.internal".into(),
                port: 5432,
            },
            after: Duration::from_secs(5),
        };
        assert!(err.skip_reason().is_none());
        assert_eq!(err.to_string(), "connecting to db.internal:5432 timed out after 5s");
        assert_eq!(err.category(), "Connection timed out");
        assert!(err.hints().iter().any(|h| h.contains("PG_PROBE_CONNECT_TIMEOUT_SECS")));
    }

    #[test]
    fn connection_failure_has_hints() {
        let err = ReportError::ConnectionFailure { source: refused() };
        assert_eq!(err.category(), "Connection failed");
        assert!(!err.hints().is_empty());
    }
}
