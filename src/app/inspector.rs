use std::time::Duration;

use sqlx::{PgPool, Postgres, Transaction};
use tokio::time;
use tracing::{debug, info, warn};

use crate::app::config::QueryTimeouts;
use crate::app::error::{QueryPhase, ReportError, sqlstate};
use crate::app::models::{Report, SkippedTable, TableDescriptor};

/// SQLSTATE `query_canceled`, raised when `statement_timeout` fires server-side.
const QUERY_CANCELED: &str = "57014";

/// Extra client-side wait so the server's own cancellation normally wins.
const CLIENT_GRACE: Duration = Duration::from_secs(1);

const LIST_TABLES: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

// It handles all database interaction for the table report.
// The pool is borrowed: opening and closing it is the caller's job.
pub struct Inspector<'a> {
    pool: &'a PgPool,
    timeouts: QueryTimeouts,
}

impl<'a> Inspector<'a> {
    pub fn new(pool: &'a PgPool, timeouts: QueryTimeouts) -> Self {
        Self { pool, timeouts }
    }

    /// Lists the tables of `schema` and counts the rows of each one.
    ///
    /// Tables that vanish, cannot be read, or take too long to count are
    /// recorded in [`Report::skipped`]; any other failure aborts the scan.
    pub async fn scan(&self, schema: &str) -> Result<Report, ReportError> {
        let names = self.list_tables(schema).await?;
        info!(schema, tables = names.len(), "listed tables");

        let mut report = Report {
            schema: schema.to_string(),
            tables: Vec::with_capacity(names.len()),
            skipped: Vec::new(),
        };

        for name in names {
            match self.count_rows(schema, &name).await {
                Ok(row_count) => report.tables.push(TableDescriptor { name, row_count }),
                Err(err) => match err.skip_reason() {
                    Some(reason) => {
                        warn!(table = %name, error = %err, "skipping table");
                        report.skipped.push(SkippedTable { name, reason });
                    }
                    None => return Err(err),
                },
            }
        }

        Ok(report)
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<String>, ReportError> {
        let budget = self.timeouts.catalog;
        let work = async {
            let mut tx = self.begin_with_budget(budget).await?;
            let names = sqlx::query_scalar::<_, String>(LIST_TABLES)
                .bind(schema)
                .fetch_all(&mut *tx)
                .await?;
            tx.rollback().await?;
            Ok::<_, sqlx::Error>(names)
        };

        match time::timeout(budget + CLIENT_GRACE, work).await {
            Ok(Ok(names)) => Ok(names),
            Ok(Err(e)) if is_canceled(&e) => Err(catalog_timeout(schema, budget)),
            Ok(Err(e)) => Err(ReportError::from_catalog(schema, e)),
            Err(_) => Err(catalog_timeout(schema, budget)),
        }
    }

    async fn count_rows(&self, schema: &str, table: &str) -> Result<u64, ReportError> {
        let budget = self.timeouts.count;
        let sql = count_query(schema, table);
        debug!(%sql, "counting rows");

        let work = async {
            let mut tx = self.begin_with_budget(budget).await?;
            let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut *tx).await?;
            tx.rollback().await?;
            Ok::<_, sqlx::Error>(count)
        };

        let count = match time::timeout(budget + CLIENT_GRACE, work).await {
            Ok(Ok(count)) => count,
            Ok(Err(e)) if is_canceled(&e) => return Err(count_timeout(table, budget)),
            Ok(Err(e)) => return Err(ReportError::from_count(table, e)),
            Err(_) => return Err(count_timeout(table, budget)),
        };

        // COUNT(*) is never negative.
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Opens a transaction whose statements the server cancels after `budget`,
    /// so a slow table never holds the connection past its own budget.
    async fn begin_with_budget(
        &self,
        budget: Duration,
    ) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&statement_timeout_sql(budget))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

/// `SET LOCAL` does not accept bind parameters, so the budget is inlined as whole milliseconds.
pub(crate) fn statement_timeout_sql(budget: Duration) -> String {
    format!(
        "SET LOCAL statement_timeout = {}",
        budget.as_millis().max(1)
    )
}

fn is_canceled(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(QUERY_CANCELED)
}

fn catalog_timeout(schema: &str, after: Duration) -> ReportError {
    ReportError::Timeout {
        phase: QueryPhase::Catalog {
            schema: schema.to_string(),
        },
        after,
    }
}

fn count_timeout(table: &str, after: Duration) -> ReportError {
    ReportError::Timeout {
        phase: QueryPhase::Count {
            table: table.to_string(),
        },
        after,
    }
}

/// Quotes `ident` as a PostgreSQL delimited identifier.
///
/// The name is wrapped in double quotes and embedded double quotes are
/// doubled, so `Order Details` or `select` are read as one literal name.
pub fn quote_identifier(ident: &str) -> String {
    let mut quoted = String::with_capacity(ident.len() + 2);
    quoted.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Builds the row-count statement for a schema-qualified table.
pub fn count_query(schema: &str, table: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM {}.{}",
        quote_identifier(schema),
        quote_identifier(table)
    )
}

/// Produces a fresh [`Report`] for `schema` over an already-open pool.
pub async fn generate_report(
    pool: &PgPool,
    schema: &str,
    timeouts: QueryTimeouts,
) -> Result<Report, ReportError> {
    Inspector::new(pool, timeouts).scan(schema).await
}
