//! Sequential batch execution and dry-run accounting.

use super::connection::{ConnectionGuard, SqlConnector, SqlError};
use super::splitter::Statement;
use crate::errors::{ExportflowError, StatementExecutionError};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Table holding raw rows awaiting export.
pub const DEFAULT_EXPORT_TABLE: &str = "playground.ipfix_raw_data";

/// Characters of a statement written to the log before execution.
pub const LOG_PREVIEW_CHARS: usize = 150;

/// Characters of a statement kept in its [`StatementResult`].
pub const RESULT_PREVIEW_CHARS: usize = 100;

/// Row counts reported by a dry run.
///
/// The three counts come from three separate queries and need not add up if
/// rows arrive in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportAccounting {
    /// Rows with `exported = 0`.
    pub unexported_rows: u64,
    /// Rows with `exported = 1`.
    pub exported_rows: u64,
    /// All rows.
    pub total_rows: u64,
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementResult {
    /// 1-based statement number.
    pub statement_number: usize,
    /// First characters of the statement.
    pub preview: String,
    /// Text returned by the server, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Rows affected, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
}

/// Ordered results of a live script run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptReport {
    /// One entry per executed statement, in order.
    pub results: Vec<StatementResult>,
}

impl ScriptReport {
    /// Number of statements executed.
    #[must_use]
    pub fn statements_executed(&self) -> usize {
        self.results.len()
    }

    /// Sum of the affected-row counts that were reported.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.results.iter().filter_map(|r| r.affected_rows).sum()
    }
}

/// The three read-only queries issued by a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingQueries {
    /// Counts rows not yet exported.
    pub unexported: String,
    /// Counts rows already exported.
    pub exported: String,
    /// Counts all rows.
    pub total: String,
}

impl AccountingQueries {
    /// Builds the queries for `table`.
    #[must_use]
    pub fn for_table(table: &str) -> Self {
        Self {
            unexported: format!("SELECT count(*) AS cnt FROM {table} WHERE exported = 0"),
            exported: format!("SELECT count(*) AS cnt FROM {table} WHERE exported = 1"),
            total: format!("SELECT count(*) AS cnt FROM {table}"),
        }
    }
}

/// Executes split scripts and accounting queries against one connection
/// per call.
#[derive(Debug, Clone)]
pub struct BatchSqlExecutor {
    queries: AccountingQueries,
    log_preview_chars: usize,
}

impl Default for BatchSqlExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_EXPORT_TABLE)
    }
}

impl BatchSqlExecutor {
    /// Creates an executor whose dry run counts rows in `table`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            queries: AccountingQueries::for_table(table),
            log_preview_chars: LOG_PREVIEW_CHARS,
        }
    }

    /// Sets how much of each statement is logged.
    #[must_use]
    pub fn with_log_preview_chars(mut self, chars: usize) -> Self {
        self.log_preview_chars = chars;
        self
    }

    /// Returns the dry-run queries.
    #[must_use]
    pub fn accounting_queries(&self) -> &AccountingQueries {
        &self.queries
    }

    /// Counts unexported, exported and total rows without writing anything.
    pub async fn execute_dry_run(
        &self,
        connector: &dyn SqlConnector,
    ) -> Result<ExportAccounting, ExportflowError> {
        let mut guard = ConnectionGuard::acquire(connector).await?;
        let conn = guard.connection();

        info!("DRY RUN MODE - Counting rows only");

        let queries = &self.queries;

        let unexported_rows = count(conn.query_scalar(&queries.unexported).await, 1, &queries.unexported)?;
        info!(unexported_rows, "Unexported rows (exported = 0)");

        let exported_rows = count(conn.query_scalar(&queries.exported).await, 2, &queries.exported)?;
        info!(exported_rows, "Exported rows (exported = 1)");

        let total_rows = count(conn.query_scalar(&queries.total).await, 3, &queries.total)?;
        info!(total_rows, "Total rows");

        info!("DRY RUN COMPLETE - No data was exported or deleted");

        Ok(ExportAccounting {
            unexported_rows,
            exported_rows,
            total_rows,
        })
    }

    /// Executes `statements` in order, stopping at the first failure.
    ///
    /// Statements that ran before a failure stay applied.
    pub async fn execute_script(
        &self,
        connector: &dyn SqlConnector,
        statements: &[Statement],
    ) -> Result<ScriptReport, ExportflowError> {
        let mut guard = ConnectionGuard::acquire(connector).await?;
        let conn = guard.connection();
        let total = statements.len();

        info!(statements = total, "Parsed SQL statements from script");

        let mut report = ScriptReport::default();
        for statement in statements {
            info!(
                statement = statement.index,
                total,
                preview = %statement.preview(self.log_preview_chars),
                "Executing statement"
            );

            match conn.execute(&statement.text).await {
                Ok(outcome) => {
                    info!(statement = statement.index, "Statement completed successfully");
                    report.results.push(StatementResult {
                        statement_number: statement.index,
                        preview: statement.preview(RESULT_PREVIEW_CHARS),
                        result: outcome.output.filter(|s| !s.is_empty()),
                        affected_rows: outcome.affected_rows,
                    });
                }
                Err(e) => {
                    error!(statement = statement.index, error = %e, "Statement failed");
                    error!(statement = statement.index, "Full statement:\n{}", statement.text);
                    return Err(StatementExecutionError::new(
                        statement.index,
                        statement.preview(RESULT_PREVIEW_CHARS),
                        statement.text.clone(),
                        e.to_string(),
                    )
                    .into());
                }
            }
        }

        info!(statements = total, "All statements executed successfully");
        Ok(report)
    }
}

fn count(
    result: Result<Option<u64>, SqlError>,
    index: usize,
    query: &str,
) -> Result<u64, ExportflowError> {
    match result {
        Ok(value) => Ok(value.unwrap_or(0)),
        Err(SqlError::Connection(e)) => Err(e.into()),
        Err(e) => Err(StatementExecutionError::new(index, query, query, e.to_string()).into()),
    }
}
