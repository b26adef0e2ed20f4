//! Templated batch SQL execution.
//!
//! A script template is rendered with [`SqlScript::render`], split into
//! [`Statement`]s by [`split`], and run statement by statement by
//! [`BatchSqlExecutor`]. The database itself sits behind the
//! [`SqlConnector`]/[`SqlConnection`] traits.

mod clickhouse;
mod connection;
mod executor;
mod splitter;
mod template;

pub use clickhouse::{ClickHouseConnection, ClickHouseConnector};
pub use connection::{CommandOutcome, ConnectionGuard, SqlConnection, SqlConnector, SqlError};
pub use executor::{
    AccountingQueries, BatchSqlExecutor, ExportAccounting, ScriptReport, StatementResult,
    DEFAULT_EXPORT_TABLE, LOG_PREVIEW_CHARS, RESULT_PREVIEW_CHARS,
};
pub use splitter::{split, Statement, COMMENT_MARKER, STATEMENT_TERMINATOR};
pub use template::{
    SqlScript, TemplateVariables, S3_ACCESS_KEY, S3_BUCKET, S3_ENDPOINT, S3_SECRET_KEY,
};
