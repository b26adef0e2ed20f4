//! The database seam used by [`BatchSqlExecutor`](super::BatchSqlExecutor).

use crate::errors::{ConnectionError, ExportflowError};
use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single round trip.
#[derive(Debug, Clone, Error)]
pub enum SqlError {
    /// The server could not be reached.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// The server rejected the query.
    #[error("server error{}: {message}", code.map(|c| format!(" {c}")).unwrap_or_default())]
    Server {
        /// Protocol-level status code, if any.
        code: Option<u16>,
        /// The server's error text.
        message: String,
    },
}

impl SqlError {
    /// Creates a server-side error.
    #[must_use]
    pub fn server(code: Option<u16>, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }
}

impl From<SqlError> for ExportflowError {
    fn from(err: SqlError) -> Self {
        match err {
            SqlError::Connection(conn) => Self::Connection(conn),
            SqlError::Server { .. } => Self::Step(err.to_string()),
        }
    }
}

/// Acknowledgement of a non-row-returning statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Text returned by the server, if any.
    pub output: Option<String>,
    /// Rows written or removed, when the server reports it.
    pub affected_rows: Option<u64>,
}

impl CommandOutcome {
    /// An acknowledgement with nothing to report.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An acknowledgement reporting affected rows.
    #[must_use]
    pub fn affected(rows: u64) -> Self {
        Self {
            output: None,
            affected_rows: Some(rows),
        }
    }
}

/// An open database session.
///
/// Each call is one round trip. There is no transaction spanning calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlConnection: Send {
    /// Runs a read-only query returning a single integer.
    ///
    /// Returns `None` when the query produced no rows.
    async fn query_scalar(&mut self, sql: &str) -> Result<Option<u64>, SqlError>;

    /// Executes a statement.
    async fn execute(&mut self, sql: &str) -> Result<CommandOutcome, SqlError>;

    /// Releases the session. Called exactly once.
    fn release(&mut self);
}

/// Opens database sessions.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    /// Human-readable target, for logs and errors.
    fn target(&self) -> String;

    /// Opens a new session.
    async fn connect(&self) -> Result<Box<dyn SqlConnection>, ExportflowError>;
}

/// Scoped ownership of a session; releases it when dropped.
pub struct ConnectionGuard {
    connection: Box<dyn SqlConnection>,
}

impl ConnectionGuard {
    /// Opens a session through `connector` and guards it.
    pub async fn acquire(connector: &dyn SqlConnector) -> Result<Self, ExportflowError> {
        tracing::info!(target_db = %connector.target(), "Connecting to database");
        let connection = connector.connect().await?;
        Ok(Self { connection })
    }

    /// Wraps an already open session.
    #[must_use]
    pub fn new(connection: Box<dyn SqlConnection>) -> Self {
        Self { connection }
    }

    /// Returns the guarded session.
    pub fn connection(&mut self) -> &mut dyn SqlConnection {
        self.connection.as_mut()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connection.release();
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard").finish_non_exhaustive()
    }
}
