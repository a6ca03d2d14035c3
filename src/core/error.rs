//! Error types for the mapper
//!
//! This module defines all error types that can occur while mapping records and
//! running statements.

/// Result type alias for mapper operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Affected-row count reported for a batch that hit an optimistic lock conflict
pub const LOCK_CONFLICT_COUNT: i64 = -1;

/// Error types for mapper operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Mapping or call-site misconfiguration (unregistered type, bad key setup, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error returned by a record lifecycle hook
    #[error("{0}")]
    Hook(String),

    /// Update or delete on a versioned table matched no row
    #[error("Optimistic lock conflict: row was modified or deleted concurrently")]
    OptimisticLock,

    /// Query returned no rows where one was required
    #[error("No rows in result set")]
    NoRows,

    /// Value is longer than the column's configured maximum size
    #[error("Value too long for column {column}: {actual} > {max}")]
    ValueTooLong {
        column: String,
        max: usize,
        actual: usize,
    },

    /// Connection error (generic)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Connection timeout
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query timeout
    #[error("Query timeout after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// The call's context was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Type conversion error
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// MySQL error
    #[cfg(feature = "mysql")]
    #[error("MySQL error: {0}")]
    MysqlError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Configuration(msg.into())
    }

    /// Create a hook error
    pub fn hook<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Hook(msg.into())
    }

    /// Create a new connection error (generic)
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a connection timeout error
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        DatabaseError::ConnectionTimeout { timeout_ms }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a query timeout error
    pub fn query_timeout(timeout_ms: u64) -> Self {
        DatabaseError::QueryTimeout { timeout_ms }
    }

    /// Create a new type mismatch error
    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        DatabaseError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Error returned when a finished transaction is used again
    pub fn transaction_done() -> Self {
        DatabaseError::TransactionError(
            "transaction has already been committed or rolled back".to_string(),
        )
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }

    /// Check whether this is the distinguished "no rows" condition
    pub fn is_no_rows(&self) -> bool {
        matches!(self, DatabaseError::NoRows)
    }

    /// Check whether this is an optimistic lock conflict
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, DatabaseError::OptimisticLock)
    }

    /// Aggregate row count that accompanies this error for batch update/delete calls.
    ///
    /// A lock conflict anywhere in a batch makes the whole call report `-1`, whatever
    /// the records before it did. Other errors carry no count.
    pub fn rows_affected(&self) -> Option<i64> {
        match self {
            DatabaseError::OptimisticLock => Some(LOCK_CONFLICT_COUNT),
            _ => None,
        }
    }
}

#[cfg(feature = "mysql")]
impl From<mysql_async::Error> for DatabaseError {
    fn from(e: mysql_async::Error) -> Self {
        DatabaseError::MysqlError(e.to_string())
    }
}
