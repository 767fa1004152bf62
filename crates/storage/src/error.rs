//! Error types for the storage core
//!
//! Covers database access, migration execution, ledger bookkeeping,
//! row decoding and wire-timestamp parsing.

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error types for storage operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Database query or statement error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection establishment or acquisition error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction begin/commit/rollback error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A migration unit's action failed; aborts the remaining queue
    #[error("Migration '{unit}' failed: {message}")]
    Migration { unit: String, message: String },

    /// A migration action succeeded but its ledger record could not be
    /// written; on retry the unit will re-execute, so this is surfaced
    /// distinctly from an action failure
    #[error("Migration '{unit}' applied but recording it failed: {message}")]
    Ledger { unit: String, message: String },

    /// Schema introspection query failed or is unsupported for the dialect
    #[error("Schema introspection error: {0}")]
    Introspection(String),

    /// A single row could not be decoded into its record type
    #[error("Row decode error: {0}")]
    Decode(String),

    /// Malformed wire timestamp; fails the decode of that single value only
    #[error("Invalid wire timestamp: {0}")]
    TemporalParse(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}
