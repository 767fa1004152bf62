//! Core database capability traits
//!
//! These traits abstract the underlying driver into the small set of
//! capabilities the storage core consumes: execute a statement, scan rows,
//! open a transaction, walk a server-side cursor, and report the dialect.
//! Everything above this seam is driver-agnostic and testable with
//! in-memory implementations.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::{StorageError, StorageResult};

/// SQL dialect of the connected backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Dialect name as reported in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Bind-parameter placeholder for the 1-based position `n`
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Quote an identifier for use in a statement
    pub fn quote(&self, identifier: &str) -> String {
        // double-quote syntax is shared by postgres and sqlite
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}

/// Parameter and column value enumeration, limited to the types this
/// store actually persists
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    /// Zone-naive timestamp as stored on disk; see [`crate::temporal`]
    /// for the read-side reinterpretation rules
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_big_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(i64::from(*i)),
            SqlValue::BigInt(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            SqlValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }
}

/// A single result row
pub trait Row: Send + Sync {
    /// Get a column value by name
    fn get(&self, column: &str) -> StorageResult<SqlValue>;

    /// Names of all columns in the row
    fn column_names(&self) -> Vec<String>;
}

/// Typed record decodable from a result row
pub trait Record: Sized + Send + 'static {
    fn from_row(row: &dyn Row) -> StorageResult<Self>;
}

/// An open transaction. Dropping without commit rolls back at the
/// driver level.
#[async_trait]
pub trait Transaction: Send {
    /// Execute a statement within the transaction, returning affected rows
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Roll the transaction back
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// An open database connection
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement and return the affected row count
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64>;

    /// Execute a query and return all result rows
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Vec<Box<dyn Row>>>;

    /// Execute a query and return the first result row, if any
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Option<Box<dyn Row>>>;

    /// Begin a transaction scoped to this connection
    async fn begin<'a>(&'a mut self) -> StorageResult<Box<dyn Transaction + 'a>>;

    /// SQL dialect of the backend
    fn dialect(&self) -> Dialect;
}

/// A server-side cursor over a result set, consumed row by row so that
/// memory stays bounded regardless of result-set size
#[async_trait]
pub trait RowCursor: Send {
    /// Fetch the next row; `None` signals exhaustion
    async fn next_row(&mut self) -> StorageResult<Option<Box<dyn Row>>>;

    /// Release the underlying result set. Must be safe to call more than
    /// once; the streamer calls it on every exit path.
    async fn close(&mut self);
}

/// Decode helper: a required column of the expected type, or a
/// [`StorageError::Decode`] naming the column
pub fn require_column(row: &dyn Row, column: &str) -> StorageResult<SqlValue> {
    let value = row.get(column)?;
    if value.is_null() {
        return Err(StorageError::Decode(format!(
            "column '{}' is unexpectedly null",
            column
        )));
    }
    Ok(value)
}
