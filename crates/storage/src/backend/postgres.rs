//! PostgreSQL implementation of the backend capability traits
//!
//! Built on sqlx. Cursors are realized as a forwarding task feeding a
//! small bounded channel, so the storage layer never holds more than a
//! handful of undecoded rows in memory.

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as SqlxRow, TypeInfo, ValueRef};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::core::{Connection, Dialect, Row, RowCursor, SqlValue, Transaction};
use crate::error::{StorageError, StorageResult};

/// Capacity of the cursor's internal row-forwarding channel
const CURSOR_PREFETCH: usize = 64;

/// PostgreSQL backend handle wrapping a connection pool
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect to the given database URL
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(format!("failed to connect: {}", e)))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Acquire a connection from the pool
    pub async fn acquire(&self) -> StorageResult<PostgresConnection> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StorageError::Connection(format!("failed to acquire connection: {}", e)))?;
        Ok(PostgresConnection { conn })
    }

    /// Open a server-side cursor over the given query
    pub fn open_cursor(&self, sql: impl Into<String>, params: Vec<SqlValue>) -> PostgresCursor {
        PostgresCursor::new(self.pool.clone(), sql.into(), params)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A pooled PostgreSQL connection
pub struct PostgresConnection {
    conn: sqlx::pool::PoolConnection<Postgres>,
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::BigInt(i) => query.bind(*i),
        SqlValue::Double(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Timestamp(t) => query.bind(*t),
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let result = query
            .execute(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Vec<Box<dyn Row>>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow { row }) as Box<dyn Row>)
            .collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Option<Box<dyn Row>>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let row = query
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(row.map(|row| Box::new(PostgresRow { row }) as Box<dyn Row>))
    }

    async fn begin<'a>(&'a mut self) -> StorageResult<Box<dyn Transaction + 'a>> {
        use sqlx::Connection as _;
        let tx = self
            .conn
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(format!("failed to begin: {}", e)))?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }
}

/// A PostgreSQL transaction
pub struct PostgresTransaction<'c> {
    tx: sqlx::Transaction<'c, Postgres>,
}

#[async_trait]
impl<'c> Transaction for PostgresTransaction<'c> {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let result = query
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| StorageError::Transaction(format!("failed to commit: {}", e)))
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StorageError::Transaction(format!("failed to rollback: {}", e)))
    }
}

/// A decoded PostgreSQL row
pub struct PostgresRow {
    row: PgRow,
}

impl Row for PostgresRow {
    fn get(&self, column: &str) -> StorageResult<SqlValue> {
        let raw = self
            .row
            .try_get_raw(column)
            .map_err(|e| StorageError::Decode(format!("column '{}': {}", column, e)))?;
        if raw.is_null() {
            return Ok(SqlValue::Null);
        }
        let type_name = raw.type_info().name().to_string();
        drop(raw);

        let decode = |e: sqlx::Error| StorageError::Decode(format!("column '{}': {}", column, e));
        match type_name.as_str() {
            "BOOL" => Ok(SqlValue::Bool(self.row.try_get(column).map_err(decode)?)),
            "INT2" => {
                let v: i16 = self.row.try_get(column).map_err(decode)?;
                Ok(SqlValue::Int(i32::from(v)))
            }
            "INT4" => Ok(SqlValue::Int(self.row.try_get(column).map_err(decode)?)),
            "INT8" => Ok(SqlValue::BigInt(self.row.try_get(column).map_err(decode)?)),
            "FLOAT4" => {
                let v: f32 = self.row.try_get(column).map_err(decode)?;
                Ok(SqlValue::Double(f64::from(v)))
            }
            "FLOAT8" => Ok(SqlValue::Double(self.row.try_get(column).map_err(decode)?)),
            "TIMESTAMP" => Ok(SqlValue::Timestamp(
                self.row.try_get(column).map_err(decode)?,
            )),
            "TIMESTAMPTZ" => {
                let v: chrono::DateTime<chrono::Utc> =
                    self.row.try_get(column).map_err(decode)?;
                Ok(SqlValue::Timestamp(v.naive_utc()))
            }
            _ => Ok(SqlValue::Text(self.row.try_get(column).map_err(decode)?)),
        }
    }

    fn column_names(&self) -> Vec<String> {
        self.row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// Server-side cursor backed by a forwarding task
///
/// The task owns the sqlx fetch stream and pushes rows into a bounded
/// channel; dropping the receiver stops the task at its next send.
pub struct PostgresCursor {
    rx: Option<mpsc::Receiver<Result<PgRow, sqlx::Error>>>,
    handle: Option<JoinHandle<()>>,
}

impl PostgresCursor {
    fn new(pool: PgPool, sql: String, params: Vec<SqlValue>) -> Self {
        let (tx, rx) = mpsc::channel(CURSOR_PREFETCH);
        let handle = tokio::spawn(async move {
            let mut query = sqlx::query(&sql);
            for param in &params {
                query = bind_value(query, param);
            }
            let mut stream = query.fetch(&pool);
            while let Some(item) = stream.next().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        Self {
            rx: Some(rx),
            handle: Some(handle),
        }
    }
}

#[async_trait]
impl RowCursor for PostgresCursor {
    async fn next_row(&mut self) -> StorageResult<Option<Box<dyn Row>>> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(Ok(row)) => Ok(Some(Box::new(PostgresRow { row }) as Box<dyn Row>)),
            Some(Err(e)) => Err(StorageError::Database(e.to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        // dropping the receiver unblocks and terminates the forwarding task
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
