//! Chunked, conflict-tolerant bulk insertion
//!
//! Splits an arbitrarily large input into fixed-size chunks and inserts
//! each as one multi-row statement, all inside a single transaction.
//! Rows whose key already exists are skipped via ON CONFLICT DO NOTHING,
//! so replaying an overlapping time window never duplicates data.

use tracing::debug;

use crate::backend::{Connection, Dialect, SqlValue};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::schema::TableDescriptor;

/// Outcome of a bulk insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkInsertReport {
    /// Rows submitted, including ones skipped as conflicts
    pub submitted: usize,
    /// Rows actually inserted (conflicts excluded)
    pub inserted: u64,
}

/// Inserts record batches in bounded chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkedWriter {
    chunk_size: usize,
}

impl ChunkedWriter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.chunk_size)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Insert all records, at most `chunk_size` rows per statement, in
    /// one transaction. Input order is preserved within and across
    /// chunks; rows that already exist by key are silently skipped; on
    /// any statement failure the whole operation rolls back.
    pub async fn insert_all<T: TableDescriptor>(
        &self,
        records: &[T],
        conn: &mut dyn Connection,
    ) -> StorageResult<BulkInsertReport> {
        if records.is_empty() {
            return Ok(BulkInsertReport {
                submitted: 0,
                inserted: 0,
            });
        }

        let dialect = conn.dialect();
        let mut tx = conn.begin().await?;
        let mut inserted = 0u64;
        for chunk in records.chunks(self.chunk_size) {
            let (sql, params) = build_insert_statement(chunk, dialect)?;
            match tx.execute(&sql, &params).await {
                Ok(affected) => inserted += affected,
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }
        tx.commit().await?;

        debug!(
            table = T::table_name(),
            submitted = records.len(),
            inserted = inserted,
            "bulk insert complete"
        );
        Ok(BulkInsertReport {
            submitted: records.len(),
            inserted,
        })
    }
}

impl Default for ChunkedWriter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CHUNK_SIZE)
    }
}

/// One multi-row INSERT ... ON CONFLICT DO NOTHING statement for a chunk
pub(crate) fn build_insert_statement<T: TableDescriptor>(
    chunk: &[T],
    dialect: Dialect,
) -> StorageResult<(String, Vec<SqlValue>)> {
    let columns = T::columns();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        dialect.quote(T::table_name()),
        columns
            .iter()
            .map(|c| dialect.quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut params: Vec<SqlValue> = Vec::with_capacity(chunk.len() * columns.len());
    for (row_idx, record) in chunk.iter().enumerate() {
        let values = record.insert_values();
        if values.len() != columns.len() {
            return Err(StorageError::Configuration(format!(
                "table '{}' declares {} columns but a record produced {} values",
                T::table_name(),
                columns.len(),
                values.len()
            )));
        }
        if row_idx > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col_idx in 0..columns.len() {
            if col_idx > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&dialect.placeholder(params.len() + col_idx + 1));
        }
        sql.push(')');
        params.extend(values);
    }
    sql.push_str(" ON CONFLICT DO NOTHING");
    Ok((sql, params))
}
