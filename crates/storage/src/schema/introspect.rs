//! Live schema introspection
//!
//! Migration units query the actual schema state before mutating it, so
//! a unit interrupted between its external effects and its ledger record
//! is safe to retry. Queries hit the catalog at call time; nothing is
//! cached across calls.

use tracing::info;

use crate::backend::{Connection, Dialect, SqlValue};
use crate::error::{StorageError, StorageResult};

/// An index on a table, as reported by the backend catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndex {
    pub table: String,
    pub name: String,
    /// Covered columns in index order
    pub columns: Vec<String>,
}

/// Read-and-repair view of the live schema, scoped to one connection
pub struct SchemaIntrospector<'a> {
    conn: &'a mut dyn Connection,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(conn: &'a mut dyn Connection) -> Self {
        Self { conn }
    }

    /// Whether a table exists in the current schema
    pub async fn table_exists(&mut self, table: &str) -> StorageResult<bool> {
        let (sql, params) = match self.conn.dialect() {
            Dialect::Postgres => (
                "SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
                vec![SqlValue::Text(table.to_string())],
            ),
            Dialect::Sqlite => (
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?",
                vec![SqlValue::Text(table.to_string())],
            ),
        };
        let row = self.conn.fetch_optional(sql, &params).await?;
        Ok(row.is_some())
    }

    /// Whether a named constraint exists on the given table
    pub async fn constraint_exists(&mut self, table: &str, name: &str) -> StorageResult<bool> {
        match self.conn.dialect() {
            Dialect::Postgres => {
                let sql = "SELECT 1 FROM information_schema.table_constraints \
                           WHERE table_name = $1 AND constraint_name = $2";
                let params = vec![
                    SqlValue::Text(table.to_string()),
                    SqlValue::Text(name.to_string()),
                ];
                let row = self.conn.fetch_optional(sql, &params).await?;
                Ok(row.is_some())
            }
            other => Err(StorageError::Introspection(format!(
                "constraint introspection not implemented for dialect '{}'",
                other.name()
            ))),
        }
    }

    /// All indexes on the given table, with their covered columns in
    /// index order
    pub async fn index_info(&mut self, table: &str) -> StorageResult<Vec<SchemaIndex>> {
        match self.conn.dialect() {
            Dialect::Postgres => {
                let sql = "SELECT i.relname AS index_name, a.attname AS column_name \
                           FROM pg_class t \
                           JOIN pg_index ix ON t.oid = ix.indrelid \
                           JOIN pg_class i ON i.oid = ix.indexrelid \
                           JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
                           WHERE t.relname = $1 \
                           ORDER BY i.relname, array_position(ix.indkey, a.attnum)";
                let params = vec![SqlValue::Text(table.to_string())];
                let rows = self.conn.fetch_all(sql, &params).await?;

                let mut indexes: Vec<SchemaIndex> = Vec::new();
                for row in rows {
                    let name = row
                        .get("index_name")?
                        .as_text()
                        .ok_or_else(|| {
                            StorageError::Introspection("non-text index name".to_string())
                        })?
                        .to_string();
                    let column = row
                        .get("column_name")?
                        .as_text()
                        .ok_or_else(|| {
                            StorageError::Introspection("non-text column name".to_string())
                        })?
                        .to_string();
                    match indexes.last_mut() {
                        Some(last) if last.name == name => last.columns.push(column),
                        _ => indexes.push(SchemaIndex {
                            table: table.to_string(),
                            name,
                            columns: vec![column],
                        }),
                    }
                }
                Ok(indexes)
            }
            other => Err(StorageError::Introspection(format!(
                "index introspection not implemented for dialect '{}'",
                other.name()
            ))),
        }
    }

    /// Drop a constraint by name
    pub async fn drop_constraint(&mut self, table: &str, name: &str) -> StorageResult<()> {
        let dialect = self.conn.dialect();
        let sql = format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            dialect.quote(table),
            dialect.quote(name)
        );
        info!(table = table, constraint = name, "dropping constraint");
        self.conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Drop an index by name
    pub async fn drop_index(&mut self, table: &str, name: &str) -> StorageResult<()> {
        let dialect = self.conn.dialect();
        let sql = format!("DROP INDEX {}", dialect.quote(name));
        info!(table = table, index = name, "dropping index");
        self.conn.execute(&sql, &[]).await?;
        Ok(())
    }
}
