#![allow(dead_code)]

//! In-memory backend for the integration tests
//!
//! Dispatches on recognizable statement shapes: ledger bookkeeping,
//! catalog introspection, conflict-tolerant inserts, and DDL. All state
//! sits behind a shared mutex so tests can seed and inspect it directly.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempo_storage::{
    require_column, Connection, Dialect, Record, Row, RowCursor, SqlValue, StorageError,
    StorageResult, TableDescriptor, Transaction,
};

#[derive(Default)]
pub struct MockState {
    /// Applied migration names, in insertion order
    pub ledger: Vec<String>,
    /// Every executed statement, in order
    pub statements: Vec<String>,
    /// Schema-changing statements only
    pub ddl: Vec<String>,
    pub tables: HashSet<String>,
    /// (table, constraint name) pairs
    pub constraints: HashSet<(String, String)>,
    /// (table, index name, covered columns)
    pub indexes: Vec<(String, String, Vec<String>)>,
    /// table -> primary keys present
    pub rows: BTreeMap<String, HashSet<i64>>,
    /// Fail any statement containing this substring
    pub fail_matching: Option<String>,
    /// Fail the nth row-insert statement (1-based)
    pub fail_on_insert_number: Option<usize>,
    insert_statements: usize,
    pub begun: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

impl MockState {
    pub fn row_count(&self, table: &str) -> usize {
        self.rows.get(table).map_or(0, HashSet::len)
    }

    fn check_failure(&self, sql: &str) -> StorageResult<()> {
        if let Some(pattern) = &self.fail_matching {
            if sql.contains(pattern.as_str()) {
                return Err(StorageError::Database(format!(
                    "simulated failure on: {}",
                    sql
                )));
            }
        }
        Ok(())
    }

    /// Execute a statement, returning affected rows and the keys this
    /// statement inserted (for transactional undo)
    fn run(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<(u64, Vec<(String, i64)>)> {
        self.check_failure(sql)?;
        self.statements.push(sql.to_string());

        if sql.starts_with("CREATE TABLE IF NOT EXISTS") {
            return Ok((0, Vec::new()));
        }
        if sql.starts_with("INSERT INTO") && sql.contains("schema_migrations") {
            if let Some(SqlValue::Text(name)) = params.first() {
                self.ledger.push(name.clone());
            }
            return Ok((1, Vec::new()));
        }
        if sql.starts_with("INSERT INTO") {
            return self.insert_rows(sql, params);
        }
        if sql.starts_with("ALTER TABLE") && sql.contains("DROP CONSTRAINT") {
            let names = extract_quoted(sql);
            if names.len() == 2 {
                self.constraints
                    .remove(&(names[0].clone(), names[1].clone()));
            }
            self.ddl.push(sql.to_string());
            return Ok((0, Vec::new()));
        }
        if sql.starts_with("DROP INDEX") {
            let names = extract_quoted(sql);
            if let Some(name) = names.first() {
                self.indexes.retain(|(_, n, _)| n != name);
            }
            self.ddl.push(sql.to_string());
            return Ok((0, Vec::new()));
        }
        if sql.starts_with("ALTER TABLE") {
            self.ddl.push(sql.to_string());
            return Ok((0, Vec::new()));
        }
        Ok((0, Vec::new()))
    }

    fn insert_rows(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<(u64, Vec<(String, i64)>)> {
        self.insert_statements += 1;
        if self.fail_on_insert_number == Some(self.insert_statements) {
            return Err(StorageError::Database(
                "simulated insert failure".to_string(),
            ));
        }

        let table = extract_quoted(sql)
            .into_iter()
            .next()
            .unwrap_or_else(|| "unknown".to_string());
        let columns = insert_column_count(sql);
        let keys = self.rows.entry(table.clone()).or_default();

        let mut inserted = 0u64;
        let mut undo = Vec::new();
        // first column of each row is the key; duplicates are skipped
        for row in params.chunks(columns) {
            let Some(key) = row.first().and_then(SqlValue::as_big_int) else {
                continue;
            };
            if keys.insert(key) {
                inserted += 1;
                undo.push((table.clone(), key));
            }
        }
        Ok((inserted, undo))
    }
}

fn extract_quoted(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = sql;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else { break };
        out.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    out
}

fn insert_column_count(sql: &str) -> usize {
    let open = sql.find('(').map_or(0, |i| i + 1);
    let close = sql[open..].find(')').map_or(sql.len(), |i| open + i);
    sql[open..close].split(',').count()
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    dialect: Dialect,
}

impl MockConnection {
    pub fn new() -> (Arc<Mutex<MockState>>, Self) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let conn = Self {
            state: state.clone(),
            dialect: Dialect::Postgres,
        };
        (state, conn)
    }

    pub fn with_state(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            dialect: Dialect::Postgres,
        }
    }

    pub fn sqlite(state: Arc<Mutex<MockState>>) -> Self {
        Self {
            state,
            dialect: Dialect::Sqlite,
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.run(sql, params).map(|(affected, _)| affected)
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Vec<Box<dyn Row>>> {
        let state = self.state.lock().unwrap();
        state.check_failure(sql)?;

        if sql.contains("pg_index") {
            let table = params.first().and_then(|p| p.as_text()).unwrap_or("");
            let mut rows: Vec<Box<dyn Row>> = Vec::new();
            for (idx_table, name, columns) in &state.indexes {
                if idx_table != table {
                    continue;
                }
                for column in columns {
                    rows.push(Box::new(MockRow::new(vec![
                        ("index_name", SqlValue::Text(name.clone())),
                        ("column_name", SqlValue::Text(column.clone())),
                    ])));
                }
            }
            return Ok(rows);
        }
        Ok(Vec::new())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> StorageResult<Option<Box<dyn Row>>> {
        let state = self.state.lock().unwrap();
        state.check_failure(sql)?;

        if sql.contains("information_schema.tables") || sql.contains("sqlite_master") {
            let table = params.first().and_then(|p| p.as_text()).unwrap_or("");
            if state.tables.contains(table) {
                return Ok(Some(Box::new(MockRow::new(vec![("1", SqlValue::Int(1))]))));
            }
            return Ok(None);
        }
        if sql.contains("table_constraints") {
            let table = params.first().and_then(|p| p.as_text()).unwrap_or("");
            let name = params.get(1).and_then(|p| p.as_text()).unwrap_or("");
            if state
                .constraints
                .contains(&(table.to_string(), name.to_string()))
            {
                return Ok(Some(Box::new(MockRow::new(vec![("1", SqlValue::Int(1))]))));
            }
            return Ok(None);
        }
        if sql.contains("schema_migrations") {
            let name = params.first().and_then(|p| p.as_text()).unwrap_or("");
            if state.ledger.iter().any(|applied| applied == name) {
                return Ok(Some(Box::new(MockRow::new(vec![(
                    "name",
                    SqlValue::Text(name.to_string()),
                )]))));
            }
            return Ok(None);
        }
        Ok(None)
    }

    async fn begin<'a>(&'a mut self) -> StorageResult<Box<dyn Transaction + 'a>> {
        self.state.lock().unwrap().begun += 1;
        Ok(Box::new(MockTransaction {
            state: self.state.clone(),
            undo: Vec::new(),
        }))
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }
}

pub struct MockTransaction {
    state: Arc<Mutex<MockState>>,
    undo: Vec<(String, i64)>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> StorageResult<u64> {
        let mut state = self.state.lock().unwrap();
        let (affected, inserted) = state.run(sql, params)?;
        self.undo.extend(inserted);
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.state.lock().unwrap().committed += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        for (table, key) in &self.undo {
            if let Some(keys) = state.rows.get_mut(table) {
                keys.remove(key);
            }
        }
        state.rolled_back += 1;
        Ok(())
    }
}

/// A result row assembled by hand
pub struct MockRow {
    columns: Vec<(String, SqlValue)>,
}

impl MockRow {
    pub fn new(columns: Vec<(&str, SqlValue)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }
}

impl Row for MockRow {
    fn get(&self, column: &str) -> StorageResult<SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| StorageError::Decode(format!("no column '{}'", column)))
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }
}

/// Scripted cursor; the shared flag records whether it was closed
pub struct MockCursor {
    items: VecDeque<StorageResult<MockRow>>,
    closed: Arc<AtomicBool>,
}

impl MockCursor {
    pub fn new(items: Vec<StorageResult<MockRow>>) -> (Self, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        let cursor = Self {
            items: items.into(),
            closed: closed.clone(),
        };
        (cursor, closed)
    }
}

#[async_trait]
impl RowCursor for MockCursor {
    async fn next_row(&mut self) -> StorageResult<Option<Box<dyn Row>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.items.pop_front() {
            Some(Ok(row)) => Ok(Some(Box::new(row))),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Minimal persisted record used across the tests
#[derive(Debug, Clone, PartialEq)]
pub struct Beat {
    pub id: i64,
    pub note: String,
}

impl Record for Beat {
    fn from_row(row: &dyn Row) -> StorageResult<Self> {
        let id = require_column(row, "id")?
            .as_big_int()
            .ok_or_else(|| StorageError::Decode("column 'id' is not an integer".to_string()))?;
        let note = require_column(row, "note")?
            .as_text()
            .ok_or_else(|| StorageError::Decode("column 'note' is not text".to_string()))?
            .to_string();
        Ok(Self { id, note })
    }
}

impl TableDescriptor for Beat {
    fn table_name() -> &'static str {
        "beats"
    }

    fn columns() -> &'static [&'static str] {
        &["id", "note"]
    }

    fn insert_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::BigInt(self.id),
            SqlValue::Text(self.note.clone()),
        ]
    }
}

pub fn beats(n: usize) -> Vec<Beat> {
    (0..n)
        .map(|i| Beat {
            id: i as i64,
            note: format!("note-{}", i),
        })
        .collect()
}

pub fn beat_row(id: i64) -> MockRow {
    MockRow::new(vec![
        ("id", SqlValue::BigInt(id)),
        ("note", SqlValue::Text(format!("note-{}", id))),
    ])
}
