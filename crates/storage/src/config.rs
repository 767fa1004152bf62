//! Configuration for the storage core

/// Default maximum number of rows per insert statement
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default maximum number of rows per streamed batch
pub const DEFAULT_STREAM_BATCH_SIZE: usize = 4096;

/// Default capacity of the bounded channel between a row-stream producer
/// and its consumer
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Tunables for ingestion, streaming and the migration ledger
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Maximum rows per insert statement. Together with the column count
    /// this must stay below the backend's bind-parameter limit
    /// (65535 for Postgres).
    pub chunk_size: usize,
    /// Maximum rows per streamed batch
    pub stream_batch_size: usize,
    /// Capacity of the bounded row-stream channel (>= 1)
    pub stream_buffer: usize,
    /// Table holding one row per completed migration name
    pub ledger_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream_batch_size: DEFAULT_STREAM_BATCH_SIZE,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            ledger_table: "schema_migrations".to_string(),
        }
    }
}
