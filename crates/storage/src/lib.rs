//! tempo-storage — storage core for the activity tracker
//!
//! Everything between the application's domain types and the SQL driver:
//!
//! - **backend** — capability traits over the driver plus the Postgres
//!   implementation
//! - **migrations** — ordered, two-phase, at-most-once schema migrations
//!   backed by a persistent ledger
//! - **schema** — table descriptors and live-schema introspection
//! - **bulk** — chunked, conflict-tolerant bulk insertion
//! - **stream** — bounded streaming reads with cooperative cancellation
//! - **temporal** — wire-format timestamps and the zone-reinterpretation
//!   rules for reading them back
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tempo_storage::{
//!     builtin_registry, ChunkedWriter, MigrationPhase, MigrationRunner, PostgresBackend,
//!     StorageConfig,
//! };
//!
//! # async fn example() -> tempo_storage::StorageResult<()> {
//! let backend = PostgresBackend::connect("postgres://localhost/tempo").await?;
//! let config = StorageConfig::default();
//!
//! let mut conn = backend.acquire().await?;
//! let runner = MigrationRunner::new(config.clone());
//! let registry = builtin_registry();
//! runner
//!     .run_phase(&registry, MigrationPhase::Pre, &mut conn)
//!     .await?;
//!
//! let _writer = ChunkedWriter::from_config(&config);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bulk;
pub mod config;
pub mod error;
pub mod migrations;
pub mod schema;
pub mod stream;
pub mod temporal;

pub use backend::{
    require_column, Connection, Dialect, PostgresBackend, Record, Row, RowCursor, SqlValue,
    Transaction,
};
pub use bulk::{BulkInsertReport, ChunkedWriter};
pub use config::{StorageConfig, DEFAULT_CHUNK_SIZE, DEFAULT_STREAM_BATCH_SIZE, DEFAULT_STREAM_BUFFER};
pub use error::{StorageError, StorageResult};
pub use migrations::{
    builtin_registry, MigrationAction, MigrationPhase, MigrationRecord, MigrationRegistry,
    MigrationRunResult, MigrationRunner, MigrationUnit,
};
pub use schema::{SchemaIndex, SchemaIntrospector, TableDescriptor};
pub use stream::{
    stream_rows, stream_rows_batched, BatchStream, CancellationToken, RecordStream, RowStream,
    StreamOptions,
};
pub use temporal::{TemporalValue, TimestampPolicy};
