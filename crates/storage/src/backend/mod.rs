//! Database backend abstraction
//!
//! `core` defines the capability traits the storage layer consumes;
//! `postgres` implements them over sqlx.

pub mod core;
pub mod postgres;

pub use core::{
    require_column, Connection, Dialect, Record, Row, RowCursor, SqlValue, Transaction,
};
pub use postgres::{PostgresBackend, PostgresConnection, PostgresCursor};
