//! Compile-time table descriptors
//!
//! Each persisted entity type declares its table name and column mapping
//! statically, so inserts and row decoding stay type-safe without any
//! runtime type assertions.

use crate::backend::SqlValue;

/// Static column mapping for an insertable entity type
pub trait TableDescriptor: Send + Sync {
    /// Table the entity is stored in
    fn table_name() -> &'static str;

    /// Column names, in insert order
    fn columns() -> &'static [&'static str];

    /// Values for one row, matching [`columns`](Self::columns) in
    /// length and order
    fn insert_values(&self) -> Vec<SqlValue>;
}
