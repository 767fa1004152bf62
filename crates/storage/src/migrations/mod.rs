//! Two-phase, at-most-once schema migrations
//!
//! Units registered in an ordered registry run before (`Pre`) or after
//! (`Post`) automatic schema reconciliation; a persisted ledger row per
//! unit name guarantees each runs at most once.

pub mod catalog;
pub mod definitions;
pub mod registry;
pub mod runner;

pub use catalog::builtin_registry;
pub use definitions::{
    MigrationAction, MigrationPhase, MigrationRecord, MigrationRunResult, MigrationUnit,
};
pub use registry::MigrationRegistry;
pub use runner::MigrationRunner;
