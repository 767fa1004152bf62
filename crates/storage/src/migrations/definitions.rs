//! Core migration types
//!
//! A migration unit is a named, ordered, idempotent schema or data
//! change executed at most once against the store. Units run in two
//! phases: `Pre` before automatic schema reconciliation, `Post` after.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backend::Connection;
use crate::config::StorageConfig;
use crate::error::StorageResult;

/// Phase a migration unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Runs before automatic schema reconciliation
    Pre,
    /// Runs after automatic schema reconciliation
    Post,
}

impl MigrationPhase {
    pub fn label(&self) -> &'static str {
        match self {
            MigrationPhase::Pre => "pre",
            MigrationPhase::Post => "post",
        }
    }
}

/// The external effects of a migration unit
///
/// Actions must be internally idempotent: a crash between an effect and
/// the ledger write means the whole action re-runs on the next startup,
/// so implementations check actual schema state before mutating instead
/// of relying on the ledger alone.
#[async_trait]
pub trait MigrationAction: Send + Sync {
    async fn apply(
        &self,
        conn: &mut dyn Connection,
        config: &StorageConfig,
    ) -> StorageResult<()>;
}

/// A named, ordered migration unit
pub struct MigrationUnit {
    name: &'static str,
    phase: MigrationPhase,
    action: Box<dyn MigrationAction>,
}

impl MigrationUnit {
    /// A unit for the pre-sync phase
    pub fn pre(name: &'static str, action: impl MigrationAction + 'static) -> Self {
        Self {
            name,
            phase: MigrationPhase::Pre,
            action: Box::new(action),
        }
    }

    /// A unit for the post-sync phase
    pub fn post(name: &'static str, action: impl MigrationAction + 'static) -> Self {
        Self {
            name,
            phase: MigrationPhase::Post,
            action: Box::new(action),
        }
    }

    /// Unique, immutable unit name; the ledger key
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> MigrationPhase {
        self.phase
    }

    /// Execute the unit's external effects
    pub async fn run(
        &self,
        conn: &mut dyn Connection,
        config: &StorageConfig,
    ) -> StorageResult<()> {
        self.action.apply(conn, config).await
    }
}

impl std::fmt::Debug for MigrationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationUnit")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Durable marker proving a migration unit has completed.
///
/// A record exists iff its unit has successfully completed at least
/// once; absence means "not yet run or failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Unit name (primary key)
    pub name: String,
    /// When the unit completed
    pub applied_at: DateTime<Utc>,
}

/// Result of running one phase
#[derive(Debug, Default)]
pub struct MigrationRunResult {
    /// Names of units applied during this run, in execution order
    pub applied: Vec<String>,
    /// Units skipped because their ledger record already existed
    pub skipped: usize,
}
