//! Ordered migration registry
//!
//! Units are added explicitly at startup in a visibly ordered list;
//! registration order within a phase is the execution order, and
//! dependencies between migrations are expressed purely through that
//! ordering. The registry is in-memory, written only during init, and
//! read-only afterward. Duplicate names are not validated here: the
//! ledger is the sole idempotency source of truth.

use super::definitions::{MigrationPhase, MigrationUnit};

/// Two ordered queues of migration units, one per phase
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    pre: Vec<MigrationUnit>,
    post: Vec<MigrationUnit>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit to its phase's queue
    pub fn add(&mut self, unit: MigrationUnit) -> &mut Self {
        match unit.phase() {
            MigrationPhase::Pre => self.pre.push(unit),
            MigrationPhase::Post => self.post.push(unit),
        }
        self
    }

    /// Units of the given phase, in registration (= execution) order
    pub fn units(&self, phase: MigrationPhase) -> &[MigrationUnit] {
        match phase {
            MigrationPhase::Pre => &self.pre,
            MigrationPhase::Post => &self.post,
        }
    }

    pub fn len(&self) -> usize {
        self.pre.len() + self.post.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}
