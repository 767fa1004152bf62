//! Migration runner
//!
//! Executes one phase's queue in registration order, skipping units whose
//! ledger record exists and recording completion after each success. Any
//! unit failure aborts the remaining queue: later migrations are assumed
//! to require earlier ones, so no partial-phase continuation is
//! attempted. A restart re-attempts from the first un-recorded unit.

use chrono::Utc;
use tracing::{debug, info};

use super::definitions::{MigrationPhase, MigrationRunResult};
use super::registry::MigrationRegistry;
use crate::backend::{Connection, SqlValue};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// Executes migration queues against a connection
pub struct MigrationRunner {
    config: StorageConfig,
}

impl MigrationRunner {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Run all units of `phase` in registration order.
    ///
    /// The ledger table is created on first use. Units whose record
    /// exists are skipped; each remaining unit runs and, on success, gets
    /// exactly one ledger row. The first failure aborts the phase.
    pub async fn run_phase(
        &self,
        registry: &MigrationRegistry,
        phase: MigrationPhase,
        conn: &mut dyn Connection,
    ) -> StorageResult<MigrationRunResult> {
        self.ensure_ledger_table(conn).await?;

        let mut result = MigrationRunResult::default();
        for unit in registry.units(phase) {
            if self.has_run(unit.name(), conn).await? {
                debug!(name = unit.name(), "migration already applied, skipping");
                result.skipped += 1;
                continue;
            }

            info!(name = unit.name(), phase = phase.label(), "applying migration");
            unit.run(conn, &self.config)
                .await
                .map_err(|e| StorageError::Migration {
                    unit: unit.name().to_string(),
                    message: e.to_string(),
                })?;
            self.record(unit.name(), conn).await?;
            result.applied.push(unit.name().to_string());
        }

        if !result.applied.is_empty() {
            info!(
                phase = phase.label(),
                applied = result.applied.len(),
                skipped = result.skipped,
                "migration phase complete"
            );
        }
        Ok(result)
    }

    async fn ensure_ledger_table(&self, conn: &mut dyn Connection) -> StorageResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (name TEXT PRIMARY KEY, applied_at TIMESTAMP NOT NULL)",
            conn.dialect().quote(&self.config.ledger_table)
        );
        conn.execute(&sql, &[]).await?;
        Ok(())
    }

    /// Whether the ledger holds a record for `name`. Absence means
    /// "not yet run or failed".
    async fn has_run(&self, name: &str, conn: &mut dyn Connection) -> StorageResult<bool> {
        let dialect = conn.dialect();
        let sql = format!(
            "SELECT name FROM {} WHERE name = {}",
            dialect.quote(&self.config.ledger_table),
            dialect.placeholder(1)
        );
        let row = conn
            .fetch_optional(&sql, &[SqlValue::Text(name.to_string())])
            .await?;
        Ok(row.is_some())
    }

    /// Insert the completion record for `name`. Failure here is surfaced
    /// distinctly: the action already ran, so a retry will re-execute it.
    async fn record(&self, name: &str, conn: &mut dyn Connection) -> StorageResult<()> {
        let dialect = conn.dialect();
        let sql = format!(
            "INSERT INTO {} (name, applied_at) VALUES ({}, {})",
            dialect.quote(&self.config.ledger_table),
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        conn.execute(
            &sql,
            &[
                SqlValue::Text(name.to_string()),
                SqlValue::Timestamp(Utc::now().naive_utc()),
            ],
        )
        .await
        .map_err(|e| StorageError::Ledger {
            unit: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}
