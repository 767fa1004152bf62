//! Built-in migration units
//!
//! Schema repairs accumulated by the tracker over time. Each unit checks
//! actual schema state before mutating, so an interrupted run is safe to
//! retry even when its ledger record was never written.

use async_trait::async_trait;
use tracing::info;

use super::definitions::{MigrationAction, MigrationUnit};
use super::registry::MigrationRegistry;
use crate::backend::{Connection, Dialect};
use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::schema::SchemaIntrospector;

/// Foreign keys created before cascade settings were introduced; they
/// are dropped so schema reconciliation can recreate them with the new
/// cascade behavior.
const LEGACY_CASCADE_CONSTRAINTS: &[(&str, &str)] = &[
    ("summary_items", "fk_summaries_editors"),
    ("summary_items", "fk_summaries_languages"),
    ("summary_items", "fk_summaries_machines"),
    ("summary_items", "fk_summaries_operating_systems"),
    ("summary_items", "fk_summaries_projects"),
    ("summary_items", "fk_summary_items_summary"),
    ("summaries", "fk_summaries_user"),
    ("language_mappings", "fk_language_mappings_user"),
    ("heartbeats", "fk_heartbeats_user"),
    ("aliases", "fk_aliases_user"),
];

/// Drop pre-cascade foreign key constraints where they still exist
struct DropLegacyCascadeConstraints;

#[async_trait]
impl MigrationAction for DropLegacyCascadeConstraints {
    async fn apply(
        &self,
        conn: &mut dyn Connection,
        _config: &StorageConfig,
    ) -> StorageResult<()> {
        // the named constraints only ever existed on postgres schemas
        if conn.dialect() != Dialect::Postgres {
            return Ok(());
        }
        let mut introspector = SchemaIntrospector::new(conn);
        if !introspector.table_exists("summaries").await? {
            info!("summaries table not yet existing, nothing to repair");
            return Ok(());
        }
        for (table, name) in LEGACY_CASCADE_CONSTRAINTS {
            if introspector.constraint_exists(table, name).await? {
                introspector.drop_constraint(table, name).await?;
            }
        }
        Ok(())
    }
}

/// Recreate the heartbeats (time, user) index where a model-definition
/// bug left it covering only the user column. The index is dropped here
/// and recreated by schema reconciliation with the full column set.
struct FixHeartbeatsTimeUserIndex;

#[async_trait]
impl MigrationAction for FixHeartbeatsTimeUserIndex {
    async fn apply(
        &self,
        conn: &mut dyn Connection,
        _config: &StorageConfig,
    ) -> StorageResult<()> {
        // index introspection is postgres-only; sqlite got the index
        // right from the start
        if conn.dialect() != Dialect::Postgres {
            return Ok(());
        }
        let mut introspector = SchemaIntrospector::new(conn);
        if !introspector.table_exists("heartbeats").await? {
            return Ok(());
        }
        let needs_drop = introspector
            .index_info("heartbeats")
            .await?
            .iter()
            .any(|idx| idx.name == "idx_time_user" && idx.columns.len() == 1);
        if !needs_drop {
            return Ok(());
        }
        introspector.drop_index("heartbeats", "idx_time_user").await?;
        info!("index 'idx_time_user' will be recreated, this may take a while");
        Ok(())
    }
}

/// Widen heartbeat and summary item id columns to BIGINT; the row
/// volume outgrew 32-bit keys
struct WidenIdColumnsToBigint;

#[async_trait]
impl MigrationAction for WidenIdColumnsToBigint {
    async fn apply(
        &self,
        conn: &mut dyn Connection,
        _config: &StorageConfig,
    ) -> StorageResult<()> {
        // sqlite integer columns are already 64-bit
        if conn.dialect() != Dialect::Postgres {
            return Ok(());
        }
        {
            let mut introspector = SchemaIntrospector::new(conn);
            if !introspector.table_exists("heartbeats").await? {
                return Ok(());
            }
        }
        info!("widening id columns, this may take a while");
        let mut tx = conn.begin().await?;
        for table in ["heartbeats", "summary_items"] {
            let sql = format!("ALTER TABLE {} ALTER COLUMN id TYPE BIGINT", table);
            match tx.execute(&sql, &[]).await {
                Ok(_) => {}
                Err(e) => {
                    tx.rollback().await.ok();
                    return Err(e);
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

/// The storage core's built-in migrations, in execution order
pub fn builtin_registry() -> MigrationRegistry {
    let mut registry = MigrationRegistry::new();
    registry
        .add(MigrationUnit::pre(
            "20201106_cascade_constraints",
            DropLegacyCascadeConstraints,
        ))
        .add(MigrationUnit::pre(
            "20221028_fix_heartbeats_time_user_idx",
            FixHeartbeatsTimeUserIndex,
        ))
        .add(MigrationUnit::post(
            "20211215_migrate_id_to_bigint",
            WidenIdColumnsToBigint,
        ));
    registry
}
