//! Ledger-based schema migration for the energy database.
//!
//! The `schema_migrations` ledger records one row per applied step; the
//! current version of a store is `max(version)`. Stores created before the
//! ledger existed are recognized by the tables they contain and baselined
//! with backfilled ledger rows, so their already-applied DDL is not rerun.
//! All pending steps and their ledger rows commit in a single transaction.

use super::schema::{create_ledger_table, MigrationStep, LEDGER_TABLE, MIGRATION_STEPS, TARGET_VERSION};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::info;

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn current_ledger_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Infer the schema version of a store that predates the ledger.
///
/// Grid tables alone mean version 1, grid + spot prices version 2, and
/// those plus the key-value table version 3. An empty store is version 0.
fn infer_legacy_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "grid_snapshots")? || !table_exists(conn, "generation_mix")? {
        return Ok(0);
    }
    if !table_exists(conn, "spot_prices")? {
        return Ok(1);
    }
    if !table_exists(conn, "app_state")? {
        return Ok(2);
    }
    Ok(3)
}

/// Bring the store to [`TARGET_VERSION`], returning the resulting version.
///
/// Fails without modifying storage when the on-disk version is newer than
/// the target or an intermediate step is missing; the process must not
/// start in either case.
pub fn migrate(conn: &mut Connection) -> Result<i64> {
    migrate_to(conn, TARGET_VERSION, MIGRATION_STEPS)
}

pub(crate) fn migrate_to(
    conn: &mut Connection,
    target: i64,
    steps: &[MigrationStep],
) -> Result<i64> {
    let tx = conn.transaction()?;

    let mut current = if table_exists(&tx, LEDGER_TABLE)? {
        current_ledger_version(&tx)?
    } else {
        let inferred = infer_legacy_version(&tx)?;
        create_ledger_table(&tx)?;
        if inferred > 0 {
            info!(
                "No schema ledger found, baselining legacy store at version {}",
                inferred
            );
            let now = Utc::now().to_rfc3339();
            for version in 1..=inferred {
                tx.execute(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, now],
                )?;
            }
        }
        inferred
    };

    if current > target {
        bail!(
            "store is at schema version {} but this binary targets version {}; refusing to downgrade",
            current,
            target
        );
    }

    if current == target {
        tx.commit()?;
        return Ok(current);
    }

    info!(
        "Migrating energy database from version {} to {}",
        current, target
    );
    for version in current + 1..=target {
        let step = steps
            .iter()
            .find(|s| s.version == version)
            .with_context(|| format!("no migration step defined for version {}", version))?;
        (step.apply)(&tx).with_context(|| format!("migration to version {} failed", version))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().to_rfc3339()],
        )?;
        current = version;
    }

    tx.commit()?;
    Ok(current)
}
