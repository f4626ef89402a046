//! SQLite schema definitions for the energy database.
//!
//! Each schema version is one idempotent migration step. Steps only use
//! guarded DDL (CREATE TABLE IF NOT EXISTS / CREATE INDEX IF NOT EXISTS) so
//! replaying a step against a store that already has its objects is a no-op.

use anyhow::Result;
use rusqlite::Connection;

/// One step of the migration sequence. Applying all steps in order brings an
/// empty database to [`TARGET_VERSION`].
pub struct MigrationStep {
    pub version: i64,
    pub apply: fn(&Connection) -> Result<()>,
}

/// Schema version this binary requires.
pub const TARGET_VERSION: i64 = 4;

/// Append-only record of applied migrations. Current version is
/// `max(version)`; the table never shrinks.
pub const LEDGER_TABLE: &str = "schema_migrations";

pub fn create_ledger_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Version 1 - Grid snapshots and generation mix
// =============================================================================

fn migrate_to_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grid_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            country TEXT NOT NULL CHECK(country IN ('SE', 'NO', 'FI', 'DK')),
            production REAL NOT NULL,
            consumption REAL NOT NULL,
            import_mw REAL NOT NULL,
            export_mw REAL NOT NULL,
            UNIQUE(timestamp, country)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS generation_mix (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            country TEXT NOT NULL CHECK(country IN ('SE', 'NO', 'FI', 'DK')),
            nuclear REAL NOT NULL,
            hydro REAL NOT NULL,
            wind REAL NOT NULL,
            thermal REAL NOT NULL,
            unspecified REAL NOT NULL,
            UNIQUE(timestamp, country)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grid_snapshots_ts ON grid_snapshots(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grid_snapshots_country ON grid_snapshots(country)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_generation_mix_ts ON generation_mix(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_generation_mix_country ON generation_mix(country)",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Version 2 - Day-ahead spot prices
// =============================================================================

fn migrate_to_v2(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spot_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            zone TEXT NOT NULL,
            country TEXT NOT NULL CHECK(country IN ('SE', 'NO', 'FI', 'DK')),
            price REAL NOT NULL,
            currency TEXT NOT NULL,
            UNIQUE(timestamp, zone)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spot_prices_ts ON spot_prices(timestamp)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_spot_prices_zone ON spot_prices(zone)",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Version 3 - Shared key-value state
// =============================================================================

fn migrate_to_v3(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS app_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Version 4 - Job runs and schedules
// =============================================================================

fn migrate_to_v4(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            error_message TEXT,
            triggered_by TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_runs_job_id_started ON job_runs(job_id, started_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_schedules (
            job_id TEXT PRIMARY KEY,
            next_run_at TEXT NOT NULL,
            last_run_at TEXT
        )",
        [],
    )?;
    Ok(())
}

/// All migration steps, in the order they must be applied.
///
/// Version 1: grid_snapshots and generation_mix tables
/// Version 2: spot_prices table
/// Version 3: app_state key-value store
/// Version 4: job_runs and job_schedules tables
pub const MIGRATION_STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 1,
        apply: migrate_to_v1,
    },
    MigrationStep {
        version: 2,
        apply: migrate_to_v2,
    },
    MigrationStep {
        version: 3,
        apply: migrate_to_v3,
    },
    MigrationStep {
        version: 4,
        apply: migrate_to_v4,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn table_count(conn: &Connection, name: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_steps_are_ordered_and_dense() {
        for (index, step) in MIGRATION_STEPS.iter().enumerate() {
            assert_eq!(step.version, index as i64 + 1);
        }
        assert_eq!(
            MIGRATION_STEPS.last().unwrap().version,
            TARGET_VERSION,
            "last step must produce the target version"
        );
    }

    #[test]
    fn test_all_steps_create_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        for step in MIGRATION_STEPS {
            (step.apply)(&conn).unwrap();
        }

        for table in [
            "grid_snapshots",
            "generation_mix",
            "spot_prices",
            "app_state",
            "job_runs",
            "job_schedules",
        ] {
            assert_eq!(table_count(&conn, table), 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_steps_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        for step in MIGRATION_STEPS {
            (step.apply)(&conn).unwrap();
        }
        // Replaying the whole sequence must not fail or duplicate objects.
        for step in MIGRATION_STEPS {
            (step.apply)(&conn).unwrap();
        }
        assert_eq!(table_count(&conn, "grid_snapshots"), 1);
        assert_eq!(table_count(&conn, "spot_prices"), 1);
    }

    #[test]
    fn test_grid_uniqueness_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_to_v1(&conn).unwrap();

        conn.execute(
            "INSERT INTO grid_snapshots (timestamp, country, production, consumption, import_mw, export_mw)
             VALUES ('2026-08-06T10:00:00+00:00', 'SE', 10.0, 12.0, 2.0, 0.0)",
            [],
        )
        .unwrap();

        let duplicate = conn.execute(
            "INSERT INTO grid_snapshots (timestamp, country, production, consumption, import_mw, export_mw)
             VALUES ('2026-08-06T10:00:00+00:00', 'SE', 11.0, 12.0, 2.0, 0.0)",
            [],
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_country_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_to_v1(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO grid_snapshots (timestamp, country, production, consumption, import_mw, export_mw)
             VALUES ('2026-08-06T10:00:00+00:00', 'DE', 10.0, 12.0, 0.0, 0.0)",
            [],
        );
        assert!(result.is_err());
    }
}
