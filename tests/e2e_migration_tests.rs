//! Migration tests against on-disk stores: baseline inference, ledger
//! idempotence and downgrade refusal.

use chrono::Utc;
use gridwatt::store::{Country, EnergyStore, GridSnapshot, SqliteEnergyStore, TARGET_VERSION};
use rusqlite::Connection;
use std::path::Path;

fn ledger_versions(db_path: &Path) -> Vec<i64> {
    let conn = Connection::open(db_path).unwrap();
    let mut stmt = conn
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<i64>>>()
        .unwrap()
}

#[test]
fn test_fresh_store_reaches_target_version() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("energy.db");

    let _store = SqliteEnergyStore::open(&db_path).unwrap();

    let versions = ledger_versions(&db_path);
    assert_eq!(versions, (1..=TARGET_VERSION).collect::<Vec<i64>>());
}

#[test]
fn test_reopening_is_a_noop() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("energy.db");

    {
        let _store = SqliteEnergyStore::open(&db_path).unwrap();
    }
    let before = ledger_versions(&db_path);

    {
        let _store = SqliteEnergyStore::open(&db_path).unwrap();
    }
    assert_eq!(ledger_versions(&db_path), before);
}

#[test]
fn test_legacy_store_is_baselined_with_data_intact() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("energy.db");

    // A store written by a pre-ledger build: grid tables only, one row.
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE grid_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                country TEXT NOT NULL CHECK(country IN ('SE', 'NO', 'FI', 'DK')),
                production REAL NOT NULL,
                consumption REAL NOT NULL,
                import_mw REAL NOT NULL,
                export_mw REAL NOT NULL,
                UNIQUE(timestamp, country)
            );
            CREATE TABLE generation_mix (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                country TEXT NOT NULL CHECK(country IN ('SE', 'NO', 'FI', 'DK')),
                nuclear REAL NOT NULL,
                hydro REAL NOT NULL,
                wind REAL NOT NULL,
                thermal REAL NOT NULL,
                unspecified REAL NOT NULL,
                UNIQUE(timestamp, country)
            );
            INSERT INTO grid_snapshots
                (timestamp, country, production, consumption, import_mw, export_mw)
                VALUES ('2026-01-01T00:00:00+00:00', 'SE', 10.0, 12.0, 1.0, 0.0);",
        )
        .unwrap();
    }

    let store = SqliteEnergyStore::open(&db_path).unwrap();

    // Ledger was backfilled for the inferred version and the remaining
    // steps applied on top.
    assert_eq!(
        ledger_versions(&db_path),
        (1..=TARGET_VERSION).collect::<Vec<i64>>()
    );

    // Legacy data survived; the later tables exist and work.
    let since = "2025-01-01T00:00:00+00:00".parse().unwrap();
    let history = store.grid_history(Country::Se, since).unwrap();
    assert_eq!(history.len(), 1);
    store.set_state("probe", "ok").unwrap();
    assert_eq!(store.get_state("probe").unwrap().as_deref(), Some("ok"));
}

#[test]
fn test_newer_store_refuses_to_open_without_changes() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("energy.db");

    {
        let _store = SqliteEnergyStore::open(&db_path).unwrap();
    }

    // Simulate a store already migrated by a newer build.
    let future_version = TARGET_VERSION + 1;
    {
        let conn = Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![future_version, Utc::now().to_rfc3339()],
        )
        .unwrap();
    }
    let before = ledger_versions(&db_path);

    let result = SqliteEnergyStore::open(&db_path);
    assert!(result.is_err());
    let message = format!("{:#}", result.err().unwrap());
    assert!(message.contains("refusing to downgrade"), "{}", message);

    // Nothing was modified by the refused open.
    assert_eq!(ledger_versions(&db_path), before);
}

#[test]
fn test_migrated_store_is_immediately_usable() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("energy.db");
    let store = SqliteEnergyStore::open(&db_path).unwrap();

    let snapshot = GridSnapshot {
        timestamp: Utc::now(),
        country: Country::Fi,
        production: 8.0,
        consumption: 9.0,
        import_mw: 1.0,
        export_mw: 0.0,
    };
    store.upsert_grid_cycle(&[snapshot], &[]).unwrap();
    assert!(store.latest_snapshot(Country::Fi).unwrap().is_some());
}
