use super::migrations;
use super::models::{
    Country, GenerationMix, GridField, GridSnapshot, JobRun, JobRunStatus, JobScheduleState,
    MixField, RetentionReport, SpotPrice, Zone,
};
use super::EnergyStore;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteEnergyStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEnergyStore {
    /// Open (or create) the energy database and bring it to the target
    /// schema version. Migration failure is fatal to the caller: the
    /// process must refuse to serve from an unmigrated store.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open energy database at {:?}", path))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let version = migrations::migrate(&mut conn)
            .with_context(|| format!("Schema migration failed for {:?}", path))?;
        info!("Energy database ready at schema version {}", version);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn parse_datetime(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    fn parse_country(raw: &str) -> rusqlite::Result<Country> {
        Country::parse(raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("unknown country code {:?}", raw).into(),
            )
        })
    }

    fn parse_zone(raw: &str) -> rusqlite::Result<Zone> {
        Zone::parse(raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("unknown zone code {:?}", raw).into(),
            )
        })
    }

    fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<GridSnapshot> {
        let timestamp: String = row.get("timestamp")?;
        let country: String = row.get("country")?;
        Ok(GridSnapshot {
            timestamp: Self::parse_datetime(&timestamp)?,
            country: Self::parse_country(&country)?,
            production: row.get("production")?,
            consumption: row.get("consumption")?,
            import_mw: row.get("import_mw")?,
            export_mw: row.get("export_mw")?,
        })
    }

    fn row_to_mix(row: &rusqlite::Row) -> rusqlite::Result<GenerationMix> {
        let timestamp: String = row.get("timestamp")?;
        let country: String = row.get("country")?;
        Ok(GenerationMix {
            timestamp: Self::parse_datetime(&timestamp)?,
            country: Self::parse_country(&country)?,
            nuclear: row.get("nuclear")?,
            hydro: row.get("hydro")?,
            wind: row.get("wind")?,
            thermal: row.get("thermal")?,
            unspecified: row.get("unspecified")?,
        })
    }

    fn row_to_price(row: &rusqlite::Row) -> rusqlite::Result<SpotPrice> {
        let timestamp: String = row.get("timestamp")?;
        let zone: String = row.get("zone")?;
        Ok(SpotPrice {
            timestamp: Self::parse_datetime(&timestamp)?,
            zone: Self::parse_zone(&zone)?,
            price: row.get("price")?,
            currency: row.get("currency")?,
        })
    }

    fn row_to_job_run(row: &rusqlite::Row) -> rusqlite::Result<JobRun> {
        let status_str: String = row.get("status")?;
        let status = JobRunStatus::parse(&status_str).unwrap_or(JobRunStatus::Failed);

        let started_at_str: String = row.get("started_at")?;
        let finished_at_str: Option<String> = row.get("finished_at")?;

        Ok(JobRun {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            started_at: DateTime::parse_from_rfc3339(&started_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            finished_at: finished_at_str.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
            status,
            error_message: row.get("error_message")?,
            triggered_by: row.get("triggered_by")?,
        })
    }

    fn row_to_schedule_state(row: &rusqlite::Row) -> rusqlite::Result<JobScheduleState> {
        let next_run_at_str: String = row.get("next_run_at")?;
        let last_run_at_str: Option<String> = row.get("last_run_at")?;

        Ok(JobScheduleState {
            job_id: row.get("job_id")?,
            next_run_at: DateTime::parse_from_rfc3339(&next_run_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            last_run_at: last_run_at_str.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            }),
        })
    }

    fn recent_column_values(
        &self,
        table: &str,
        column: &str,
        key_column: &str,
        key: &str,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY timestamp DESC LIMIT ?2",
            column, table, key_column
        ))?;
        let values = stmt
            .query_map(params![key, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<f64>>>()?;
        Ok(values)
    }
}

impl EnergyStore for SqliteEnergyStore {
    fn upsert_grid_cycle(&self, snapshots: &[GridSnapshot], mixes: &[GenerationMix]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for snapshot in snapshots {
            tx.execute(
                "INSERT INTO grid_snapshots
                 (timestamp, country, production, consumption, import_mw, export_mw)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(timestamp, country) DO UPDATE SET
                    production = excluded.production,
                    consumption = excluded.consumption,
                    import_mw = excluded.import_mw,
                    export_mw = excluded.export_mw",
                params![
                    Self::format_datetime(&snapshot.timestamp),
                    snapshot.country.code(),
                    snapshot.production,
                    snapshot.consumption,
                    snapshot.import_mw,
                    snapshot.export_mw,
                ],
            )?;
        }

        for mix in mixes {
            tx.execute(
                "INSERT INTO generation_mix
                 (timestamp, country, nuclear, hydro, wind, thermal, unspecified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(timestamp, country) DO UPDATE SET
                    nuclear = excluded.nuclear,
                    hydro = excluded.hydro,
                    wind = excluded.wind,
                    thermal = excluded.thermal,
                    unspecified = excluded.unspecified",
                params![
                    Self::format_datetime(&mix.timestamp),
                    mix.country.code(),
                    mix.nuclear,
                    mix.hydro,
                    mix.wind,
                    mix.thermal,
                    mix.unspecified,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn upsert_prices(&self, prices: &[SpotPrice]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for price in prices {
            tx.execute(
                "INSERT INTO spot_prices (timestamp, zone, country, price, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(timestamp, zone) DO UPDATE SET
                    country = excluded.country,
                    price = excluded.price,
                    currency = excluded.currency",
                params![
                    Self::format_datetime(&price.timestamp),
                    price.zone.code(),
                    price.country().code(),
                    price.price,
                    price.currency,
                ],
            )?;
        }

        tx.commit()?;
        Ok(prices.len())
    }

    fn recent_grid_values(
        &self,
        country: Country,
        field: GridField,
        limit: usize,
    ) -> Result<Vec<f64>> {
        self.recent_column_values(
            "grid_snapshots",
            field.column(),
            "country",
            country.code(),
            limit,
        )
    }

    fn recent_mix_values(
        &self,
        country: Country,
        field: MixField,
        limit: usize,
    ) -> Result<Vec<f64>> {
        self.recent_column_values(
            "generation_mix",
            field.column(),
            "country",
            country.code(),
            limit,
        )
    }

    fn recent_prices(&self, zone: Zone, limit: usize) -> Result<Vec<f64>> {
        self.recent_column_values("spot_prices", "price", "zone", zone.code(), limit)
    }

    fn grid_history(&self, country: Country, since: DateTime<Utc>) -> Result<Vec<GridSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, country, production, consumption, import_mw, export_mw
             FROM grid_snapshots WHERE country = ?1 AND timestamp >= ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(
                params![country.code(), Self::format_datetime(&since)],
                Self::row_to_snapshot,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn mix_history(&self, country: Country, since: DateTime<Utc>) -> Result<Vec<GenerationMix>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, country, nuclear, hydro, wind, thermal, unspecified
             FROM generation_mix WHERE country = ?1 AND timestamp >= ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(
                params![country.code(), Self::format_datetime(&since)],
                Self::row_to_mix,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn price_history(&self, zone: Zone, since: DateTime<Utc>) -> Result<Vec<SpotPrice>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, zone, price, currency
             FROM spot_prices WHERE zone = ?1 AND timestamp >= ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(
                params![zone.code(), Self::format_datetime(&since)],
                Self::row_to_price,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn latest_snapshot(&self, country: Country) -> Result<Option<GridSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, country, production, consumption, import_mw, export_mw
             FROM grid_snapshots WHERE country = ?1
             ORDER BY timestamp DESC LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![country.code()], Self::row_to_snapshot)
            .optional()?;
        Ok(row)
    }

    fn latest_mix(&self, country: Country) -> Result<Option<GenerationMix>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp, country, nuclear, hydro, wind, thermal, unspecified
             FROM generation_mix WHERE country = ?1
             ORDER BY timestamp DESC LIMIT 1",
        )?;
        let row = stmt
            .query_row(params![country.code()], Self::row_to_mix)
            .optional()?;
        Ok(row)
    }

    fn count_prices_for_day(&self, zone: Zone, day: NaiveDate) -> Result<usize> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .context("invalid day start")?
            .and_utc();
        let end = start + chrono::Duration::days(1);

        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM spot_prices
             WHERE zone = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            params![
                zone.code(),
                Self::format_datetime(&start),
                Self::format_datetime(&end)
            ],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM app_state WHERE key = ?1")?;
        let value: Option<String> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO app_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, Self::format_datetime(&Utc::now())],
        )?;
        Ok(())
    }

    fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM app_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<RetentionReport> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let cutoff = Self::format_datetime(&cutoff);

        let grid_rows = tx.execute(
            "DELETE FROM grid_snapshots WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let mix_rows = tx.execute(
            "DELETE FROM generation_mix WHERE timestamp < ?1",
            params![cutoff],
        )?;
        let price_rows = tx.execute(
            "DELETE FROM spot_prices WHERE timestamp < ?1",
            params![cutoff],
        )?;

        tx.commit()?;
        Ok(RetentionReport {
            grid_rows,
            mix_rows,
            price_rows,
        })
    }

    fn record_job_start(&self, job_id: &str, triggered_by: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_runs (job_id, started_at, status, triggered_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                job_id,
                Self::format_datetime(&Utc::now()),
                JobRunStatus::Running.as_str(),
                triggered_by
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_job_finish(
        &self,
        run_id: i64,
        status: JobRunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE job_runs SET finished_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![
                Self::format_datetime(&Utc::now()),
                status.as_str(),
                error_message,
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_job_history(&self, job_id: &str, limit: usize) -> Result<Vec<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
             FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![job_id, limit as i64], Self::row_to_job_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, started_at, finished_at, status, error_message, triggered_by
             FROM job_runs WHERE job_id = ?1 ORDER BY started_at DESC LIMIT 1",
        )?;
        let run = stmt
            .query_row(params![job_id], Self::row_to_job_run)
            .optional()?;
        Ok(run)
    }

    fn mark_stale_jobs_failed(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.execute(
            "UPDATE job_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                JobRunStatus::Failed.as_str(),
                Self::format_datetime(&Utc::now()),
                "Job was interrupted (process restart)",
                JobRunStatus::Running.as_str()
            ],
        )?;
        Ok(count)
    }

    fn get_schedule_state(&self, job_id: &str) -> Result<Option<JobScheduleState>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT job_id, next_run_at, last_run_at FROM job_schedules WHERE job_id = ?1",
        )?;
        let state = stmt
            .query_row(params![job_id], Self::row_to_schedule_state)
            .optional()?;
        Ok(state)
    }

    fn update_schedule_state(&self, state: &JobScheduleState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO job_schedules (job_id, next_run_at, last_run_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(job_id) DO UPDATE SET next_run_at = ?2, last_run_at = ?3",
            params![
                state.job_id,
                Self::format_datetime(&state.next_run_at),
                state.last_run_at.as_ref().map(Self::format_datetime)
            ],
        )?;
        Ok(())
    }
}
