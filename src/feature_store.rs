use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;

use crate::export::RecordSink;
use crate::record::FeatureRecord;

/// SQLite copy of every emitted record, keyed by game id.
pub struct FeatureStore {
    conn: Connection,
}

impl FeatureStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn begin_run(&self, event_file: &str) -> Result<i64> {
        let started_at = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_runs(started_at, finished_at, event_file, games_total, records_upserted, errors_json)
                 VALUES (?1, NULL, ?2, 0, 0, '[]')",
                params![started_at, event_file],
            )
            .context("insert ingest run")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        games_total: usize,
        records_upserted: usize,
        errors: &[String],
    ) -> Result<()> {
        let finished_at = Utc::now().to_rfc3339();
        let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());
        self.conn
            .execute(
                "UPDATE ingest_runs
                 SET finished_at = ?1, games_total = ?2, records_upserted = ?3, errors_json = ?4
                 WHERE run_id = ?5",
                params![
                    finished_at,
                    games_total as i64,
                    records_upserted as i64,
                    errors_json,
                    run_id
                ],
            )
            .context("update ingest run")?;
        Ok(())
    }

    /// Writes all rows in one transaction.
    pub fn upsert_records(&mut self, records: &[FeatureRecord], event_file: &str) -> Result<usize> {
        let tx = self.conn.transaction().context("begin upsert transaction")?;
        for record in records {
            upsert_record(&tx, record, event_file)?;
        }
        tx.commit().context("commit upsert transaction")?;
        Ok(records.len())
    }

    pub fn load_records(&self, season: Option<u16>) -> Result<Vec<FeatureRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT record_json
                FROM feature_records
                WHERE (?1 IS NULL OR season = ?1)
                ORDER BY game_id ASC
                "#,
            )
            .context("prepare load records query")?;
        let rows = stmt
            .query_map(params![season.map(i64::from)], |row| row.get::<_, String>(0))
            .context("query load records")?;

        let mut out = Vec::new();
        for row in rows {
            let raw = row.context("decode record row")?;
            out.push(serde_json::from_str(&raw).context("decode stored record json")?);
        }
        Ok(out)
    }

    pub fn record_count(&self) -> Result<usize> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM feature_records", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("count feature records")?;
        Ok(count.max(0) as usize)
    }

    pub fn last_run_errors(&self) -> Result<Option<Vec<String>>> {
        let raw = self
            .conn
            .query_row(
                "SELECT errors_json FROM ingest_runs ORDER BY run_id DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("query last ingest run")?;
        raw.map(|raw| serde_json::from_str(&raw).context("decode run errors"))
            .transpose()
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS feature_records (
            game_id TEXT PRIMARY KEY,
            season INTEGER NOT NULL,
            date_code TEXT NOT NULL,
            game_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            first_inning_total INTEGER NOT NULL,
            record_json TEXT NOT NULL,
            event_file TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_feature_records_season ON feature_records(season);
        CREATE INDEX IF NOT EXISTS idx_feature_records_home ON feature_records(home_team);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            event_file TEXT NOT NULL,
            games_total INTEGER NOT NULL,
            records_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn upsert_record(tx: &rusqlite::Transaction<'_>, r: &FeatureRecord, event_file: &str) -> Result<()> {
    let record_json = serde_json::to_string(r).context("serialize feature record")?;
    tx.execute(
        r#"
        INSERT INTO feature_records (
            game_id, season, date_code, game_date, home_team, away_team,
            first_inning_total, record_json, event_file, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(game_id) DO UPDATE SET
            season = excluded.season,
            date_code = excluded.date_code,
            game_date = excluded.game_date,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            first_inning_total = excluded.first_inning_total,
            record_json = excluded.record_json,
            event_file = excluded.event_file,
            updated_at = excluded.updated_at
        "#,
        params![
            r.game_id.as_str(),
            i64::from(r.game_id.season()),
            r.date_code.to_string(),
            r.date,
            r.home_team,
            r.away_team,
            i64::from(r.first_inning_total),
            record_json,
            event_file,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("upsert feature record {}", r.game_id))?;
    Ok(())
}

/// Buffers one event file's records and upserts them on finish.
pub struct StoreSink<'a> {
    store: &'a mut FeatureStore,
    event_file: String,
    pending: Vec<FeatureRecord>,
    written: usize,
}

impl<'a> StoreSink<'a> {
    pub fn new(store: &'a mut FeatureStore, event_file: impl Into<String>) -> Self {
        Self {
            store,
            event_file: event_file.into(),
            pending: Vec::new(),
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl RecordSink for StoreSink<'_> {
    fn emit_record(&mut self, record: &FeatureRecord) -> Result<()> {
        self.pending.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        self.written += self.store.upsert_records(&pending, &self.event_file)?;
        debug!(event_file = %self.event_file, records = pending.len(), "feature records stored");
        Ok(())
    }
}
