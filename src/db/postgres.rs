//! PostgreSQL result store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};

use crate::db::{ResultStore, StoreError};
use crate::models::bar::Venue;
use crate::models::scan::{MatchRecord, ScanCounts, ScanMode, ScanRun, ScanStatus};

const MATCH_COLUMNS: &str = "symbol, venue, scan_date, bar_date, close, volume, pct_from_high, \
     atr14, ema50, ema150, ema200, volume_avg20, breakout_signal, contraction_ratio, \
     consolidation_ratio";

const RUN_COLUMNS: &str = "run_id, mode, scan_date, started_at, finished_at, universe_size, \
     processed, succeeded, real_data, synthetic_data, matches, errors, insufficient_history, \
     persist_failures, duration_ms, status, error";

pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS vcp_matches (
                    symbol TEXT NOT NULL,
                    venue TEXT NOT NULL,
                    scan_date DATE NOT NULL,
                    bar_date DATE NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    volume DOUBLE PRECISION NOT NULL,
                    pct_from_high DOUBLE PRECISION NOT NULL,
                    atr14 DOUBLE PRECISION NOT NULL,
                    ema50 DOUBLE PRECISION NOT NULL,
                    ema150 DOUBLE PRECISION NOT NULL,
                    ema200 DOUBLE PRECISION NOT NULL,
                    volume_avg20 DOUBLE PRECISION NOT NULL,
                    breakout_signal BOOLEAN NOT NULL,
                    contraction_ratio DOUBLE PRECISION NOT NULL,
                    consolidation_ratio DOUBLE PRECISION NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    PRIMARY KEY (symbol, venue, scan_date)
                );
                CREATE INDEX IF NOT EXISTS vcp_matches_scan_date_idx ON vcp_matches (scan_date);
                CREATE TABLE IF NOT EXISTS scan_runs (
                    run_id TEXT PRIMARY KEY,
                    mode TEXT NOT NULL,
                    scan_date DATE NOT NULL,
                    started_at TIMESTAMPTZ NOT NULL,
                    finished_at TIMESTAMPTZ NOT NULL,
                    universe_size BIGINT NOT NULL,
                    processed BIGINT NOT NULL,
                    succeeded BIGINT NOT NULL,
                    real_data BIGINT NOT NULL,
                    synthetic_data BIGINT NOT NULL,
                    matches BIGINT NOT NULL,
                    errors BIGINT NOT NULL,
                    insufficient_history BIGINT NOT NULL,
                    persist_failures BIGINT NOT NULL,
                    duration_ms BIGINT NOT NULL,
                    status TEXT NOT NULL,
                    error TEXT
                );",
            )
            .await
            .map_err(|e| StoreError::Query(format!("failed to create schema: {e}")))
    }
}

#[async_trait]
impl ResultStore for PostgresStore {
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        {
            let client = self.client.lock().await;
            if client.is_closed() {
                return Err(StoreError::Connection("connection closed".into()));
            }
        }
        self.init_schema().await
    }

    async fn clear_matches_from(&self, scan_date: NaiveDate) -> Result<u64, StoreError> {
        let client = self.client.lock().await;
        Ok(client
            .execute("DELETE FROM vcp_matches WHERE scan_date >= $1", &[&scan_date])
            .await?)
    }

    async fn upsert_matches(&self, matches: &[MatchRecord]) -> Result<u64, StoreError> {
        if matches.is_empty() {
            return Ok(0);
        }
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;
        let statement = tx
            .prepare(&format!(
                "INSERT INTO vcp_matches ({MATCH_COLUMNS})
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                 ON CONFLICT (symbol, venue, scan_date) DO UPDATE SET
                    bar_date = EXCLUDED.bar_date,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    pct_from_high = EXCLUDED.pct_from_high,
                    atr14 = EXCLUDED.atr14,
                    ema50 = EXCLUDED.ema50,
                    ema150 = EXCLUDED.ema150,
                    ema200 = EXCLUDED.ema200,
                    volume_avg20 = EXCLUDED.volume_avg20,
                    breakout_signal = EXCLUDED.breakout_signal,
                    contraction_ratio = EXCLUDED.contraction_ratio,
                    consolidation_ratio = EXCLUDED.consolidation_ratio,
                    updated_at = now()"
            ))
            .await?;

        let mut written = 0;
        for m in matches {
            let venue = m.venue.as_str();
            written += tx
                .execute(
                    &statement,
                    &[
                        &m.symbol,
                        &venue,
                        &m.scan_date,
                        &m.bar_date,
                        &m.close,
                        &m.volume,
                        &m.pct_from_high,
                        &m.atr14,
                        &m.ema50,
                        &m.ema150,
                        &m.ema200,
                        &m.volume_avg20,
                        &m.breakout_signal,
                        &m.contraction_ratio,
                        &m.consolidation_ratio,
                    ],
                )
                .await?;
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn record_run(&self, run: &ScanRun) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        let c = &run.counts;
        let counts: [i64; 9] = [
            run.universe_size as i64,
            c.processed as i64,
            c.succeeded as i64,
            c.real_data as i64,
            c.synthetic_data as i64,
            c.matches as i64,
            c.errors as i64,
            c.insufficient_history as i64,
            c.persist_failures as i64,
        ];
        let duration_ms = run.duration_ms as i64;
        client
            .execute(
                &format!(
                    "INSERT INTO scan_runs ({RUN_COLUMNS})
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
                ),
                &[
                    &run.run_id,
                    &run.mode.as_str(),
                    &run.scan_date,
                    &run.started_at,
                    &run.finished_at,
                    &counts[0],
                    &counts[1],
                    &counts[2],
                    &counts[3],
                    &counts[4],
                    &counts[5],
                    &counts[6],
                    &counts[7],
                    &counts[8],
                    &duration_ms,
                    &run.status.as_str(),
                    &run.error,
                ],
            )
            .await?;
        Ok(())
    }

    async fn matches_for(&self, scan_date: NaiveDate) -> Result<Vec<MatchRecord>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                &format!(
                    "SELECT {MATCH_COLUMNS} FROM vcp_matches WHERE scan_date = $1 ORDER BY venue, symbol"
                ),
                &[&scan_date],
            )
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn latest_scan_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT scan_date FROM scan_runs ORDER BY finished_at DESC LIMIT 1",
                &[],
            )
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<ScanRun>, StoreError> {
        let client = self.client.lock().await;
        let limit = limit as i64;
        let rows = client
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM scan_runs ORDER BY finished_at DESC LIMIT $1"),
                &[&limit],
            )
            .await?;
        rows.iter().map(run_from_row).collect()
    }
}

fn match_from_row(row: &Row) -> Result<MatchRecord, StoreError> {
    let venue: String = row.get(1);
    Ok(MatchRecord {
        symbol: row.get(0),
        venue: venue.parse::<Venue>().map_err(StoreError::Serialization)?,
        scan_date: row.get(2),
        bar_date: row.get(3),
        close: row.get(4),
        volume: row.get(5),
        pct_from_high: row.get(6),
        atr14: row.get(7),
        ema50: row.get(8),
        ema150: row.get(9),
        ema200: row.get(10),
        volume_avg20: row.get(11),
        breakout_signal: row.get(12),
        contraction_ratio: row.get(13),
        consolidation_ratio: row.get(14),
    })
}

fn run_from_row(row: &Row) -> Result<ScanRun, StoreError> {
    let count = |idx: usize| -> usize { usize::try_from(row.get::<_, i64>(idx)).unwrap_or(0) };
    let mode: String = row.get(1);
    let status: String = row.get(15);
    let started_at: DateTime<Utc> = row.get(3);
    let finished_at: DateTime<Utc> = row.get(4);

    Ok(ScanRun {
        run_id: row.get(0),
        mode: parse_mode(&mode)?,
        scan_date: row.get(2),
        started_at,
        finished_at,
        universe_size: count(5),
        counts: ScanCounts {
            processed: count(6),
            succeeded: count(7),
            real_data: count(8),
            synthetic_data: count(9),
            matches: count(10),
            errors: count(11),
            insufficient_history: count(12),
            persist_failures: count(13),
        },
        duration_ms: u64::try_from(row.get::<_, i64>(14)).unwrap_or(0),
        status: parse_status(&status)?,
        error: row.get(16),
    })
}

fn parse_mode(raw: &str) -> Result<ScanMode, StoreError> {
    match raw {
        "full" => Ok(ScanMode::Full),
        "custom" => Ok(ScanMode::Custom),
        other => Err(StoreError::Serialization(format!("unknown scan mode '{other}'"))),
    }
}

fn parse_status(raw: &str) -> Result<ScanStatus, StoreError> {
    match raw {
        "idle" => Ok(ScanStatus::Idle),
        "running" => Ok(ScanStatus::Running),
        "completed" => Ok(ScanStatus::Completed),
        "failed" => Ok(ScanStatus::Failed),
        "cancelled" => Ok(ScanStatus::Cancelled),
        other => Err(StoreError::Serialization(format!("unknown scan status '{other}'"))),
    }
}
