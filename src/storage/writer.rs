//! Atomic batch commits.
//!
//! A batch is written in one transaction: each tick's timestamp row first,
//! then the measurement rows that reference it. Either the whole batch
//! becomes visible or none of it does.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::{MeasurementKind, TickRecord};

/// Default number of retries after a failed commit.
pub const DEFAULT_COMMIT_RETRIES: u32 = 3;

/// Default backoff unit between retries (multiplied by the attempt number).
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Rows written by one successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Timestamp rows inserted.
    pub ticks: usize,
    /// Measurement rows inserted.
    pub rows: usize,
}

/// A batch that could not be committed after all retries.
///
/// Carries enough context to identify the lost data in the logs.
#[derive(Debug, Clone, PartialEq)]
pub struct LostBatch {
    /// Timestamp of the first tick in the batch.
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Timestamp of the last tick in the batch.
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Number of ticks in the batch.
    pub ticks: usize,
    /// Number of measurement rows in the batch.
    pub rows: usize,
    /// Internal sensor ids present in the batch.
    pub sensor_ids: Vec<i64>,
    /// Commit attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    pub error: String,
}

impl LostBatch {
    fn describe(batch: &[TickRecord], attempts: u32, error: &StorageError) -> Self {
        let sensor_ids: BTreeSet<i64> = batch
            .iter()
            .flat_map(|t| t.rows.iter().map(|r| r.sensor_id))
            .collect();
        Self {
            first_timestamp: batch.first().map(|t| t.timestamp),
            last_timestamp: batch.last().map(|t| t.timestamp),
            ticks: batch.len(),
            rows: batch.iter().map(|t| t.rows.len()).sum(),
            sensor_ids: sensor_ids.into_iter().collect(),
            attempts,
            error: error.to_string(),
        }
    }
}

/// Writes batches of ticks to the store.
///
/// Only the consumer owns a `BatchWriter`, so the store has a single writer.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    pool: SqlitePool,
    retries: u32,
    backoff: Duration,
}

impl BatchWriter {
    /// Create a writer with the default retry policy.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retries: DEFAULT_COMMIT_RETRIES,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Set the number of retries after a failed commit.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the backoff unit between retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Commit a batch in a single transaction.
    pub async fn commit(&self, batch: &[TickRecord]) -> Result<CommitStats, StorageError> {
        if batch.is_empty() {
            return Ok(CommitStats::default());
        }

        let mut tx = self.pool.inner().begin().await?;
        let mut rows = 0;

        for tick in batch {
            let timestamp_id = sqlx::query("INSERT INTO timestamps (timestamp) VALUES (?)")
                .bind(tick.epoch_seconds())
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            for row in &tick.rows {
                sqlx::query(insert_sql(row.kind))
                    .bind(timestamp_id)
                    .bind(row.sensor_id)
                    .bind(row.value)
                    .execute(&mut *tx)
                    .await?;
                rows += 1;
            }
        }

        tx.commit().await?;

        tracing::debug!(ticks = batch.len(), rows, "Batch committed");
        Ok(CommitStats {
            ticks: batch.len(),
            rows,
        })
    }

    /// Commit a batch, retrying the same batch on failure.
    ///
    /// After `1 + retries` failed attempts the batch is given up and described
    /// in the returned [`LostBatch`].
    pub async fn commit_with_retry(&self, batch: &[TickRecord]) -> Result<CommitStats, LostBatch> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.commit(batch).await {
                Ok(stats) => return Ok(stats),
                Err(e) if attempt <= self.retries => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        retries = self.retries,
                        ticks = batch.len(),
                        "Batch commit failed, retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(LostBatch::describe(batch, attempt, &e)),
            }
        }
    }
}

fn insert_sql(kind: MeasurementKind) -> &'static str {
    match kind {
        MeasurementKind::Temperature => {
            "INSERT INTO temperature (timestamp_id, sensor_id, temperature) VALUES (?, ?, ?)"
        }
        MeasurementKind::Humidity => {
            "INSERT INTO humidity (timestamp_id, sensor_id, humidity) VALUES (?, ?, ?)"
        }
        MeasurementKind::Acceleration => {
            "INSERT INTO accelerations (timestamp_id, sensor_id, acceleration_value) VALUES (?, ?, ?)"
        }
    }
}
