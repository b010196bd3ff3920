//! Sensor registry.
//!
//! Maps caller-assigned sensor numbers to the store's internal ids. Rows are
//! only ever inserted; the map is loaded once per pipeline run and never
//! refreshed while the run is active.

use std::collections::HashMap;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// Immutable external-number → internal-id map for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorMap {
    ids: HashMap<i64, i64>,
}

impl SensorMap {
    /// Internal id for an external sensor number.
    pub fn resolve(&self, sensor_number: i64) -> Option<i64> {
        self.ids.get(&sensor_number).copied()
    }

    /// Number of mapped sensors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no sensor is mapped.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<(i64, i64)> for SensorMap {
    fn from_iter<I: IntoIterator<Item = (i64, i64)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Insert every sensor number not already present.
///
/// Existing rows are never updated or removed. Returns how many rows were added.
pub async fn ensure_sensors(pool: &SqlitePool, numbers: &[i64]) -> Result<u64, StorageError> {
    let mut tx = pool.inner().begin().await?;
    let mut inserted = 0;

    for number in numbers {
        inserted += sqlx::query("INSERT OR IGNORE INTO sensors (sensor_number) VALUES (?)")
            .bind(number)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;

    tracing::info!(
        inserted,
        skipped = numbers.len() as u64 - inserted,
        "Sensor registry synced"
    );
    Ok(inserted)
}

/// Load the id mapping for `numbers`.
///
/// # Errors
/// Returns `StorageError::InvalidData` if any number has no row, which means
/// [`ensure_sensors`] was not run for it.
pub async fn load_sensor_map(
    pool: &SqlitePool,
    numbers: &[i64],
) -> Result<SensorMap, StorageError> {
    let mut ids = HashMap::with_capacity(numbers.len());

    for number in numbers {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM sensors WHERE sensor_number = ?")
            .bind(number)
            .fetch_optional(pool.inner())
            .await?;

        let (id,) = row.ok_or_else(|| {
            StorageError::InvalidData(format!("sensor number {number} is not registered"))
        })?;
        ids.insert(*number, id);
    }

    Ok(SensorMap { ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::ensure_schema;
    use crate::storage::types::MeasurementKind;
    use tempfile::tempdir;

    async fn setup(name: &str) -> (tempfile::TempDir, SqlitePool) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join(name).display());
        let pool = SqlitePool::connect(&url).await.unwrap();
        ensure_schema(&pool, &[MeasurementKind::Acceleration])
            .await
            .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_ensure_sensors_is_idempotent() {
        let (_dir, pool) = setup("sensors.db").await;

        assert_eq!(ensure_sensors(&pool, &[1, 2, 3]).await.unwrap(), 3);
        assert_eq!(ensure_sensors(&pool, &[1, 2, 3]).await.unwrap(), 0);
        assert_eq!(ensure_sensors(&pool, &[3, 4]).await.unwrap(), 1);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sensors")
            .fetch_one(pool.inner())
            .await
            .unwrap();
        assert_eq!(count.0, 4);
    }

    #[tokio::test]
    async fn test_sensor_map_is_stable_across_syncs() {
        let (_dir, pool) = setup("stable.db").await;

        ensure_sensors(&pool, &[10, 20]).await.unwrap();
        let first = load_sensor_map(&pool, &[10, 20]).await.unwrap();

        ensure_sensors(&pool, &[20, 10, 30]).await.unwrap();
        let second = load_sensor_map(&pool, &[10, 20]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first.resolve(10), first.resolve(20));
        assert_eq!(first.resolve(99), None);
    }

    #[tokio::test]
    async fn test_load_unregistered_sensor_fails() {
        let (_dir, pool) = setup("missing.db").await;
        ensure_sensors(&pool, &[1]).await.unwrap();

        let err = load_sensor_map(&pool, &[1, 2]).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidData(_)));
        assert!(err.to_string().contains("sensor number 2"));
    }
}
