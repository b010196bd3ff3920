//! Database schema definitions.
//!
//! Every statement is `IF NOT EXISTS`, so [`ensure_schema`] is safe to run on
//! every startup.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::types::MeasurementKind;

/// SQL statement for creating the timestamps table (one row per tick).
pub const TIMESTAMPS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS timestamps (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME NOT NULL
);
"#;

/// SQL statement for creating the sensors table.
///
/// `sensor_number` is the caller-assigned external number; `id` is what
/// measurement rows reference.
pub const SENSORS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS sensors (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    sensor_number INTEGER UNIQUE
);
"#;

/// Index statements shared by every store.
pub const SHARED_INDEX_DDL: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON timestamps(timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_sensor_number ON sensors(sensor_number);",
];

/// DDL for the measurement table of `kind`.
pub fn measurement_table_ddl(kind: MeasurementKind) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp_id INTEGER NOT NULL,
    sensor_id    INTEGER NOT NULL,
    {column}     REAL NOT NULL,
    FOREIGN KEY (timestamp_id) REFERENCES timestamps(id),
    FOREIGN KEY (sensor_id) REFERENCES sensors(id)
);
"#,
        table = kind.table(),
        column = kind.value_column(),
    )
}

/// Index DDL on the foreign keys of the measurement table of `kind`.
pub fn measurement_index_ddl(kind: MeasurementKind) -> [String; 2] {
    let table = kind.table();
    [
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_timestamp_id ON {table}(timestamp_id);"),
        format!("CREATE INDEX IF NOT EXISTS idx_{table}_sensor_id ON {table}(sensor_id);"),
    ]
}

/// Initialize the database schema for the given measurement families.
///
/// Creates the shared `timestamps` / `sensors` tables, one measurement table
/// per kind, and all indices, in a single transaction.
pub async fn ensure_schema(
    pool: &SqlitePool,
    kinds: &[MeasurementKind],
) -> Result<(), StorageError> {
    let mut tx = pool.inner().begin().await?;

    sqlx::query(TIMESTAMPS_TABLE_DDL).execute(&mut *tx).await?;
    sqlx::query(SENSORS_TABLE_DDL).execute(&mut *tx).await?;
    for ddl in SHARED_INDEX_DDL {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }

    for kind in kinds {
        sqlx::query(&measurement_table_ddl(*kind))
            .execute(&mut *tx)
            .await?;
        for ddl in measurement_index_ddl(*kind) {
            sqlx::query(&ddl).execute(&mut *tx).await?;
        }
    }

    tx.commit().await?;

    tracing::info!(kinds = ?kinds, "Database schema initialized");
    Ok(())
}
