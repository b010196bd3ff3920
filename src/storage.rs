//! Storage Layer
//!
//! SQLite persistence for generated telemetry:
//! - **Schema**: Idempotent tables and indices per measurement family
//! - **Registry**: External sensor number → internal id mapping
//! - **Writer**: Atomic batch commits with bounded retry
//!
//! # Components
//!
//! - [`SqlitePool`]: WAL-mode connection pool
//! - [`ensure_schema`] / [`ensure_sensors`] / [`load_sensor_map`]: Startup preconditions
//! - [`BatchWriter`]: Transactional batch insert used by the pipeline consumer

pub mod db;
mod error;
pub mod registry;
pub mod schema;
mod types;
mod writer;

pub use db::SqlitePool;
pub use error::StorageError;
pub use registry::{SensorMap, ensure_sensors, load_sensor_map};
pub use schema::ensure_schema;
pub use types::{MeasurementKind, MeasurementRow, TickRecord, epoch_seconds};
pub use writer::{
    BatchWriter, CommitStats, DEFAULT_COMMIT_RETRIES, DEFAULT_RETRY_BACKOFF, LostBatch,
};
