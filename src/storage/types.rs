//! Core data types for the storage layer.
//!
//! - [`MeasurementKind`]: Measurement family and its table layout
//! - [`TickRecord`]: One sampling tick ready to be committed
//! - [`MeasurementRow`]: One (sensor, value) pair of a tick, with the internal sensor id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Measurement family.
///
/// Each kind owns one measurement table in the store. Table and column names
/// match the layout the monitoring API already reads.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MeasurementKind {
    /// Air temperature in degrees Celsius.
    Temperature,
    /// Relative humidity in percent.
    Humidity,
    /// Structural acceleration.
    Acceleration,
}

impl MeasurementKind {
    /// Measurement table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Acceleration => "accelerations",
        }
    }

    /// Name of the value column in the measurement table.
    pub fn value_column(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Acceleration => "acceleration_value",
        }
    }
}

/// A single measurement resolved against the sensor registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRow {
    /// Measurement family (selects the table).
    pub kind: MeasurementKind,
    /// Internal sensor id (`sensors.id`).
    pub sensor_id: i64,
    /// Measured value.
    pub value: f64,
}

/// One tick waiting in a batch: a timestamp row and its dependent measurement rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRecord {
    /// Tick timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Measurement rows referencing this tick's timestamp row.
    pub rows: Vec<MeasurementRow>,
}

impl TickRecord {
    /// Timestamp as stored in `timestamps.timestamp` (Unix epoch seconds).
    pub fn epoch_seconds(&self) -> f64 {
        epoch_seconds(&self.timestamp)
    }
}

/// Convert a timestamp to fractional Unix epoch seconds.
pub fn epoch_seconds(ts: &DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}
