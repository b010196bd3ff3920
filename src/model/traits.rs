//! Core signal model trait and errors.

use chrono::{DateTime, Local};
use rand::RngCore;
use thiserror::Error;

use crate::storage::MeasurementKind;

/// Errors raised by signal models.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model parameters are unusable (fails pipeline construction).
    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),

    /// Evaluation produced NaN or an infinity.
    #[error("non-finite {kind} value {value} for sensor {sensor_number}")]
    NonFinite {
        /// Measurement family of the sample.
        kind: MeasurementKind,
        /// External sensor number.
        sensor_number: i64,
        /// The offending value.
        value: f64,
    },
}

/// A synthetic signal source for one measurement family.
///
/// Implementations hold only coefficients fixed at construction; they are
/// shared read-only between runs. Noise draws come from the caller's RNG so
/// the model itself never mutates.
pub trait SignalModel: Send + Sync + 'static {
    /// Number of sensors the model holds coefficients for.
    ///
    /// `None` means any number of sensors can share the model.
    fn sensor_count(&self) -> Option<usize> {
        None
    }

    /// Produce one value for the sensor at position `sensor` of its channel.
    fn sample(&self, sensor: usize, at: &DateTime<Local>, rng: &mut dyn RngCore) -> f64;
}

/// Reject NaN and infinities before they reach the store.
pub fn check_finite(
    kind: MeasurementKind,
    sensor_number: i64,
    value: f64,
) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinite {
            kind,
            sensor_number,
            value,
        })
    }
}
