//! Multi-harmonic acceleration model.
//!
//! Each sensor sees the same resonant modes with its own amplitudes. Every
//! mode's frequency drifts over the day:
//!
//! `freq_i(h) = fn_i + delta_f_i · cos(2π(h − peak_hour)/24)`
//!
//! and the sample is `Σ_i coef[s][i] · sin(2π · freq_i(h) · t) + noise_s`, where
//! `t` is the Unix time in seconds and `h` the local hour of day.

use std::f64::consts::PI;

use chrono::{DateTime, Local, Timelike};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::model::traits::{ModelError, SignalModel};

/// Modal frequencies (Hz) identified on the monitored structure.
pub const DEFAULT_FREQUENCIES: [f64; 4] = [3.773, 4.988, 5.609, 7.949];

/// Peak-to-mean frequency drift as a fraction of the modal frequency.
pub const DEFAULT_DRIFT_RATIO: f64 = 0.006;

/// Hour of day with the highest modal frequencies.
pub const DEFAULT_PEAK_HOUR: f64 = 4.0;

/// Half-open interval `[low, high)` for a uniform draw.
///
/// `low == high` yields the constant `low`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    /// Lower bound (inclusive).
    pub low: f64,
    /// Upper bound (exclusive).
    pub high: f64,
}

impl UniformRange {
    /// Create a range.
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    fn validate(&self, name: &str) -> Result<(), ModelError> {
        if !self.low.is_finite() || !self.high.is_finite() || self.low > self.high {
            return Err(ModelError::InvalidParameters(format!(
                "{name} range [{}, {}) is invalid",
                self.low, self.high
            )));
        }
        Ok(())
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.low == self.high {
            self.low
        } else {
            rng.gen_range(self.low..self.high)
        }
    }
}

/// Parameters from which the per-sensor coefficients are drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicParams {
    /// Base modal frequencies (Hz).
    pub frequencies: Vec<f64>,
    /// `delta_f_i = frequencies_i · drift_ratio`.
    pub drift_ratio: f64,
    /// Hour of day where the drift term peaks.
    pub peak_hour: f64,
    /// Range of each sensor's noise mean.
    pub noise_mean: UniformRange,
    /// Range of each sensor's noise standard deviation.
    pub noise_std: UniformRange,
    /// Range of each (sensor, mode) amplitude.
    pub amplitude: UniformRange,
    /// Seed for the coefficient draw.
    pub seed: u64,
}

impl Default for HarmonicParams {
    fn default() -> Self {
        Self {
            frequencies: DEFAULT_FREQUENCIES.to_vec(),
            drift_ratio: DEFAULT_DRIFT_RATIO,
            peak_hour: DEFAULT_PEAK_HOUR,
            noise_mean: UniformRange::new(0.0, 0.03),
            noise_std: UniformRange::new(0.0, 0.01),
            amplitude: UniformRange::new(1e-3, 1e-2),
            seed: 0,
        }
    }
}

impl HarmonicParams {
    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.frequencies.is_empty() {
            return Err(ModelError::InvalidParameters(
                "at least one base frequency is required".to_string(),
            ));
        }
        if let Some(f) = self
            .frequencies
            .iter()
            .find(|f| !f.is_finite() || **f <= 0.0)
        {
            return Err(ModelError::InvalidParameters(format!(
                "base frequencies must be positive, got {f}"
            )));
        }
        if !self.drift_ratio.is_finite() {
            return Err(ModelError::InvalidParameters(
                "drift_ratio must be finite".to_string(),
            ));
        }
        if !(0.0..24.0).contains(&self.peak_hour) {
            return Err(ModelError::InvalidParameters(format!(
                "peak_hour must be in [0, 24), got {}",
                self.peak_hour
            )));
        }
        self.noise_mean.validate("noise_mean")?;
        self.noise_std.validate("noise_std")?;
        self.amplitude.validate("amplitude")?;
        if self.noise_std.low < 0.0 {
            return Err(ModelError::InvalidParameters(
                "noise_std must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Acceleration model with coefficients drawn once at construction.
#[derive(Debug, Clone)]
pub struct HarmonicModel {
    frequencies: Vec<f64>,
    delta_f: Vec<f64>,
    mean_noise: Vec<f64>,
    std_noise: Vec<f64>,
    coef_f: Vec<Vec<f64>>,
    peak_hour: f64,
    noise: Vec<Normal<f64>>,
}

impl HarmonicModel {
    /// Draw coefficients for `sensor_count` sensors.
    ///
    /// Draw order is fixed (all noise means, all noise deviations, then the
    /// amplitude matrix row by row), so equal parameters give equal models.
    pub fn generate(params: &HarmonicParams, sensor_count: usize) -> Result<Self, ModelError> {
        params.validate()?;
        if sensor_count == 0 {
            return Err(ModelError::InvalidParameters(
                "harmonic model needs at least one sensor".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let delta_f = params
            .frequencies
            .iter()
            .map(|f| f * params.drift_ratio)
            .collect();
        let mean_noise: Vec<f64> = (0..sensor_count)
            .map(|_| params.noise_mean.draw(&mut rng))
            .collect();
        let std_noise: Vec<f64> = (0..sensor_count)
            .map(|_| params.noise_std.draw(&mut rng))
            .collect();
        let coef_f = (0..sensor_count)
            .map(|_| {
                params
                    .frequencies
                    .iter()
                    .map(|_| params.amplitude.draw(&mut rng))
                    .collect()
            })
            .collect();

        let noise = mean_noise
            .iter()
            .zip(&std_noise)
            .map(|(mean, std)| {
                Normal::new(*mean, *std)
                    .map_err(|e| ModelError::InvalidParameters(format!("sensor noise: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            sensors = sensor_count,
            modes = params.frequencies.len(),
            seed = params.seed,
            "Harmonic coefficients generated"
        );

        Ok(Self {
            frequencies: params.frequencies.clone(),
            delta_f,
            mean_noise,
            std_noise,
            coef_f,
            peak_hour: params.peak_hour,
            noise,
        })
    }

    /// Frequency drift amplitude per mode.
    pub fn delta_f(&self) -> &[f64] {
        &self.delta_f
    }

    /// Noise mean per sensor.
    pub fn mean_noise(&self) -> &[f64] {
        &self.mean_noise
    }

    /// Noise standard deviation per sensor.
    pub fn std_noise(&self) -> &[f64] {
        &self.std_noise
    }

    /// Amplitude matrix, `[sensor][mode]`.
    pub fn coefficients(&self) -> &[Vec<f64>] {
        &self.coef_f
    }

    /// Instantaneous frequency of `mode` at `hour`.
    ///
    /// Returns NaN for an unknown mode index.
    pub fn frequency(&self, mode: usize, hour: f64) -> f64 {
        match (self.frequencies.get(mode), self.delta_f.get(mode)) {
            (Some(base), Some(delta)) => {
                base + delta * (2.0 * PI * (hour - self.peak_hour) / 24.0).cos()
            }
            _ => f64::NAN,
        }
    }

    /// Noise-free harmonic sum for `sensor` at Unix time `t` (seconds) and `hour`.
    ///
    /// Returns NaN for an unknown sensor index.
    pub fn evaluate(&self, sensor: usize, t: f64, hour: f64) -> f64 {
        let Some(coefs) = self.coef_f.get(sensor) else {
            return f64::NAN;
        };
        coefs
            .iter()
            .enumerate()
            .map(|(mode, amplitude)| amplitude * (2.0 * PI * self.frequency(mode, hour) * t).sin())
            .sum()
    }
}

impl SignalModel for HarmonicModel {
    fn sensor_count(&self) -> Option<usize> {
        Some(self.coef_f.len())
    }

    fn sample(&self, sensor: usize, at: &DateTime<Local>, rng: &mut dyn RngCore) -> f64 {
        let Some(noise) = self.noise.get(sensor) else {
            return f64::NAN;
        };
        let t = at.timestamp_micros() as f64 / 1_000_000.0;
        let hour = f64::from(at.hour());
        self.evaluate(sensor, t, hour) + noise.sample(rng)
    }
}
