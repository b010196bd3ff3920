//! Seasonal/diurnal model for temperature and humidity.
//!
//! `value = yearly(month) + daily(month, hour) + noise`. The yearly term is a
//! single sinusoid peaking at `peak_month`; the daily term oscillates once per
//! day, peaking at `peak_hour`, with an amplitude that itself follows the year.
//!
//! The daily amplitude law of the deployed generator makes the amplitude
//! sinusoid pass through zero three months after `min_variability_month` and
//! flip sign at `min_variability_month` itself. [`DailyAmplitude::Legacy`]
//! keeps that law so existing dashboards see the same curves;
//! [`DailyAmplitude::Corrected`] keeps the amplitude inside
//! `[daily_min_amplitude, daily_max_amplitude]` all year.

use std::f64::consts::PI;

use chrono::{DateTime, Local};
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::model::clock::SeasonalTime;
use crate::model::traits::{ModelError, SignalModel};

/// Upper bound applied to humidity samples (percent).
pub const HUMIDITY_CEILING: f64 = 99.6;

/// Law for the daily amplitude over the year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DailyAmplitude {
    /// `(max+min)/2 + (max-min)/2 · sin(πm/6 − π(3+m_min)/6) · sin(diurnal)`.
    #[default]
    Legacy,
    /// `A(m) · sin(diurnal)` with `A(m) = (max+min)/2 − (max-min)/2 · cos(π(m − m_min)/6)`.
    Corrected,
}

/// Parameters of one seasonal channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalParams {
    /// Amplitude of the yearly variation.
    pub yearly_amplitude: f64,
    /// Yearly mean.
    pub yearly_mean: f64,
    /// Daily amplitude in the month of least variability.
    pub daily_min_amplitude: f64,
    /// Daily amplitude in the month of most variability.
    pub daily_max_amplitude: f64,
    /// Hour of the daily maximum, `[0, 24)`.
    pub peak_hour: f64,
    /// Month of the yearly maximum, `[1, 13)`.
    pub peak_month: f64,
    /// Month of least daily variability, `[1, 13)`.
    pub min_variability_month: f64,
    /// Standard deviation of the per-sample Gaussian noise.
    pub noise_sigma: f64,
    /// Daily amplitude law.
    #[serde(default)]
    pub daily_amplitude: DailyAmplitude,
}

impl SeasonalParams {
    /// Temperature parameters of the deployed climate generator.
    pub fn temperature_defaults() -> Self {
        Self {
            yearly_amplitude: 10.0,
            yearly_mean: 15.0,
            daily_min_amplitude: 6.0,
            daily_max_amplitude: 9.0,
            peak_hour: 14.0,
            peak_month: 7.0,
            min_variability_month: 1.0,
            noise_sigma: 0.5,
            daily_amplitude: DailyAmplitude::Legacy,
        }
    }

    /// Humidity parameters of the deployed climate generator.
    pub fn humidity_defaults() -> Self {
        Self {
            yearly_amplitude: 18.0,
            yearly_mean: 56.0,
            daily_min_amplitude: 10.0,
            daily_max_amplitude: 20.0,
            peak_hour: 2.0,
            peak_month: 1.0,
            min_variability_month: 1.0,
            noise_sigma: 3.0,
            daily_amplitude: DailyAmplitude::Legacy,
        }
    }

    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ModelError> {
        let finite = [
            self.yearly_amplitude,
            self.yearly_mean,
            self.daily_min_amplitude,
            self.daily_max_amplitude,
            self.noise_sigma,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::InvalidParameters(
                "seasonal parameters must be finite".to_string(),
            ));
        }
        if !(0.0..24.0).contains(&self.peak_hour) {
            return Err(ModelError::InvalidParameters(format!(
                "peak_hour must be in [0, 24), got {}",
                self.peak_hour
            )));
        }
        for (name, month) in [
            ("peak_month", self.peak_month),
            ("min_variability_month", self.min_variability_month),
        ] {
            if !(1.0..13.0).contains(&month) {
                return Err(ModelError::InvalidParameters(format!(
                    "{name} must be in [1, 13), got {month}"
                )));
            }
        }
        if self.daily_min_amplitude > self.daily_max_amplitude {
            return Err(ModelError::InvalidParameters(format!(
                "daily_min_amplitude ({}) exceeds daily_max_amplitude ({})",
                self.daily_min_amplitude, self.daily_max_amplitude
            )));
        }
        if self.noise_sigma < 0.0 {
            return Err(ModelError::InvalidParameters(format!(
                "noise_sigma must be non-negative, got {}",
                self.noise_sigma
            )));
        }
        Ok(())
    }
}

/// Seasonal model with fixed coefficients.
#[derive(Debug, Clone)]
pub struct SeasonalModel {
    params: SeasonalParams,
    ceiling: Option<f64>,
    noise: Normal<f64>,
}

impl SeasonalModel {
    /// Temperature model (unbounded).
    pub fn temperature(params: SeasonalParams) -> Result<Self, ModelError> {
        Self::build(params, None)
    }

    /// Humidity model, capped at [`HUMIDITY_CEILING`].
    pub fn humidity(params: SeasonalParams) -> Result<Self, ModelError> {
        Self::build(params, Some(HUMIDITY_CEILING))
    }

    fn build(params: SeasonalParams, ceiling: Option<f64>) -> Result<Self, ModelError> {
        params.validate()?;
        let noise = Normal::new(0.0, params.noise_sigma)
            .map_err(|e| ModelError::InvalidParameters(format!("noise_sigma: {e}")))?;
        Ok(Self {
            params,
            ceiling,
            noise,
        })
    }

    /// Model parameters.
    pub fn params(&self) -> &SeasonalParams {
        &self.params
    }

    /// Noise-free value at a fractional month and hour.
    pub fn evaluate(&self, month: f64, hour: f64) -> f64 {
        self.yearly_term(month) + self.daily_term(month, hour)
    }

    fn yearly_term(&self, month: f64) -> f64 {
        let p = &self.params;
        p.yearly_amplitude * (PI * month / 6.0 + (PI / 2.0 - PI * p.peak_month / 6.0)).sin()
            + p.yearly_mean
    }

    fn daily_term(&self, month: f64, hour: f64) -> f64 {
        let p = &self.params;
        let mid = (p.daily_max_amplitude + p.daily_min_amplitude) / 2.0;
        let half_span = (p.daily_max_amplitude - p.daily_min_amplitude) / 2.0;
        let diurnal = (PI * (hour + 6.0 - p.peak_hour) / 12.0).sin();

        match p.daily_amplitude {
            DailyAmplitude::Legacy => {
                let seasonal = (PI * month / 6.0 - PI * (3.0 + p.min_variability_month) / 6.0).sin();
                mid + half_span * seasonal * diurnal
            }
            DailyAmplitude::Corrected => {
                let amplitude =
                    mid - half_span * (PI * (month - p.min_variability_month) / 6.0).cos();
                amplitude * diurnal
            }
        }
    }
}

impl SignalModel for SeasonalModel {
    fn sample(&self, _sensor: usize, at: &DateTime<Local>, rng: &mut dyn RngCore) -> f64 {
        let t = SeasonalTime::from_datetime(at);
        let value = self.evaluate(t.month, t.hour) + self.noise.sample(rng);
        cap(value, self.ceiling)
    }
}

/// Apply the ceiling. NaN passes through so the finiteness check still sees it.
fn cap(value: f64, ceiling: Option<f64>) -> f64 {
    match ceiling {
        Some(ceiling) if value > ceiling => ceiling,
        _ => value,
    }
}
