//! Pipeline configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{HarmonicModel, HarmonicParams, SeasonalModel, SeasonalParams};
use crate::pipeline::{
    Channel, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL,
    DEFAULT_SAMPLE_RATE, Pipeline,
};
use crate::storage::{DEFAULT_COMMIT_RETRIES, DEFAULT_RETRY_BACKOFF, MeasurementKind};

use super::validation::ConfigError;

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_commit_retries() -> u32 {
    DEFAULT_COMMIT_RETRIES
}

fn default_commit_retry_backoff() -> Duration {
    DEFAULT_RETRY_BACKOFF
}

// =============================================================================
// Model Configuration
// =============================================================================

/// Signal model of a channel.
///
/// Written as a single-key map naming the model:
///
/// ```yaml
/// model:
///   harmonic:
///     seed: 42
///     drift_ratio: 0.006
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelConfig {
    /// Yearly + daily sinusoids.
    Seasonal(SeasonalParams),
    /// Resonant modes with diurnal drift.
    Harmonic(HarmonicParams),
}

// =============================================================================
// Channel Configuration
// =============================================================================

/// One measurement family of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Measurement family.
    pub kind: MeasurementKind,

    /// External sensor numbers.
    pub sensors: Vec<i64>,

    /// Model override; defaults depend on `kind`.
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub model: Option<ModelConfig>,
}

impl ChannelConfig {
    /// Build the channel and its model.
    ///
    /// Without an explicit model, temperature and humidity use the climate
    /// generator's seasonal parameters and acceleration the default harmonic
    /// parameters. Humidity is always capped, so it only accepts a seasonal model.
    pub fn to_channel(&self) -> Result<Channel, ConfigError> {
        let sensors = self.sensors.clone();
        let model_error = |e: crate::model::ModelError| {
            ConfigError::ValidationError(format!("{} channel: {}", self.kind, e))
        };

        let channel = match (self.kind, &self.model) {
            (MeasurementKind::Humidity, Some(ModelConfig::Harmonic(_))) => {
                return Err(ConfigError::ValidationError(
                    "humidity channel requires a seasonal model".to_string(),
                ));
            }
            (MeasurementKind::Humidity, model) => {
                let params = match model {
                    Some(ModelConfig::Seasonal(p)) => p.clone(),
                    _ => SeasonalParams::humidity_defaults(),
                };
                Channel::new(
                    self.kind,
                    sensors,
                    SeasonalModel::humidity(params).map_err(model_error)?,
                )
            }
            (kind, Some(ModelConfig::Seasonal(params))) => Channel::new(
                kind,
                sensors,
                SeasonalModel::temperature(params.clone()).map_err(model_error)?,
            ),
            (kind, Some(ModelConfig::Harmonic(params))) => Channel::new(
                kind,
                sensors,
                HarmonicModel::generate(params, self.sensors.len()).map_err(model_error)?,
            ),
            (MeasurementKind::Temperature, None) => Channel::new(
                self.kind,
                sensors,
                SeasonalModel::temperature(SeasonalParams::temperature_defaults())
                    .map_err(model_error)?,
            ),
            (MeasurementKind::Acceleration, None) => Channel::new(
                self.kind,
                sensors,
                HarmonicModel::generate(&HarmonicParams::default(), self.sensors.len())
                    .map_err(model_error)?,
            ),
        };
        Ok(channel)
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// One pipeline: a store plus the channels sampled into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unique pipeline name.
    pub name: String,

    /// sqlx SQLite URL, e.g. `sqlite:data/climate.db`.
    pub store: String,

    /// Sample rate in Hz (default: 1).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,

    /// Run length; absent or `0s` runs until stopped.
    #[serde(default, with = "humantime_serde")]
    pub run_duration: Option<Duration>,

    /// Ticks per committed batch (default: 20).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Commit partial batches after this long (default: off).
    #[serde(default, with = "humantime_serde")]
    pub flush_interval: Option<Duration>,

    /// Consumer's bounded queue wait (default: 100ms).
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Producer to consumer queue capacity (default: 10000).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Retries after a failed commit (default: 3).
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,

    /// Backoff unit between commit retries (default: 100ms).
    #[serde(default = "default_commit_retry_backoff", with = "humantime_serde")]
    pub commit_retry_backoff: Duration,

    /// Noise seed for reproducible runs.
    #[serde(default)]
    pub noise_seed: Option<u64>,

    /// Stop after this many ticks.
    #[serde(default)]
    pub tick_limit: Option<u64>,

    /// Measurement channels.
    pub channels: Vec<ChannelConfig>,
}

impl PipelineConfig {
    /// Build an idle pipeline from this configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` for invalid model or pipeline parameters.
    pub fn to_pipeline(&self) -> Result<Pipeline, ConfigError> {
        let mut builder = Pipeline::builder(&self.name, &self.store)
            .sample_rate(self.sample_rate)
            .run_duration(self.run_duration)
            .tick_limit(self.tick_limit)
            .noise_seed(self.noise_seed)
            .batch_size(self.batch_size)
            .flush_interval(self.flush_interval)
            .poll_interval(self.poll_interval)
            .channel_capacity(self.channel_capacity)
            .commit_retries(self.commit_retries)
            .commit_retry_backoff(self.commit_retry_backoff);

        for channel in &self.channels {
            let channel = channel.to_channel().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("pipeline '{}': {}", self.name, msg))
                }
                other => other,
            })?;
            builder = builder.channel(channel);
        }

        builder
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Validate by building the pipeline without starting it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_pipeline().map(|_| ())
    }
}
