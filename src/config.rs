//! Configuration module for sensorgen.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Pipelines (store URL, sample rate, run length, batching, retries)
//! - Channels (measurement kind, sensor numbers, signal model parameters)

mod app;
mod pipeline;
mod validation;

pub use app::AppConfig;
pub use pipeline::{ChannelConfig, ModelConfig, PipelineConfig};
pub use validation::{ConfigError, expand_env_vars, parse_run_duration};
