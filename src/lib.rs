//! sensorgen - Synthetic Telemetry Library
//!
//! Generates plausible temperature, humidity and acceleration readings and
//! persists them to SQLite through a paced producer and a batching consumer.
//! It can be used as a library, or run as a standalone binary with the
//! `sensorgen` executable.
//!
//! # Architecture
//!
//! - **Model**: Seasonal and harmonic signal models
//! - **Pipeline**: Producer, consumer and lifecycle controller
//! - **Storage**: SQLite schema, sensor registry and atomic batch writer
//! - **Config**: YAML pipeline definitions
//!
//! # Example
//!
//! ```rust,no_run
//! use sensorgen::{Channel, MeasurementKind, Pipeline, SeasonalModel, SeasonalParams};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let model = SeasonalModel::temperature(SeasonalParams::temperature_defaults())?;
//! let mut pipeline = Pipeline::builder("climate", "sqlite:data/climate.db")
//!     .sample_rate(1.0)
//!     .batch_size(20)
//!     .channel(Channel::new(MeasurementKind::Temperature, vec![1], model))
//!     .build()?;
//!
//! pipeline.start().await?;
//! pipeline.finished().await;
//! let summary = pipeline.stop().await?;
//! assert!(summary.is_some_and(|s| s.is_lossless()));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod model;
pub mod pipeline;
pub mod storage;

pub use config::{AppConfig, ConfigError};
pub use model::{
    HarmonicModel, HarmonicParams, ModelError, SeasonalModel, SeasonalParams, SignalModel,
};
pub use pipeline::{Channel, Pipeline, PipelineBuilder, PipelineError, RunSummary};
pub use storage::{MeasurementKind, SqlitePool, StorageError};
