//! Telemetry Pipeline
//!
//! Paced sampling of signal models into batched, atomic store commits.
//!
//! # Architecture
//!
//! ```text
//! Producer ──► mpsc (bounded, FIFO) ──► Consumer ──► BatchWriter ──► SQLite
//!     ▲                                     ▲
//!     └──────── CancellationToken ──────────┘
//! ```
//!
//! - [`Pipeline`]: Lifecycle controller (`start` / `stop` / `finished`)
//! - [`Channel`]: One measurement family with its sensors and model
//! - Producer: Sleeps to each deadline, samples every sensor, enqueues a tick
//! - Consumer: Batches ticks and commits them; drains the queue before exiting

mod channel;
mod consumer;
mod controller;
mod error;
mod producer;

pub use channel::Channel;
pub use consumer::{ConsumerReport, ConsumerSettings, DEFAULT_POLL_INTERVAL};
pub use controller::{
    DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_SAMPLE_RATE, Pipeline, PipelineBuilder,
    RunSummary,
};
pub use error::PipelineError;
pub use producer::{ProducerReport, ProducerSettings, Reading, Tick};
