//! Pipeline lifecycle.
//!
//! A [`Pipeline`] is built once from validated settings and can then be
//! started and stopped repeatedly. Each run gets its own cancellation token,
//! queue, producer task and consumer task. `stop()` cancels the token and
//! joins both tasks, so it returns only after the consumer has committed
//! everything the producer enqueued.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::pipeline::PipelineError;
use crate::pipeline::channel::Channel;
use crate::pipeline::consumer::{Consumer, ConsumerReport, ConsumerSettings, DEFAULT_POLL_INTERVAL};
use crate::pipeline::producer::{Producer, ProducerReport, ProducerSettings};
use crate::storage::{
    BatchWriter, DEFAULT_COMMIT_RETRIES, DEFAULT_RETRY_BACKOFF, MeasurementKind, SqlitePool,
    ensure_schema, ensure_sensors, load_sensor_map,
};

// =============================================================================
// Defaults
// =============================================================================

/// Default queue capacity between producer and consumer.
///
/// At 1 kHz this holds ten seconds of ticks before the producer waits.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Default ticks per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: f64 = 1.0;

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`Pipeline`].
///
/// All parameters are checked by [`build`](Self::build), before any task can
/// be started.
pub struct PipelineBuilder {
    name: String,
    store: String,
    channels: Vec<Channel>,
    sample_rate: f64,
    run_duration: Option<Duration>,
    tick_limit: Option<u64>,
    noise_seed: Option<u64>,
    batch_size: usize,
    flush_interval: Option<Duration>,
    poll_interval: Duration,
    channel_capacity: usize,
    commit_retries: u32,
    commit_retry_backoff: Duration,
}

impl PipelineBuilder {
    /// Create a builder for a pipeline writing to `store` (an sqlx SQLite URL).
    pub fn new(name: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: store.into(),
            channels: Vec::new(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            run_duration: None,
            tick_limit: None,
            noise_seed: None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            commit_retries: DEFAULT_COMMIT_RETRIES,
            commit_retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Add a measurement channel.
    pub fn channel(mut self, channel: Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Set the sample rate in Hz.
    pub fn sample_rate(mut self, hz: f64) -> Self {
        self.sample_rate = hz;
        self
    }

    /// Bound each run to a wall-clock duration. `None` or zero runs until stopped.
    pub fn run_duration(mut self, duration: Option<Duration>) -> Self {
        self.run_duration = duration.filter(|d| !d.is_zero());
        self
    }

    /// Stop each run after this many ticks.
    pub fn tick_limit(mut self, limit: Option<u64>) -> Self {
        self.tick_limit = limit;
        self
    }

    /// Seed the measurement noise for reproducible runs.
    pub fn noise_seed(mut self, seed: Option<u64>) -> Self {
        self.noise_seed = seed;
        self
    }

    /// Set the number of ticks per committed batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Commit a partial batch once it is this old.
    pub fn flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the consumer's bounded queue wait.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the queue capacity between producer and consumer.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the number of retries after a failed commit.
    pub fn commit_retries(mut self, retries: u32) -> Self {
        self.commit_retries = retries;
        self
    }

    /// Set the backoff unit between commit retries.
    pub fn commit_retry_backoff(mut self, backoff: Duration) -> Self {
        self.commit_retry_backoff = backoff;
        self
    }

    /// Validate the settings and build an idle pipeline.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let invalid = |msg: String| -> Result<Pipeline, PipelineError> {
            Err(PipelineError::InvalidConfig(msg))
        };

        if self.name.trim().is_empty() {
            return invalid("pipeline name must not be empty".to_string());
        }
        if self.store.trim().is_empty() {
            return invalid(format!("pipeline '{}': store must not be empty", self.name));
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return invalid(format!(
                "pipeline '{}': sample rate must be positive and finite, got {}",
                self.name, self.sample_rate
            ));
        }
        let producer = ProducerSettings {
            sample_rate: self.sample_rate,
            run_duration: self.run_duration,
            tick_limit: self.tick_limit,
            noise_seed: self.noise_seed,
        };
        if !producer.is_schedulable() {
            return invalid(format!(
                "pipeline '{}': sample rate {} gives no usable tick period",
                self.name, self.sample_rate
            ));
        }
        if self.batch_size == 0 {
            return invalid(format!("pipeline '{}': batch size must be at least 1", self.name));
        }
        if self.channel_capacity == 0 {
            return invalid(format!(
                "pipeline '{}': channel capacity must be at least 1",
                self.name
            ));
        }
        if self.poll_interval.is_zero() {
            return invalid(format!("pipeline '{}': poll interval must be positive", self.name));
        }
        if self.flush_interval.is_some_and(|d| d.is_zero()) {
            return invalid(format!("pipeline '{}': flush interval must be positive", self.name));
        }
        if self.tick_limit == Some(0) {
            return invalid(format!("pipeline '{}': tick limit must be at least 1", self.name));
        }
        if self.channels.is_empty() {
            return invalid(format!("pipeline '{}': no channels configured", self.name));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.sensors().is_empty() {
                return invalid(format!(
                    "pipeline '{}': {} channel has no sensors",
                    self.name,
                    channel.kind()
                ));
            }
            if let Some(expected) = channel.model().sensor_count()
                && expected != channel.sensors().len()
            {
                return invalid(format!(
                    "pipeline '{}': {} model is parameterized for {} sensors, channel lists {}",
                    self.name,
                    channel.kind(),
                    expected,
                    channel.sensors().len()
                ));
            }
            for number in channel.sensors() {
                if !seen.insert(*number) {
                    return invalid(format!(
                        "pipeline '{}': sensor number {} is used more than once",
                        self.name, number
                    ));
                }
            }
        }

        Ok(Pipeline {
            name: self.name,
            store: self.store,
            channels: Arc::from(self.channels),
            producer,
            consumer: ConsumerSettings {
                batch_size: self.batch_size,
                flush_interval: self.flush_interval,
                poll_interval: self.poll_interval,
            },
            channel_capacity: self.channel_capacity,
            commit_retries: self.commit_retries,
            commit_retry_backoff: self.commit_retry_backoff,
            run: None,
        })
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Outcome of one run, available after `stop()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Producer counters.
    pub producer: ProducerReport,
    /// Consumer counters.
    pub consumer: ConsumerReport,
}

impl RunSummary {
    /// Every enqueued tick was received and committed.
    pub fn is_lossless(&self) -> bool {
        self.consumer.lost_batches.is_empty()
            && self.consumer.ticks_received == self.producer.ticks
            && self.consumer.ticks_committed == self.producer.ticks
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    pool: SqlitePool,
    producer: JoinHandle<ProducerReport>,
    consumer: JoinHandle<ConsumerReport>,
    timer: Option<JoinHandle<()>>,
}

/// A producer/consumer pair writing synthetic telemetry to one store.
pub struct Pipeline {
    name: String,
    store: String,
    channels: Arc<[Channel]>,
    producer: ProducerSettings,
    consumer: ConsumerSettings,
    channel_capacity: usize,
    commit_retries: u32,
    commit_retry_backoff: Duration,
    run: Option<ActiveRun>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("channels", &self.channels)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder(name: impl Into<String>, store: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name, store)
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store URL.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Configured channels.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// A run was started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Prepare the store and spawn the producer and consumer.
    ///
    /// Schema creation, sensor registration and the sensor id lookup all
    /// complete before either task exists.
    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if self.run.is_some() {
            return Err(PipelineError::AlreadyRunning(self.name.clone()));
        }

        let pool = SqlitePool::connect(&self.store).await?;
        let prepared = self.prepare_store(&pool).await;
        let sensors = match prepared {
            Ok(sensors) => sensors,
            Err(e) => {
                pool.close().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let span = tracing::info_span!("pipeline", pipeline = %self.name);

        let writer = BatchWriter::new(pool.clone())
            .with_retries(self.commit_retries)
            .with_backoff(self.commit_retry_backoff);
        let consumer = Consumer::new(writer, sensors, self.consumer.clone());
        let consumer = tokio::spawn(consumer.run(rx, cancel.clone()).instrument(span.clone()));

        let producer = Producer::new(
            Arc::clone(&self.channels),
            self.producer.clone(),
            tx,
            cancel.clone(),
        );
        let producer = tokio::spawn(producer.run().instrument(span.clone()));

        let timer = self.producer.run_duration.map(|duration| {
            let cancel = cancel.clone();
            tokio::spawn(
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(duration) => {
                            tracing::info!(run_duration = ?duration, "Run duration timer fired");
                            cancel.cancel();
                        }
                    }
                }
                .instrument(span),
            )
        });

        self.run = Some(ActiveRun {
            cancel,
            pool,
            producer,
            consumer,
            timer,
        });

        tracing::info!(
            pipeline = %self.name,
            store = %self.store,
            sample_rate = self.producer.sample_rate,
            batch_size = self.consumer.batch_size,
            "Pipeline started"
        );
        Ok(())
    }

    async fn prepare_store(
        &self,
        pool: &SqlitePool,
    ) -> Result<crate::storage::SensorMap, PipelineError> {
        let mut kinds: Vec<MeasurementKind> = Vec::new();
        for channel in self.channels.iter() {
            if !kinds.contains(&channel.kind()) {
                kinds.push(channel.kind());
            }
        }
        ensure_schema(pool, &kinds).await?;

        let numbers: Vec<i64> = self
            .channels
            .iter()
            .flat_map(|c| c.sensors().iter().copied())
            .collect();
        let inserted = ensure_sensors(pool, &numbers).await?;
        tracing::debug!(pipeline = %self.name, inserted, "Sensors registered");

        Ok(load_sensor_map(pool, &numbers).await?)
    }

    /// Resolves once the current run has been cancelled.
    ///
    /// Cancellation comes from `stop()`, the run duration, or the tick limit.
    /// Returns immediately when the pipeline is idle.
    pub async fn finished(&self) {
        if let Some(run) = &self.run {
            run.cancel.cancelled().await;
        }
    }

    /// Cancel the current run and wait until both tasks have terminated.
    ///
    /// Returns `Ok(None)` when the pipeline was not running.
    pub async fn stop(&mut self) -> Result<Option<RunSummary>, PipelineError> {
        let Some(run) = self.run.take() else {
            tracing::warn!(pipeline = %self.name, "Stop requested but pipeline is not running");
            return Ok(None);
        };

        tracing::info!(pipeline = %self.name, "Stopping pipeline");
        run.cancel.cancel();

        let producer = run.producer.await;
        let consumer = run.consumer.await;
        if let Some(timer) = run.timer {
            timer.abort();
        }
        run.pool.close().await;

        let summary = RunSummary {
            producer: producer.map_err(|e| PipelineError::Join(format!("producer: {e}")))?,
            consumer: consumer.map_err(|e| PipelineError::Join(format!("consumer: {e}")))?,
        };

        if summary.is_lossless() {
            tracing::info!(
                pipeline = %self.name,
                ticks = summary.producer.ticks,
                rows = summary.consumer.rows_committed,
                commits = summary.consumer.commits,
                "Pipeline stopped"
            );
        } else {
            tracing::warn!(
                pipeline = %self.name,
                produced = summary.producer.ticks,
                committed = summary.consumer.ticks_committed,
                lost_batches = summary.consumer.lost_batches.len(),
                "Pipeline stopped with data loss"
            );
        }
        Ok(Some(summary))
    }

    /// Stop the pipeline if it is running and release it.
    pub async fn close(mut self) -> Result<Option<RunSummary>, PipelineError> {
        self.stop().await
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            tracing::warn!(pipeline = %self.name, "Pipeline dropped while running, cancelling");
            run.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HarmonicModel, HarmonicParams, SeasonalModel, SeasonalParams};

    fn temperature_channel(sensors: Vec<i64>) -> Channel {
        Channel::new(
            MeasurementKind::Temperature,
            sensors,
            SeasonalModel::temperature(SeasonalParams::temperature_defaults()).unwrap(),
        )
    }

    fn expect_invalid(builder: PipelineBuilder, needle: &str) {
        match builder.build() {
            Err(PipelineError::InvalidConfig(msg)) => {
                assert!(msg.contains(needle), "'{msg}' should mention '{needle}'")
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_builder_defaults() {
        let pipeline = Pipeline::builder("climate", "sqlite::memory:")
            .channel(temperature_channel(vec![1]))
            .build()
            .unwrap();
        assert_eq!(pipeline.name(), "climate");
        assert_eq!(pipeline.store(), "sqlite::memory:");
        assert_eq!(pipeline.consumer.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(pipeline.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_builder_rejects_invalid_settings() {
        let base = || Pipeline::builder("p", "sqlite::memory:").channel(temperature_channel(vec![1]));

        expect_invalid(base().sample_rate(0.0), "sample rate");
        expect_invalid(base().sample_rate(-5.0), "sample rate");
        expect_invalid(base().sample_rate(f64::NAN), "sample rate");
        expect_invalid(base().sample_rate(1e-20), "sample rate");
        expect_invalid(base().sample_rate(1e-19), "sample rate");
        expect_invalid(base().sample_rate(1e300), "sample rate");
        expect_invalid(base().batch_size(0), "batch size");
        expect_invalid(base().channel_capacity(0), "channel capacity");
        expect_invalid(base().tick_limit(Some(0)), "tick limit");
        expect_invalid(Pipeline::builder("p", "sqlite::memory:"), "no channels");
        expect_invalid(
            Pipeline::builder("p", "sqlite::memory:").channel(temperature_channel(vec![])),
            "no sensors",
        );
        expect_invalid(
            base().channel(temperature_channel(vec![1])),
            "sensor number 1",
        );
    }

    #[test]
    fn test_builder_rejects_model_length_mismatch() {
        let model = HarmonicModel::generate(&HarmonicParams::default(), 3).unwrap();
        let builder = Pipeline::builder("acc", "sqlite::memory:").channel(Channel::new(
            MeasurementKind::Acceleration,
            vec![1, 2],
            model,
        ));
        expect_invalid(builder, "parameterized for 3 sensors");
    }

    #[test]
    fn test_zero_run_duration_is_unbounded() {
        let pipeline = Pipeline::builder("p", "sqlite::memory:")
            .channel(temperature_channel(vec![1]))
            .run_duration(Some(Duration::ZERO))
            .build()
            .unwrap();
        assert_eq!(pipeline.producer.run_duration, None);
    }

    #[test]
    fn test_run_summary_lossless() {
        let mut summary = RunSummary::default();
        summary.producer.ticks = 3;
        summary.consumer.ticks_received = 3;
        summary.consumer.ticks_committed = 3;
        assert!(summary.is_lossless());

        summary.consumer.ticks_committed = 2;
        assert!(!summary.is_lossless());
    }

    #[tokio::test]
    async fn test_start_fails_on_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let url = format!("sqlite:{}", blocker.join("db.sqlite").display());

        let mut pipeline = Pipeline::builder("p", url)
            .channel(temperature_channel(vec![1]))
            .build()
            .unwrap();
        assert!(pipeline.start().await.is_err());
        assert!(!pipeline.is_running());
    }
}
