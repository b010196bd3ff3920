//! Buffered persistence consumer.
//!
//! Receives ticks in production order, maps sensor numbers to internal ids,
//! and commits them in batches. The consumer runs until the producer drops
//! its sender, so every enqueued tick is seen; the partial batch left at that
//! point is committed before the task returns.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::pipeline::producer::Tick;
use crate::storage::{BatchWriter, LostBatch, MeasurementRow, SensorMap, TickRecord};

// =============================================================================
// Settings
// =============================================================================

/// Default bounded wait on the queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Batching settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSettings {
    /// Ticks per committed batch.
    pub batch_size: usize,
    /// Commit a non-empty batch once its oldest tick waited this long.
    pub flush_interval: Option<Duration>,
    /// Bounded wait on the queue before re-checking flush and cancellation.
    pub poll_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 20,
            flush_interval: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Counters reported when the consumer terminates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerReport {
    /// Ticks taken off the queue.
    pub ticks_received: u64,
    /// Ticks persisted.
    pub ticks_committed: u64,
    /// Measurement rows persisted.
    pub rows_committed: u64,
    /// Successful commits.
    pub commits: u64,
    /// Batches given up after exhausting retries.
    pub lost_batches: Vec<LostBatch>,
    /// Readings dropped because their sensor number had no internal id.
    pub unmapped_readings: u64,
}

impl ConsumerReport {
    /// Ticks contained in lost batches.
    pub fn ticks_lost(&self) -> u64 {
        self.lost_batches.iter().map(|b| b.ticks as u64).sum()
    }
}

// =============================================================================
// Buffer
// =============================================================================

/// Pending ticks with size-based and optional time-based flushing.
struct BatchBuffer {
    items: Vec<TickRecord>,
    capacity: usize,
    flush_interval: Option<Duration>,
    first_pushed: Instant,
}

impl BatchBuffer {
    fn new(capacity: usize, flush_interval: Option<Duration>) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            flush_interval,
            first_pushed: Instant::now(),
        }
    }

    fn push(&mut self, item: TickRecord) {
        // The flush timer counts from the oldest pending tick.
        if self.items.is_empty() {
            self.first_pushed = Instant::now();
        }
        self.items.push(item);
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn is_overdue(&self) -> bool {
        match self.flush_interval {
            Some(interval) => !self.items.is_empty() && self.first_pushed.elapsed() >= interval,
            None => false,
        }
    }

    fn should_flush(&self) -> bool {
        self.is_full() || self.is_overdue()
    }

    fn take(&mut self) -> Vec<TickRecord> {
        std::mem::replace(&mut self.items, Vec::with_capacity(self.capacity))
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Consumer
// =============================================================================

pub(crate) struct Consumer {
    writer: BatchWriter,
    sensors: SensorMap,
    settings: ConsumerSettings,
    buffer: BatchBuffer,
    report: ConsumerReport,
}

impl Consumer {
    pub(crate) fn new(writer: BatchWriter, sensors: SensorMap, settings: ConsumerSettings) -> Self {
        let buffer = BatchBuffer::new(settings.batch_size, settings.flush_interval);
        Self {
            writer,
            sensors,
            settings,
            buffer,
            report: ConsumerReport::default(),
        }
    }

    /// Consume until the queue is closed and empty, then flush the remainder.
    pub(crate) async fn run(
        mut self,
        mut rx: mpsc::Receiver<Tick>,
        cancel: CancellationToken,
    ) -> ConsumerReport {
        tracing::info!(
            batch_size = self.settings.batch_size,
            flush_interval = ?self.settings.flush_interval,
            "Consumer started"
        );
        let mut draining = false;

        loop {
            if !draining && cancel.is_cancelled() {
                draining = true;
                tracing::debug!(pending = rx.len(), "Cancellation observed, draining queue");
            }

            tokio::select! {
                received = rx.recv() => match received {
                    Some(tick) => self.accept(tick),
                    None => break,
                },
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            if self.buffer.should_flush() {
                self.flush().await;
            }
        }

        if !self.buffer.is_empty() {
            tracing::debug!(pending = self.buffer.items.len(), "Committing final partial batch");
            self.flush().await;
        }

        tracing::info!(
            received = self.report.ticks_received,
            committed = self.report.ticks_committed,
            commits = self.report.commits,
            lost_batches = self.report.lost_batches.len(),
            "Consumer stopped"
        );
        self.report
    }

    fn accept(&mut self, tick: Tick) {
        self.report.ticks_received += 1;

        let mut rows = Vec::with_capacity(tick.readings.len());
        for reading in tick.readings {
            match self.sensors.resolve(reading.sensor_number) {
                Some(sensor_id) => rows.push(MeasurementRow {
                    kind: reading.kind,
                    sensor_id,
                    value: reading.value,
                }),
                None => {
                    self.report.unmapped_readings += 1;
                    tracing::warn!(
                        sensor_number = reading.sensor_number,
                        kind = %reading.kind,
                        "Reading for unregistered sensor dropped"
                    );
                }
            }
        }

        self.buffer.push(TickRecord {
            timestamp: tick.timestamp,
            rows,
        });
    }

    async fn flush(&mut self) {
        let batch = self.buffer.take();
        match self.writer.commit_with_retry(&batch).await {
            Ok(stats) => {
                self.report.commits += 1;
                self.report.ticks_committed += stats.ticks as u64;
                self.report.rows_committed += stats.rows as u64;
            }
            Err(lost) => {
                tracing::error!(
                    error = %lost.error,
                    ticks = lost.ticks,
                    rows = lost.rows,
                    first_timestamp = ?lost.first_timestamp,
                    last_timestamp = ?lost.last_timestamp,
                    sensor_ids = ?lost.sensor_ids,
                    attempts = lost.attempts,
                    "Batch lost after exhausting retries"
                );
                self.report.lost_batches.push(lost);
            }
        }
    }
}
