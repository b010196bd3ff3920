//! Sampling producer.
//!
//! Paced loop: sleep until the next deadline, stamp the tick, sample every
//! sensor of every channel, and hand the tick to the consumer. A missed
//! deadline fires immediately and rebases the schedule, so pacing never
//! bursts to catch up and no tick is fabricated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::model::{ModelError, check_finite};
use crate::pipeline::channel::Channel;
use crate::storage::MeasurementKind;

/// One sampled value, still keyed by the external sensor number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Measurement family.
    pub kind: MeasurementKind,
    /// External sensor number.
    pub sensor_number: i64,
    /// Sampled value.
    pub value: f64,
}

/// All readings taken at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Capture time; strictly increasing across a run.
    pub timestamp: DateTime<Utc>,
    /// One reading per configured sensor.
    pub readings: Vec<Reading>,
}

/// Pacing and termination settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerSettings {
    /// Target sample rate in Hz.
    pub sample_rate: f64,
    /// Stop once the next tick would be scheduled past this offset from start.
    pub run_duration: Option<Duration>,
    /// Stop after this many ticks were handed to the consumer.
    pub tick_limit: Option<u64>,
    /// Seed for the noise generator; `None` seeds from OS entropy.
    pub noise_seed: Option<u64>,
}

impl ProducerSettings {
    /// Target period between ticks.
    ///
    /// `None` when the rate gives no usable period: non-positive or
    /// non-finite rates, a period that rounds to zero, or one that does not
    /// fit a [`Duration`].
    pub fn period(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(1.0 / self.sample_rate)
            .ok()
            .filter(|period| !period.is_zero())
    }

    /// Whether a deadline one period from now can be represented.
    pub(crate) fn is_schedulable(&self) -> bool {
        self.period()
            .is_some_and(|period| Instant::now().checked_add(period).is_some())
    }
}

/// Counters reported when the producer stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProducerReport {
    /// Ticks handed to the consumer.
    pub ticks: u64,
    /// Ticks dropped because a model returned a non-finite value.
    pub rejected_ticks: u64,
    /// Deadlines that had already passed when they came up.
    pub missed_deadlines: u64,
    /// Timestamp of the first enqueued tick.
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Timestamp of the last enqueued tick.
    pub last_timestamp: Option<DateTime<Utc>>,
}

pub(crate) struct Producer {
    channels: Arc<[Channel]>,
    settings: ProducerSettings,
    tx: mpsc::Sender<Tick>,
    cancel: CancellationToken,
    rng: ChaCha8Rng,
    sensor_total: usize,
}

impl Producer {
    pub(crate) fn new(
        channels: Arc<[Channel]>,
        settings: ProducerSettings,
        tx: mpsc::Sender<Tick>,
        cancel: CancellationToken,
    ) -> Self {
        let rng = match settings.noise_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let sensor_total = channels.iter().map(|c| c.sensors().len()).sum();
        Self {
            channels,
            settings,
            tx,
            cancel,
            rng,
            sensor_total,
        }
    }

    /// Run until cancelled, the run duration elapses, or the tick limit is hit.
    ///
    /// Dropping the sender on return is what tells the consumer the queue is final.
    pub(crate) async fn run(mut self) -> ProducerReport {
        let mut report = ProducerReport::default();
        let Some(period) = self.settings.period() else {
            tracing::error!(
                sample_rate = self.settings.sample_rate,
                "Sample rate gives no usable tick period, producer not started"
            );
            self.cancel.cancel();
            return report;
        };
        let started = Instant::now();
        let mut next_deadline = started;

        tracing::info!(
            sample_rate = self.settings.sample_rate,
            sensors = self.sensor_total,
            "Producer started"
        );

        while !self.cancel.is_cancelled() {
            let Some(deadline) = next_deadline.checked_add(period) else {
                tracing::error!(period = ?period, "Next deadline out of range, stopping producer");
                self.cancel.cancel();
                break;
            };
            next_deadline = deadline;
            let now = Instant::now();
            if next_deadline < now {
                report.missed_deadlines += 1;
                tracing::debug!(
                    late_by = ?now - next_deadline,
                    "Deadline missed, firing immediately"
                );
                next_deadline = now;
            }

            if let Some(limit) = self.settings.run_duration
                && next_deadline - started > limit
            {
                tracing::info!(run_duration = ?limit, "Run duration elapsed");
                self.cancel.cancel();
                break;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(next_deadline) => {}
            }

            let timestamp = strictly_after(report.last_timestamp, Utc::now());
            let tick = match self.sample(timestamp) {
                Ok(tick) => tick,
                Err(e) => {
                    report.rejected_ticks += 1;
                    tracing::error!(error = %e, %timestamp, "Tick rejected");
                    continue;
                }
            };

            if self.tx.send(tick).await.is_err() {
                tracing::error!("Consumer queue closed, stopping producer");
                self.cancel.cancel();
                break;
            }
            report.ticks += 1;
            report.first_timestamp.get_or_insert(timestamp);
            report.last_timestamp = Some(timestamp);

            if let Some(limit) = self.settings.tick_limit
                && report.ticks >= limit
            {
                tracing::info!(ticks = report.ticks, "Tick limit reached");
                self.cancel.cancel();
                break;
            }
        }

        tracing::info!(
            ticks = report.ticks,
            rejected = report.rejected_ticks,
            missed_deadlines = report.missed_deadlines,
            "Producer stopped"
        );
        report
    }

    fn sample(&mut self, timestamp: DateTime<Utc>) -> Result<Tick, ModelError> {
        let local = timestamp.with_timezone(&Local);
        let mut readings = Vec::with_capacity(self.sensor_total);

        for channel in self.channels.iter() {
            let kind = channel.kind();
            for (index, number) in channel.sensors().iter().enumerate() {
                let value = channel.model().sample(index, &local, &mut self.rng);
                readings.push(Reading {
                    kind,
                    sensor_number: *number,
                    value: check_finite(kind, *number, value)?,
                });
            }
        }

        Ok(Tick {
            timestamp,
            readings,
        })
    }
}

/// `now` truncated to microseconds, bumped past `previous` if the clock stalled or stepped back.
fn strictly_after(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let mut micros = now.timestamp_micros();
    if let Some(prev) = previous {
        micros = micros.max(prev.timestamp_micros() + 1);
    }
    DateTime::from_timestamp_micros(micros).unwrap_or(now)
}
