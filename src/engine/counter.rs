//! The counter engine: per-retention bucket wheels of running sums.

use flume::Receiver;
use tokio_util::sync::CancellationToken;

use crate::clock::Tick;
use crate::protocol::Datapoint;
use crate::sink::{Observation, SinkSet};

use super::aligned_timestamp;
use super::wheel::BucketWheel;

/// Sums counter values into one bucket wheel per retention and flushes the
/// current slot of every wheel on each heartbeat.
///
/// The retention interval only affects the wheel's slot count, the emitted
/// timestamp alignment, and the sink routing: index 0 goes to the
/// recent-values store, everything else to the historical files with an
/// `:<interval>` channel suffix.
pub struct CounterEngine {
    retentions: Vec<u64>,
    wheels: Vec<BucketWheel<f64>>,
    sinks: SinkSet,
}

impl CounterEngine {
    /// Creates the engine. `slot_counts[i]` is `retentions[i] / heartbeat`.
    pub fn new(retentions: Vec<u64>, slot_counts: &[usize], sinks: SinkSet) -> Self {
        debug_assert_eq!(retentions.len(), slot_counts.len());
        Self {
            retentions,
            wheels: slot_counts.iter().map(|&n| BucketWheel::new(n)).collect(),
            sinks,
        }
    }

    /// Adds the datapoint's value to its hash-assigned slot in every
    /// retention's wheel.
    pub fn record(&mut self, d: &Datapoint) {
        for wheel in &mut self.wheels {
            wheel.record(&d.name, |sum| *sum += d.value);
        }
    }

    /// Flushes the current slot of every retention in ascending interval
    /// order, then advances each wheel by one slot. Zero sums are
    /// suppressed; the bucket is cleared either way.
    pub async fn flush(&mut self, now_unix: i64) {
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            let interval = self.retentions[i];
            let ts = aligned_timestamp(now_unix, interval);

            for (name, sum) in wheel.drain_current() {
                if sum <= 0.0 {
                    continue;
                }

                if i == 0 {
                    self.sinks
                        .to_recent(Observation {
                            channel: format!("counters:{name}"),
                            payload: format!("{ts}<X>{sum}"),
                            timestamp: ts,
                        })
                        .await;
                } else {
                    self.sinks
                        .to_disk(Observation {
                            channel: format!("counters:{name}:{interval}"),
                            payload: format!("{ts} {sum}\n"),
                            timestamp: ts,
                        })
                        .await;
                }
            }

            wheel.advance();
        }
    }

    /// Consumes datapoints and heartbeat ticks until cancellation or queue
    /// close.
    pub async fn run(
        mut self,
        rx: Receiver<Datapoint>,
        mut ticks: tokio::sync::mpsc::Receiver<Tick>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                d = rx.recv_async() => match d {
                    Ok(d) => self.record(&d),
                    Err(_) => return,
                },
                tick = ticks.recv() => match tick {
                    Some(tick) => self.flush(tick.now_unix).await,
                    None => return,
                },
            }
        }
    }
}
