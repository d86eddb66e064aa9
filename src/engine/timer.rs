//! The timer engine: per-retention bucket wheels of raw sample lists,
//! summarized at flush.

use flume::Receiver;
use tokio_util::sync::CancellationToken;

use crate::clock::Tick;
use crate::protocol::Datapoint;
use crate::sink::{Observation, SinkSet};

use super::aligned_timestamp;
use super::stats::TimerSummary;
use super::wheel::BucketWheel;

/// Collects raw timer samples into one bucket wheel per retention. On each
/// heartbeat the current slot's sample lists are summarized into the
/// nine-part aggregate and routed like counter flushes: retention 0 to the
/// recent-values store, the rest to historical files.
pub struct TimerEngine {
    retentions: Vec<u64>,
    wheels: Vec<BucketWheel<Vec<f64>>>,
    sinks: SinkSet,
}

impl TimerEngine {
    /// Creates the engine. `slot_counts[i]` is `retentions[i] / heartbeat`.
    pub fn new(retentions: Vec<u64>, slot_counts: &[usize], sinks: SinkSet) -> Self {
        debug_assert_eq!(retentions.len(), slot_counts.len());
        Self {
            retentions,
            wheels: slot_counts.iter().map(|&n| BucketWheel::new(n)).collect(),
            sinks,
        }
    }

    /// Appends the sample to its hash-assigned slot in every retention's
    /// wheel.
    pub fn record(&mut self, d: &Datapoint) {
        for wheel in &mut self.wheels {
            wheel.record(&d.name, |samples| samples.push(d.value));
        }
    }

    /// Flushes the current slot of every retention in ascending interval
    /// order, then advances each wheel by one slot. Empty sample lists emit
    /// nothing.
    pub async fn flush(&mut self, now_unix: i64) {
        for (i, wheel) in self.wheels.iter_mut().enumerate() {
            let interval = self.retentions[i];
            let ts = aligned_timestamp(now_unix, interval);

            for (name, samples) in wheel.drain_current() {
                let Some(summary) = TimerSummary::compute(&samples) else {
                    continue;
                };
                let aggregates = summary.format();

                if i == 0 {
                    self.sinks
                        .to_recent(Observation {
                            channel: format!("timers:{name}"),
                            payload: format!("{ts}<X>{aggregates}"),
                            timestamp: ts,
                        })
                        .await;
                } else {
                    self.sinks
                        .to_disk(Observation {
                            channel: format!("timers:{name}:{interval}"),
                            payload: format!("{ts} {aggregates}\n"),
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
