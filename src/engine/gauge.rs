//! The gauge engine: stateless pass-through to the historical sink.

use flume::Receiver;
use tokio_util::sync::CancellationToken;

use crate::protocol::Datapoint;
use crate::sink::{Observation, SinkSet};

/// Emits exactly one historical observation per gauge datapoint. A gauge is
/// the raw point-in-time value; aggregating it would lose information, so
/// gauges carry no wheel and do not subscribe to the heartbeat.
pub struct GaugeEngine {
    sinks: SinkSet,
}

impl GaugeEngine {
    pub fn new(sinks: SinkSet) -> Self {
        Self { sinks }
    }

    /// Renders the datapoint as its sink-ready record. The payload carries
    /// the ingestion time; the record timestamp stays zero because gauges
    /// never reach the scored recent store.
    pub fn observation(d: &Datapoint) -> Observation {
        Observation {
            channel: format!("gauges:{}", d.name),
            payload: format!("{} {}\n", d.timestamp, d.value),
            timestamp: 0,
        }
    }

    /// Consumes datapoints until cancellation or queue close.
    pub async fn run(self, rx: Receiver<Datapoint>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                d = rx.recv_async() => match d {
                    Ok(d) => self.sinks.to_disk(Self::observation(&d)).await,
                    Err(_) => return,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MetricKind;

    #[test]
    fn test_observation_format() {
        let d = Datapoint {
            name: "temp".to_string(),
            value: 72.5,
            kind: MetricKind::Gauge,
            timestamp: 1_700_000_000,
        };

        let obs = GaugeEngine::observation(&d);
        assert_eq!(obs.channel, "gauges:temp");
        assert_eq!(obs.payload, "1700000000 72.5\n");
        assert_eq!(obs.timestamp, 0);
    }

    #[test]
    fn test_whole_values_render_without_fraction() {
        let d = Datapoint {
            name: "connections".to_string(),
            value: 3.0,
            kind: MetricKind::Gauge,
            timestamp: 1_700_000_001,
        };

        let obs = GaugeEngine::observation(&d);
        assert_eq!(obs.payload, "1700000001 3\n");
    }

    #[tokio::test]
    async fn test_pass_through_one_observation_per_datapoint() {
        let (disk_tx, mut disk_rx) = tokio::sync::mpsc::channel(16);
        let (recent_tx, mut recent_rx) = tokio::sync::mpsc::channel(16);
        let sinks = SinkSet::new(disk_tx, recent_tx);

        let (tx, rx) = flume::bounded(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(GaugeEngine::new(sinks).run(rx, cancel));

        for i in 0..3 {
            tx.send_async(Datapoint {
                name: "temp".to_string(),
                value: f64::from(i),
                kind: MetricKind::Gauge,
                timestamp: 1_700_000_000 + i64::from(i),
            })
            .await
            .expect("queue open");
        }
        drop(tx);
        handle.await.expect("join");

        let mut seen = Vec::new();
        while let Some(obs) = disk_rx.recv().await {
            seen.push(obs);
        }
        assert_eq!(seen.len(), 3);

        // Timestamps arrive in ingestion order.
        let timestamps: Vec<&str> = seen
            .iter()
            .map(|o| o.payload.split(' ').next().expect("payload has ts"))
            .collect();
        assert_eq!(timestamps, vec!["1700000000", "1700000001", "1700000002"]);

        // Gauges never touch the recent sink.
        assert!(recent_rx.try_recv().is_err());
    }
}
