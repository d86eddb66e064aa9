//! The recent-values sink: best-effort writes to the external sorted-set
//! store.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::health::HealthMetrics;
use crate::sink::Observation;
use crate::store::Store;

/// Pushes primary-retention observations into the ordered-set store:
/// key = channel, score = aligned timestamp, member = payload.
///
/// Store failures are logged and skipped; recency is best-effort, not
/// durable truth.
pub struct RecentWriter {
    store: Store,
    rx: mpsc::Receiver<Observation>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
}

impl RecentWriter {
    pub fn new(
        store: Store,
        rx: mpsc::Receiver<Observation>,
        health: Option<Arc<HealthMetrics>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            rx,
            health,
            cancel,
        }
    }

    /// Consumes observations until cancellation or queue close.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                obs = self.rx.recv() => match obs {
                    Some(obs) => self.write(obs).await,
                    None => return,
                },
            }
        }
    }

    async fn write(&self, obs: Observation) {
        match self
            .store
            .zadd(&obs.channel, &obs.payload, obs.timestamp)
            .await
        {
            Ok(()) => {
                if let Some(h) = &self.health {
                    h.observations_written.with_label_values(&["recent"]).inc();
                }
            }
            Err(e) => {
                warn!(error = %e, channel = %obs.channel, "recent store write failed, skipping");
                if let Some(h) = &self.health {
                    h.recent_store_errors.inc();
                }
            }
        }
    }
}
