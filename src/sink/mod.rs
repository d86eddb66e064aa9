pub mod disk;
pub mod recent;
pub mod registry;

use tokio::sync::mpsc;
use tracing::warn;

/// A flushed, sink-ready record.
///
/// `channel` is the prefixed metric identifier (`counters:foo`,
/// `timers:foo:60`, ...), `payload` the pre-rendered line or member bytes,
/// `timestamp` the retention-aligned Unix second used as the recent-store
/// score.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub channel: String,
    pub payload: String,
    pub timestamp: i64,
}

/// Sender handles the engines use to fan observations out to the writers.
/// Sends block when a sink queue is full, backpressuring the engine.
#[derive(Clone)]
pub struct SinkSet {
    disk: mpsc::Sender<Observation>,
    recent: mpsc::Sender<Observation>,
}

impl SinkSet {
    pub fn new(disk: mpsc::Sender<Observation>, recent: mpsc::Sender<Observation>) -> Self {
        Self { disk, recent }
    }

    /// Queues an observation for the historical file store.
    pub async fn to_disk(&self, obs: Observation) {
        if self.disk.send(obs).await.is_err() {
            warn!("historical sink queue closed, dropping observation");
        }
    }

    /// Queues an observation for the recent-values store.
    pub async fn to_recent(&self, obs: Observation) {
        if self.recent.send(obs).await.is_err() {
            warn!("recent sink queue closed, dropping observation");
        }
    }
}
