use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::health::HealthMetrics;

/// One heartbeat delivered to a subscribing engine.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Wall-clock time of the tick, Unix seconds.
    pub now_unix: i64,
}

struct Subscriber {
    name: &'static str,
    tx: tokio::sync::mpsc::Sender<Tick>,
}

/// The single tick source driving all aggregation flushes.
///
/// Every subscriber gets a capacity-1 channel. A tick that finds a
/// subscriber's previous tick still unconsumed is dropped for that
/// subscriber only: a slow engine misses aggregation windows instead of
/// queueing them, and never delays delivery to the other engines.
pub struct Heartbeat {
    period: Duration,
    subscribers: Vec<Subscriber>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
}

impl Heartbeat {
    /// Creates a heartbeat with the given period (1s in production).
    pub fn new(period: Duration, health: Option<Arc<HealthMetrics>>) -> Self {
        Self {
            period,
            subscribers: Vec::with_capacity(2),
            health,
            cancel: CancellationToken::new(),
        }
    }

    /// Registers an engine by name and returns its tick channel. Must be
    /// called before [`Heartbeat::start`].
    pub fn subscribe(&mut self, name: &'static str) -> tokio::sync::mpsc::Receiver<Tick> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        self.subscribers.push(Subscriber { name, tx });
        rx
    }

    /// Starts the background tick task, fanning each tick out to every
    /// subscriber registered so far.
    pub fn start(&mut self) {
        let subscribers = std::mem::take(&mut self.subscribers);
        let period = self.period;
        let health = self.health.clone();
        let cancel = self.cancel.clone();

        info!(period = ?period, subscribers = subscribers.len(), "heartbeat started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("heartbeat stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let tick = Tick { now_unix: Utc::now().timestamp() };

                        if let Some(h) = &health {
                            h.heartbeat_ticks.inc();
                        }

                        for sub in &subscribers {
                            use tokio::sync::mpsc::error::TrySendError;

                            match sub.tx.try_send(tick) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    debug!(engine = sub.name, "tick dropped, engine busy");
                                    if let Some(h) = &health {
                                        h.heartbeat_missed
                                            .with_label_values(&[sub.name])
                                            .inc();
                                    }
                                }
                                Err(TrySendError::Closed(_)) => {
                                    debug!(engine = sub.name, "tick channel closed");
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Stops the background task.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_ticks() {
        let mut hb = Heartbeat::new(Duration::from_millis(10), None);
        let mut rx = hb.subscribe("counter");
        hb.start();

        let tick = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("tick within a second")
            .expect("channel open");
        assert!(tick.now_unix > 0);

        hb.stop();
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_block_others() {
        let mut hb = Heartbeat::new(Duration::from_millis(10), None);
        let _stalled = hb.subscribe("stalled");
        let mut live = hb.subscribe("live");
        hb.start();

        // The stalled receiver never drains; the live one must still see
        // multiple ticks.
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), live.recv())
                .await
                .expect("tick within a second")
                .expect("channel open");
        }

        hb.stop();
    }

    #[tokio::test]
    async fn test_stop_ends_delivery() {
        let mut hb = Heartbeat::new(Duration::from_millis(10), None);
        let mut rx = hb.subscribe("counter");
        hb.start();

        rx.recv().await.expect("first tick");
        hb.stop();

        // Drain whatever was in flight; afterwards the channel closes.
        loop {
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => break, // no more ticks arriving is also fine
            }
        }
    }
}
