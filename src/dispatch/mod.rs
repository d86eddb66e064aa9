use std::sync::Arc;

use flume::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::health::HealthMetrics;
use crate::protocol::{self, Datapoint, MetricKind};

/// Per-datatype queue senders the dispatcher routes into.
#[derive(Clone)]
pub struct Routes {
    pub counters: Sender<Datapoint>,
    pub gauges: Sender<Datapoint>,
    pub timers: Sender<Datapoint>,
}

impl Routes {
    fn sender_for(&self, kind: MetricKind) -> &Sender<Datapoint> {
        match kind {
            MetricKind::Counter => &self.counters,
            MetricKind::Gauge => &self.gauges,
            MetricKind::Timer => &self.timers,
        }
    }
}

/// A fixed pool of workers that drain the ingest queue, parse each line,
/// and push recognized datapoints into the queue for their datatype.
///
/// A full datatype queue blocks the worker, which in turn stops draining
/// the ingest queue, so backpressure reaches the listeners without any
/// internal dropping. Lines the parser rejects are counted and forgotten.
pub struct DispatcherPool {
    workers: usize,
    ingest: Receiver<String>,
    routes: Routes,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
}

impl DispatcherPool {
    pub fn new(
        workers: usize,
        ingest: Receiver<String>,
        routes: Routes,
        health: Option<Arc<HealthMetrics>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            workers,
            ingest,
            routes,
            health,
            cancel,
        }
    }

    /// Spawns all workers.
    pub fn spawn(self) {
        info!(workers = self.workers, "dispatcher pool started");

        for _ in 0..self.workers {
            tokio::spawn(worker_loop(
                self.ingest.clone(),
                self.routes.clone(),
                self.health.clone(),
                self.cancel.clone(),
            ));
        }
    }
}

async fn worker_loop(
    ingest: Receiver<String>,
    routes: Routes,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            line = ingest.recv_async() => match line {
                Ok(line) => match protocol::parse_line(&line) {
                    Some(d) => {
                        if let Some(h) = &health {
                            h.datapoints_routed
                                .with_label_values(&[d.kind.as_str()])
                                .inc();
                        }

                        if routes.sender_for(d.kind).send_async(d).await.is_err() {
                            return;
                        }
                    }
                    None => {
                        if let Some(h) = &health {
                            h.lines_malformed.inc();
                        }
                    }
                },
                Err(_) => return,
            },
        }
    }
}
