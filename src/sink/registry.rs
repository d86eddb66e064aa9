//! The name-registry sink: records which channels have historical files.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::health::HealthMetrics;
use crate::store::Store;

/// Set key under which all known channel names are collected.
pub const REGISTRY_KEY: &str = "datapoints";

/// Adds each newly created channel name to the external name set. Fed by
/// the disk writer, once per first file creation.
pub struct RegistryWriter {
    store: Store,
    rx: mpsc::Receiver<String>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
}

impl RegistryWriter {
    pub fn new(
        store: Store,
        rx: mpsc::Receiver<String>,
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

    /// Consumes channel names until cancellation or queue close.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                name = self.rx.recv() => match name {
                    Some(name) => self.register(&name).await,
                    None => return,
                },
            }
        }
    }

    async fn register(&self, name: &str) {
        match self.store.sadd(REGISTRY_KEY, name).await {
            Ok(()) => {
                if let Some(h) = &self.health {
                    h.names_registered.inc();
                }
            }
            Err(e) => {
                warn!(error = %e, channel = %name, "name registry write failed, skipping");
            }
        }
    }
}
