//! The historical sink: append-only per-metric files.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::health::HealthMetrics;
use crate::pathing;
use crate::sink::Observation;

/// Writes each observation to its channel's datapoint file, creating the
/// file (and registering the channel name) on first sight.
///
/// Every observation is flushed and the file closed before the next one is
/// taken, so an observation is durable once consumed. Any I/O error other
/// than the expected missing-file-on-open is an integrity failure and
/// terminates the writer with an error the caller treats as fatal.
pub struct DiskWriter {
    root: PathBuf,
    rx: mpsc::Receiver<Observation>,
    registry_tx: mpsc::Sender<String>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
}

impl DiskWriter {
    pub fn new(
        root: PathBuf,
        rx: mpsc::Receiver<Observation>,
        registry_tx: mpsc::Sender<String>,
        health: Option<Arc<HealthMetrics>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            rx,
            registry_tx,
            health,
            cancel,
        }
    }

    /// Consumes observations until cancellation or a fatal I/O error.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                obs = self.rx.recv() => match obs {
                    Some(obs) => self.append(obs).await?,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn append(&mut self, obs: Observation) -> Result<()> {
        let path = pathing::datafile_path(&self.root, &obs.channel);

        let mut file = match OpenOptions::new().append(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("creating {}", parent.display()))?;
                }

                let mut file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .with_context(|| format!("creating {}", path.display()))?;

                file.write_all(format!("v2 {}\n", obs.channel).as_bytes())
                    .await
                    .with_context(|| format!("writing header to {}", path.display()))?;

                info!(channel = %obs.channel, path = %path.display(), "created datapoint file");

                if let Some(h) = &self.health {
                    h.datafiles_created.inc();
                }

                // One-shot registration of the new channel name.
                if self.registry_tx.send(obs.channel.clone()).await.is_err() {
                    tracing::warn!(
                        channel = %obs.channel,
                        "name registry queue closed, skipping registration",
                    );
                }

                file
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    channel = %obs.channel,
                    path = %path.display(),
                    "historical append failed",
                );
                return Err(e).with_context(|| format!("opening {}", path.display()));
            }
        };

        file.write_all(obs.payload.as_bytes())
            .await
            .with_context(|| format!("appending to {}", path.display()))?;

        file.flush()
            .await
            .with_context(|| format!("flushing {}", path.display()))?;

        if let Some(h) = &self.health {
            h.observations_written.with_label_values(&["disk"]).inc();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_observations(root: PathBuf, observations: Vec<Observation>) -> Vec<String> {
        let (obs_tx, obs_rx) = mpsc::channel(16);
        let (reg_tx, mut reg_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let writer = DiskWriter::new(root, obs_rx, reg_tx, None, cancel);
        let handle = tokio::spawn(writer.run());

        for obs in observations {
            obs_tx.send(obs).await.expect("queue open");
        }
        drop(obs_tx);

        handle.await.expect("join").expect("no io error");

        let mut registered = Vec::new();
        while let Some(name) = reg_rx.recv().await {
            registered.push(name);
        }
        registered
    }

    #[tokio::test]
    async fn test_first_write_creates_file_with_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        let registered = write_observations(
            root.clone(),
            vec![Observation {
                channel: "gauges:temp".to_string(),
                payload: "1700000000 72.5\n".to_string(),
                timestamp: 0,
            }],
        )
        .await;

        let path = pathing::datafile_path(&root, "gauges:temp");
        let contents = std::fs::read_to_string(&path).expect("file exists");
        assert_eq!(contents, "v2 gauges:temp\n1700000000 72.5\n");
        assert_eq!(registered, vec!["gauges:temp"]);
    }

    #[tokio::test]
    async fn test_subsequent_writes_append_without_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        let registered = write_observations(
            root.clone(),
            vec![
                Observation {
                    channel: "counters:hits:60".to_string(),
                    payload: "1700000000 3\n".to_string(),
                    timestamp: 1_700_000_000,
                },
                Observation {
                    channel: "counters:hits:60".to_string(),
                    payload: "1700000060 5\n".to_string(),
                    timestamp: 1_700_000_060,
                },
            ],
        )
        .await;

        let path = pathing::datafile_path(&root, "counters:hits:60");
        let contents = std::fs::read_to_string(&path).expect("file exists");
        assert_eq!(
            contents,
            "v2 counters:hits:60\n1700000000 3\n1700000060 5\n",
        );

        // Registration happens exactly once per channel.
        assert_eq!(registered, vec!["counters:hits:60"]);
    }

    #[tokio::test]
    async fn test_distinct_channels_get_distinct_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        let registered = write_observations(
            root.clone(),
            vec![
                Observation {
                    channel: "gauges:a".to_string(),
                    payload: "1 1\n".to_string(),
                    timestamp: 0,
                },
                Observation {
                    channel: "gauges:b".to_string(),
                    payload: "2 2\n".to_string(),
                    timestamp: 0,
                },
            ],
        )
        .await;

        assert_eq!(registered.len(), 2);
        assert!(pathing::datafile_path(&root, "gauges:a").exists());
        assert!(pathing::datafile_path(&root, "gauges:b").exists());
    }
}
