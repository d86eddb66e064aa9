use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use flume::Sender;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::health::HealthMetrics;

/// UDP read buffer size. One datagram is one sample; bytes beyond this are
/// silently truncated.
pub const UDP_READ_LEN: usize = 256;

/// The two ingest sockets, bound before any task spawns so that a bind
/// failure is fatal at startup.
pub struct Listeners {
    udp: UdpSocket,
    tcp: TcpListener,
}

impl Listeners {
    /// Binds UDP and TCP on the given port across all interfaces.
    pub async fn bind(port: u16) -> Result<Self> {
        let udp = UdpSocket::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding UDP port {port}"))?;

        let tcp = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("binding TCP port {port}"))?;

        Ok(Self { udp, tcp })
    }

    /// Local UDP socket address (useful when bound to port 0).
    pub fn udp_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr().context("getting UDP local address")
    }

    /// Local TCP listener address (useful when bound to port 0).
    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        self.tcp.local_addr().context("getting TCP local address")
    }

    /// Spawns the UDP reader and TCP accept loops. Raw lines go to the
    /// ingest queue unparsed; a full queue blocks the reader, pushing
    /// backpressure onto the kernel buffers.
    pub fn spawn(
        self,
        ingest: Sender<String>,
        health: Option<Arc<HealthMetrics>>,
        cancel: CancellationToken,
    ) {
        info!("listeners started");

        tokio::spawn(run_udp(
            self.udp,
            ingest.clone(),
            health.clone(),
            cancel.clone(),
        ));
        tokio::spawn(run_tcp(self.tcp, ingest, health, cancel));
    }
}

async fn run_udp(
    udp: UdpSocket,
    ingest: Sender<String>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; UDP_READ_LEN];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            result = udp.recv_from(&mut buf) => match result {
                Ok((n, _)) => {
                    let line = String::from_utf8_lossy(&buf[..n]).into_owned();

                    if let Some(h) = &health {
                        h.lines_received.with_label_values(&["udp"]).inc();
                    }

                    if ingest.send_async(line).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "udp read failed, skipping packet");
                }
            },
        }
    }
}

async fn run_tcp(
    tcp: TcpListener,
    ingest: Sender<String>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            result = tcp.accept() => match result {
                Ok((stream, peer)) => {
                    debug!(%peer, "accepted connection");
                    tokio::spawn(run_connection(
                        stream,
                        peer,
                        ingest.clone(),
                        health.clone(),
                        cancel.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
}

/// Reads newline-terminated samples from one connection. A read error closes
/// this connection only.
async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ingest: Sender<String>,
    health: Option<Arc<HealthMetrics>>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(h) = &health {
                        h.lines_received.with_label_values(&["tcp"]).inc();
                    }

                    if ingest.send_async(line).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    debug!(%peer, "connection closed");
                    return;
                }
                Err(e) => {
                    debug!(error = %e, %peer, "connection read failed, closing");
                    return;
                }
            },
        }
    }
}
