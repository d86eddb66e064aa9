use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Prometheus metrics for receiver health and observability.
///
/// All metrics use the "aggregoor" namespace. These cover the receiver's own
/// operation; per-metric ingest statistics are a separate component.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Raw lines received, by transport (udp/tcp).
    pub lines_received: CounterVec,
    /// Lines the parser rejected.
    pub lines_malformed: Counter,
    /// Datapoints routed to an engine, by kind.
    pub datapoints_routed: CounterVec,
    /// Observations written, by sink (disk/recent).
    pub observations_written: CounterVec,
    /// Historical datapoint files created.
    pub datafiles_created: Counter,
    /// Channel names registered in the name set.
    pub names_registered: Counter,
    /// Heartbeat ticks emitted.
    pub heartbeat_ticks: Counter,
    /// Heartbeat ticks dropped per engine because it was still busy.
    pub heartbeat_missed: CounterVec,
    /// Recent-store writes that failed and were skipped.
    pub recent_store_errors: Counter,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let lines_received = CounterVec::new(
            Opts::new("lines_received_total", "Raw lines received by transport.")
                .namespace("aggregoor"),
            &["transport"],
        )?;
        let lines_malformed = Counter::with_opts(
            Opts::new("lines_malformed_total", "Lines the parser rejected.")
                .namespace("aggregoor"),
        )?;
        let datapoints_routed = CounterVec::new(
            Opts::new(
                "datapoints_routed_total",
                "Datapoints routed to an engine by kind.",
            )
            .namespace("aggregoor"),
            &["kind"],
        )?;
        let observations_written = CounterVec::new(
            Opts::new(
                "observations_written_total",
                "Aggregated observations written by sink.",
            )
            .namespace("aggregoor"),
            &["sink"],
        )?;
        let datafiles_created = Counter::with_opts(
            Opts::new(
                "datafiles_created_total",
                "Historical datapoint files created.",
            )
            .namespace("aggregoor"),
        )?;
        let names_registered = Counter::with_opts(
            Opts::new(
                "names_registered_total",
                "Channel names added to the name registry.",
            )
            .namespace("aggregoor"),
        )?;
        let heartbeat_ticks = Counter::with_opts(
            Opts::new("heartbeat_ticks_total", "Heartbeat ticks emitted.").namespace("aggregoor"),
        )?;
        let heartbeat_missed = CounterVec::new(
            Opts::new(
                "heartbeat_missed_total",
                "Ticks dropped because the engine had not consumed the previous one.",
            )
            .namespace("aggregoor"),
            &["engine"],
        )?;
        let recent_store_errors = Counter::with_opts(
            Opts::new(
                "recent_store_errors_total",
                "Recent-store writes that failed and were skipped.",
            )
            .namespace("aggregoor"),
        )?;

        registry.register(Box::new(lines_received.clone()))?;
        registry.register(Box::new(lines_malformed.clone()))?;
        registry.register(Box::new(datapoints_routed.clone()))?;
        registry.register(Box::new(observations_written.clone()))?;
        registry.register(Box::new(datafiles_created.clone()))?;
        registry.register(Box::new(names_registered.clone()))?;
        registry.register(Box::new(heartbeat_ticks.clone()))?;
        registry.register(Box::new(heartbeat_missed.clone()))?;
        registry.register(Box::new(recent_store_errors.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            lines_received,
            lines_malformed,
            datapoints_routed,
            observations_written,
            datafiles_created,
            names_registered,
            heartbeat_ticks,
            heartbeat_missed,
            recent_store_errors,
        })
    }

    /// Starts the HTTP server serving /metrics and /healthz.
    pub async fn start(&self) -> Result<()> {
        let addr = if self.addr.is_empty() {
            ":9090"
        } else {
            &self.addr
        };

        // Parse address, handling ":port" shorthand.
        let bind_addr = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };

        let registry = self.registry.clone();
        let app_state = Arc::new(AppState { registry });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("listening on {bind_addr}"))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "health metrics server started");

            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "health metrics server error");
            }
        });

        Ok(())
    }

    /// Gracefully shuts down the health metrics server.
    pub fn stop(&self) {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }
    }
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();

    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("encoding metrics: {e}"),
        )
            .into_response();
    }

    (StatusCode::OK, buf).into_response()
}

/// GET /healthz - liveness probe.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
