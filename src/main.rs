use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use aggregoor::clock::Heartbeat;
use aggregoor::config::Config;
use aggregoor::dispatch::{DispatcherPool, Routes};
use aggregoor::engine::counter::CounterEngine;
use aggregoor::engine::gauge::GaugeEngine;
use aggregoor::engine::timer::TimerEngine;
use aggregoor::health::HealthMetrics;
use aggregoor::listener::Listeners;
use aggregoor::sink::disk::DiskWriter;
use aggregoor::sink::recent::RecentWriter;
use aggregoor::sink::registry::RegistryWriter;
use aggregoor::sink::SinkSet;
use aggregoor::store::Store;

/// statsd-compatible metrics receiver with multi-retention aggregation.
#[derive(Parser)]
#[command(name = "aggregoor", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides the config file's log_level when set.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or the environment.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("aggregoor {}", version::full());
        return Ok(());
    }

    // Config is required for the main receiver run.
    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let cfg = Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Initialize tracing from the config, CLI flag taking precedence.
    let log_level = cli.log_level.as_deref().unwrap_or(cfg.log_level.as_str());
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting aggregoor",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    let cancel = CancellationToken::new();

    // Health metrics server comes up first so probes respond during startup.
    let health =
        Arc::new(HealthMetrics::new(&cfg.health.addr).context("creating health metrics")?);
    health
        .start()
        .await
        .context("starting health metrics server")?;

    // External store for recent values and the name registry.
    let store = Store::connect_redis(&cfg.redis.url())
        .await
        .with_context(|| format!("connecting to redis at {}", cfg.redis.url()))?;
    info!(url = %cfg.redis.url(), "connected to redis");

    // Bounded queues between every stage.
    let queue_size = cfg.dispatch.queue_size;
    let (ingest_tx, ingest_rx) = flume::bounded(queue_size);
    let (counter_tx, counter_rx) = flume::bounded(queue_size);
    let (gauge_tx, gauge_rx) = flume::bounded(queue_size);
    let (timer_tx, timer_rx) = flume::bounded(queue_size);
    let (disk_tx, disk_rx) = mpsc::channel(queue_size);
    let (recent_tx, recent_rx) = mpsc::channel(queue_size);
    let (registry_tx, registry_rx) = mpsc::channel(queue_size);

    // Listeners bind before anything spawns; a bind failure is fatal.
    let listeners = Listeners::bind(cfg.port)
        .await
        .context("binding ingest listeners")?;
    listeners.spawn(ingest_tx, Some(Arc::clone(&health)), cancel.clone());

    DispatcherPool::new(
        cfg.dispatch.workers,
        ingest_rx,
        Routes {
            counters: counter_tx,
            gauges: gauge_tx,
            timers: timer_tx,
        },
        Some(Arc::clone(&health)),
        cancel.clone(),
    )
    .spawn();

    // Heartbeat fans out to the counter and timer engines; gauges do not
    // subscribe.
    let mut heartbeat = Heartbeat::new(cfg.heartbeat, Some(Arc::clone(&health)));
    let counter_ticks = heartbeat.subscribe("counter");
    let timer_ticks = heartbeat.subscribe("timer");

    let sinks = SinkSet::new(disk_tx, recent_tx);
    let slot_counts = cfg.slot_counts();

    tokio::spawn(GaugeEngine::new(sinks.clone()).run(gauge_rx, cancel.clone()));
    tokio::spawn(
        CounterEngine::new(cfg.retentions.clone(), &slot_counts, sinks.clone()).run(
            counter_rx,
            counter_ticks,
            cancel.clone(),
        ),
    );
    tokio::spawn(
        TimerEngine::new(cfg.retentions.clone(), &slot_counts, sinks).run(
            timer_rx,
            timer_ticks,
            cancel.clone(),
        ),
    );

    heartbeat.start();

    // Sink writers. The disk writer's task handle is watched: any I/O error
    // other than missing-file-on-open is fatal to the whole receiver.
    let mut disk_task = tokio::spawn(
        DiskWriter::new(
            cfg.root.clone(),
            disk_rx,
            registry_tx,
            Some(Arc::clone(&health)),
            cancel.clone(),
        )
        .run(),
    );
    tokio::spawn(
        RecentWriter::new(
            store.clone(),
            recent_rx,
            Some(Arc::clone(&health)),
            cancel.clone(),
        )
        .run(),
    );
    tokio::spawn(
        RegistryWriter::new(store, registry_rx, Some(Arc::clone(&health)), cancel.clone()).run(),
    );

    info!(
        port = cfg.port,
        retentions = ?cfg.retentions,
        root = %cfg.root.display(),
        "receiver started",
    );

    // Signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    tokio::select! {
        _ = shutdown_rx => {
            cancel.cancel();
            heartbeat.stop();
            health.stop();

            // Let the disk writer finish its in-flight observation.
            let _ = disk_task.await;

            info!("aggregoor stopped");
            Ok(())
        }
        result = &mut disk_task => {
            cancel.cancel();
            heartbeat.stop();
            health.stop();

            let run_result = result.context("joining historical sink task")?;
            if let Err(e) = &run_result {
                tracing::error!(error = %e, "historical sink failed, shutting down");
            }
            run_result.context("historical sink failed")?;

            // A clean return without cancellation means the observation
            // queue closed underneath us.
            bail!("historical sink exited unexpectedly");
        }
    }
}
