//! club-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `CLUB_*` environment variables, opens the SQLite store, starts the
//! background workers, and serves the JSON API under `/api`.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use club_server::{expand_tilde, load_config, spawn_sweep_loop};
use club_store_sqlite::SqliteStore;
use club_worker::{CrewScheduler, HttpCrewService, HttpSolutionService, SolutionQueue};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "1% Club API and background worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = load_config(&cli.config).context("failed to load configuration")?;

  // Open SQLite store.
  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  // Workers.
  let crew = HttpCrewService::new(cfg.crew_api_url.clone()).context("failed to build crew client")?;
  let solver = HttpSolutionService::new(cfg.both_crews_api_url.clone())
    .context("failed to build both-crews client")?;
  let scheduler = CrewScheduler::new(Arc::clone(&store), crew, cfg.scheduler_interval_minutes);
  let queue = SolutionQueue::new(Arc::clone(&store), solver);

  // Nothing is in memory yet, so every entry still flagged queued was
  // orphaned by a previous process.
  let recovered = queue
    .reconcile_stale(Duration::ZERO)
    .await
    .context("failed to recover queued journal entries")?;
  if recovered > 0 {
    tracing::info!(recovered, "recovered journal entries queued by a previous run");
  }

  let shutdown = CancellationToken::new();
  let drain = queue.spawn_drain_loop(cfg.drain_interval(), shutdown.clone());
  let sweep = spawn_sweep_loop(
    queue.clone(),
    cfg.sweep_interval(),
    cfg.stale_queued_after(),
    shutdown.clone(),
  );

  if cfg.scheduler_autostart {
    scheduler
      .start(cfg.scheduler_interval_minutes)
      .context("failed to start crew scheduler")?;
  }

  let app = Router::new()
    .nest("/api", club_api::api_router(store, scheduler.clone(), queue))
    .layer(TraceLayer::new_for_http());
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  scheduler.stop();
  shutdown.cancel();
  sweep.await.context("sweep loop panicked")?;
  // An interrupted job is picked up again by the startup reconcile.
  drain.abort();

  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
