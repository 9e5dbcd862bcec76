//! Process wiring for the 1% Club server: configuration and the periodic
//! discovery sweep that feeds the solution queue.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use club_core::store::ClubStore;
use club_worker::{SolutionQueue, SolutionService};
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `CLUB_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                       String,
  pub port:                       u16,
  pub store_path:                 PathBuf,
  /// Crew recommendation service.
  pub crew_api_url:               String,
  /// Both-crews solution service.
  pub both_crews_api_url:         String,
  pub scheduler_interval_minutes: u32,
  /// Start the crew scheduler at boot instead of waiting for `POST /scheduler`.
  pub scheduler_autostart:        bool,
  pub sweep_interval_secs:        u64,
  pub drain_interval_ms:          u64,
  /// Queued entries older than this that no job holds are re-queued.
  pub stale_queued_after_mins:    u64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                       "127.0.0.1".into(),
      port:                       3000,
      store_path:                 PathBuf::from("club.sqlite3"),
      crew_api_url:               "http://localhost:8000/run-crew".into(),
      both_crews_api_url:         "http://localhost:8000/api/v1/both-crews".into(),
      scheduler_interval_minutes: 60,
      scheduler_autostart:        false,
      sweep_interval_secs:        300,
      drain_interval_ms:          2000,
      stale_queued_after_mins:    30,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn sweep_interval(&self) -> Duration { Duration::from_secs(self.sweep_interval_secs.max(1)) }

  pub fn drain_interval(&self) -> Duration {
    Duration::from_millis(self.drain_interval_ms.max(1))
  }

  pub fn stale_queued_after(&self) -> Duration {
    Duration::from_secs(self.stale_queued_after_mins * 60)
  }
}

/// Layer the optional TOML file at `path` under `CLUB_*` environment variables.
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  build_config(
    config::File::from(path).required(false),
    config::Environment::with_prefix("CLUB").try_parsing(true),
  )
}

fn build_config<F>(file: F, env: config::Environment) -> Result<ServerConfig, config::ConfigError>
where
  F: config::Source + Send + Sync + 'static,
{
  config::Config::builder()
    .add_source(file)
    .add_source(env)
    .build()?
    .try_deserialize()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Discovery sweep ──────────────────────────────────────────────────────────

/// Sweep today's entries into `queue`, then re-queue anything stuck longer
/// than `stale_after`. Errors are logged, never returned.
pub async fn sweep_once<S, B>(queue: &SolutionQueue<S, B>, stale_after: Duration)
where
  S: ClubStore + 'static,
  B: SolutionService + 'static,
{
  if let Err(e) = queue.process_today_entries().await {
    error!(error = %e, "discovery sweep failed");
  }
  if let Err(e) = queue.reconcile_stale(stale_after).await {
    error!(error = %e, "stale entry reconciliation failed");
  }
}

/// Run [`sweep_once`] every `period`, starting immediately, until `shutdown`
/// is cancelled.
pub fn spawn_sweep_loop<S, B>(
  queue: SolutionQueue<S, B>,
  period: Duration,
  stale_after: Duration,
  shutdown: CancellationToken,
) -> JoinHandle<()>
where
  S: ClubStore + 'static,
  B: SolutionService + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "discovery sweep loop started");

    loop {
      tokio::select! {
        _ = shutdown.cancelled() => break,
        _ = ticker.tick() => sweep_once(&queue, stale_after).await,
      }
    }
    info!("discovery sweep loop stopped");
  })
}
