//! Control surface for the background workers.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/scheduler` | Scheduler status |
//! | `POST` | `/scheduler` | Body: `{"action": "start"\|"stop"\|"run-now", "intervalMinutes"?, "apiUrl"?}` |
//! | `GET`  | `/both-crews/status` | Queue size and whether a job is in flight |
//! | `POST` | `/both-crews/sweep` | Sweep today's unprocessed entries into the queue |

use axum::{Json, extract::State};
use club_core::store::ClubStore;
use club_worker::{
  CrewScheduler, CrewService, PassReport, SchedulerStatus, SolutionQueue, SolutionService,
  SweepReport,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Handles to both workers, shared by the control routes.
pub struct Control<S, C, B> {
  pub scheduler: CrewScheduler<S, C>,
  pub queue:     SolutionQueue<S, B>,
}

impl<S, C, B> Clone for Control<S, C, B> {
  fn clone(&self) -> Self {
    Self {
      scheduler: self.scheduler.clone(),
      queue:     self.queue.clone(),
    }
  }
}

// ─── Scheduler ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerBody {
  pub action:           Option<String>,
  pub interval_minutes: Option<u32>,
  pub api_url:          Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerResponse {
  pub message: String,
  pub status:  SchedulerStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub report:  Option<PassReport>,
}

/// `GET /scheduler`
pub async fn scheduler_status<S, C, B>(
  State(control): State<Control<S, C, B>>,
) -> Json<SchedulerStatus>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
  B: SolutionService + 'static,
{
  Json(control.scheduler.status())
}

/// `POST /scheduler`
pub async fn scheduler_control<S, C, B>(
  State(control): State<Control<S, C, B>>,
  Json(body): Json<SchedulerBody>,
) -> Result<Json<SchedulerResponse>, ApiError>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
  B: SolutionService + 'static,
{
  const VALID: &str = "valid actions: start, stop, run-now";
  let scheduler = &control.scheduler;

  let action = body
    .action
    .ok_or_else(|| ApiError::BadRequest(format!("action is required; {VALID}")))?;

  if let Some(url) = body.api_url {
    scheduler.set_api_url(url);
  }

  let (message, report) = match action.as_str() {
    "start" => {
      let minutes = body
        .interval_minutes
        .ok_or_else(|| ApiError::BadRequest("intervalMinutes is required".into()))?;
      scheduler.start(minutes)?;
      (format!("scheduler running every {minutes} minutes"), None)
    }
    "stop" => {
      scheduler.stop();
      ("scheduler stopped".to_owned(), None)
    }
    "run-now" => {
      let report = scheduler.run_now().await?;
      ("scheduler pass executed".to_owned(), Some(report))
    }
    other => {
      return Err(ApiError::BadRequest(format!("invalid action {other:?}; {VALID}")));
    }
  };

  Ok(Json(SchedulerResponse {
    message,
    status: scheduler.status(),
    report,
  }))
}

// ─── Both-crews queue ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
  pub queue_size:    usize,
  pub is_processing: bool,
  pub message:       String,
}

/// `GET /both-crews/status`
pub async fn queue_status<S, C, B>(
  State(control): State<Control<S, C, B>>,
) -> Json<QueueStatusResponse>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
  B: SolutionService + 'static,
{
  let status = control.queue.status();
  let message = match status.queue_size {
    0 => "no entries in queue".to_owned(),
    n => format!("{n} entries waiting to be processed"),
  };
  Json(QueueStatusResponse {
    queue_size: status.queue_size,
    is_processing: status.is_processing,
    message,
  })
}

/// `POST /both-crews/sweep`
pub async fn sweep<S, C, B>(
  State(control): State<Control<S, C, B>>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
  B: SolutionService + 'static,
{
  let report = control.queue.process_today_entries().await?;
  Ok(Json(report))
}
