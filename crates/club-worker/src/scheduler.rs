//! Periodic fan-out of crew recommendations to every user.
//!
//! A pass walks the user list one user at a time, calls the crew service for
//! each user with a context or goal, and upserts the result for today. Failures
//! are recorded per user and never abort the pass.

use std::{
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use club_core::{crew::NewCrewResponse, store::ClubStore, user::User};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  client::{CrewRequest, CrewService},
  question_sync::{PayloadShape, sync_questions},
};

/// Users beyond this many are not visited by a pass.
pub const USER_BATCH_LIMIT: usize = 1000;

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What a pass did for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum UserOutcome {
  Created,
  Updated,
  /// Neither context nor goal is set.
  Skipped,
  Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReport {
  pub uid:     String,
  #[serde(flatten)]
  pub outcome: UserOutcome,
}

/// Result of one fan-out pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
  pub succeeded: usize,
  pub failed:    usize,
  pub skipped:   usize,
  pub users:     Vec<UserReport>,
}

impl PassReport {
  fn record(&mut self, uid: String, outcome: UserOutcome) {
    match outcome {
      UserOutcome::Created | UserOutcome::Updated => self.succeeded += 1,
      UserOutcome::Skipped => self.skipped += 1,
      UserOutcome::Failed(_) => self.failed += 1,
    }
    self.users.push(UserReport { uid, outcome });
  }

  pub fn outcome_for(&self, uid: &str) -> Option<&UserOutcome> {
    self.users.iter().find(|u| u.uid == uid).map(|u| &u.outcome)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
  pub is_running:       bool,
  pub interval_minutes: u32,
  pub api_url:          String,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct TimerState {
  interval_minutes: u32,
  /// Present while the timer task is alive.
  timer:            Option<CancellationToken>,
}

struct Inner<S, C> {
  store:     Arc<S>,
  crew:      C,
  state:     Mutex<TimerState>,
  /// Held for the duration of a pass.
  pass_lock: tokio::sync::Mutex<()>,
}

impl<S, C> Inner<S, C> {
  fn state(&self) -> MutexGuard<'_, TimerState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Handle to the crew fan-out scheduler. Cheap to clone.
pub struct CrewScheduler<S, C> {
  inner: Arc<Inner<S, C>>,
}

impl<S, C> Clone for CrewScheduler<S, C> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S, C> CrewScheduler<S, C>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
{
  /// Create a stopped scheduler. `interval_minutes` is what [`status`]
  /// reports until [`start`] is called with a different value.
  ///
  /// [`status`]: Self::status
  /// [`start`]: Self::start
  pub fn new(store: Arc<S>, crew: C, interval_minutes: u32) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        crew,
        state: Mutex::new(TimerState { interval_minutes, timer: None }),
        pass_lock: tokio::sync::Mutex::new(()),
      }),
    }
  }

  /// Start firing a pass every `interval_minutes`, the first one a full
  /// interval from now. Does nothing if already running.
  pub fn start(&self, interval_minutes: u32) -> Result<()> {
    if interval_minutes == 0 {
      return Err(Error::InvalidInterval(interval_minutes));
    }

    let token = {
      let mut state = self.inner.state();
      if state.timer.is_some() {
        info!(
          interval_minutes = state.interval_minutes,
          "crew scheduler already running"
        );
        return Ok(());
      }
      let token = CancellationToken::new();
      state.interval_minutes = interval_minutes;
      state.timer = Some(token.clone());
      token
    };

    let period = Duration::from_secs(u64::from(interval_minutes) * 60);
    let first = Instant::now() + period;
    let scheduler = self.clone();
    tokio::spawn(async move { scheduler.run_timer(first, period, token).await });

    info!(interval_minutes, "crew scheduler started");
    Ok(())
  }

  /// Stop future passes. A pass already running is left to finish.
  pub fn stop(&self) {
    match self.inner.state().timer.take() {
      Some(token) => {
        token.cancel();
        info!("crew scheduler stopped");
      }
      None => debug!("crew scheduler not running"),
    }
  }

  /// Run one pass now, waiting for any pass already in flight first.
  pub async fn run_now(&self) -> Result<PassReport> {
    let _pass = self.inner.pass_lock.lock().await;
    self.run_pass().await
  }

  pub fn status(&self) -> SchedulerStatus {
    let state = self.inner.state();
    SchedulerStatus {
      is_running:       state.timer.is_some(),
      interval_minutes: state.interval_minutes,
      api_url:          self.inner.crew.endpoint(),
    }
  }

  pub fn set_api_url(&self, url: String) {
    info!(%url, "crew service URL changed");
    self.inner.crew.set_endpoint(url);
  }

  async fn run_timer(&self, first: Instant, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = token.cancelled() => break,
        _ = ticker.tick() => {
          let Ok(_pass) = self.inner.pass_lock.try_lock() else {
            warn!("previous crew pass still running, skipping tick");
            continue;
          };
          if let Err(e) = self.run_pass().await {
            error!(error = %e, "crew pass failed");
          }
        }
      }
    }
  }

  async fn run_pass(&self) -> Result<PassReport> {
    let users = self
      .inner
      .store
      .list_users(USER_BATCH_LIMIT, 0)
      .await
      .map_err(Error::store)?;
    info!(users = users.len(), "starting crew pass");

    let mut report = PassReport::default();
    for user in users {
      let outcome = self.process_user(&user).await;
      report.record(user.uid, outcome);
    }

    info!(
      succeeded = report.succeeded,
      failed = report.failed,
      skipped = report.skipped,
      "crew pass complete"
    );
    Ok(report)
  }

  async fn process_user(&self, user: &User) -> UserOutcome {
    if !user.has_crew_inputs() {
      debug!(user = %user.uid, "no context or goal, skipping");
      return UserOutcome::Skipped;
    }

    let request = CrewRequest::for_user(user);
    let payload = match self.inner.crew.generate(request.clone()).await {
      Ok(payload) => payload,
      Err(e) => {
        error!(user = %user.uid, error = %e, "crew service call failed");
        return UserOutcome::Failed(e.to_string());
      }
    };

    match PayloadShape::classify(&payload) {
      PayloadShape::Simple => warn!(user = %user.uid, "crew returned the simple question list"),
      shape => debug!(user = %user.uid, ?shape, "crew payload received"),
    }

    let store = &*self.inner.store;
    let saved = match store
      .upsert_crew_response(NewCrewResponse {
        user_uid:        user.uid.clone(),
        request_context: request.customer_business_background_latest,
        request_goal:    request.customer_goal_latest,
        response_data:   payload,
      })
      .await
    {
      Ok(saved) => saved,
      Err(e) => {
        error!(user = %user.uid, error = %e, "failed to store crew response");
        return UserOutcome::Failed(e.to_string());
      }
    };

    if let Err(e) = sync_questions(store, &saved).await {
      error!(user = %user.uid, error = %e, "question sync failed");
    }

    if saved.was_updated() {
      info!(user = %user.uid, id = saved.id, "updated crew response");
      UserOutcome::Updated
    } else {
      info!(user = %user.uid, id = saved.id, "created crew response");
      UserOutcome::Created
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::Local;
  use club_core::{
    crew::CrewResponseQuery,
    user::{Goal, UserProfile},
  };
  use club_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tokio::sync::Notify;

  use super::*;
  use crate::hooked_store::HookedStore;

  const DEFAULT_URL: &str = "http://localhost:8000/run-crew";

  /// Crew service that answers with a fixed payload, failing for any user
  /// whose context is `"fail"`. With a gate, each call waits for a permit
  /// after it has been counted.
  struct FakeCrew {
    payload:  Value,
    calls:    Arc<AtomicUsize>,
    gate:     Option<Arc<Notify>>,
    endpoint: Mutex<String>,
  }

  impl FakeCrew {
    fn new(payload: Value) -> (Self, Arc<AtomicUsize>) {
      let calls = Arc::new(AtomicUsize::new(0));
      let crew = Self {
        payload,
        calls: Arc::clone(&calls),
        gate: None,
        endpoint: Mutex::new(DEFAULT_URL.into()),
      };
      (crew, calls)
    }
  }

  impl CrewService for FakeCrew {
    async fn generate(&self, request: CrewRequest) -> Result<Value> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      if request.customer_business_background_latest.as_deref() == Some("fail") {
        return Err(Error::Status { status: 503, body: "unavailable".into() });
      }
      Ok(self.payload.clone())
    }

    fn endpoint(&self) -> String { self.endpoint.lock().unwrap().clone() }

    fn set_endpoint(&self, url: String) { *self.endpoint.lock().unwrap() = url; }
  }

  fn detailed_payload() -> Value {
    let items: Vec<Value> = (1..=5)
      .map(|i| json!({ format!("Question {i}"): format!("Q{i}?"), "Answers": ["Yes", "No"] }))
      .collect();
    json!({ "Questions": items })
  }

  async fn store_with(users: &[(&str, Option<&str>, Option<Goal>)]) -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    seed(&store, users).await;
    Arc::new(store)
  }

  async fn seed<S: ClubStore>(store: &S, users: &[(&str, Option<&str>, Option<Goal>)]) {
    for (uid, context, goal) in users {
      store
        .save_user(UserProfile {
          context: context.map(str::to_owned),
          goal: *goal,
          ..UserProfile::new(*uid)
        })
        .await
        .unwrap();
    }
  }

  /// Yield until `calls` reaches `n`. Yielding never moves the paused clock,
  /// so only explicit `advance` calls fire the timer.
  async fn wait_for_calls(calls: &AtomicUsize, n: usize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while calls.load(Ordering::SeqCst) < n {
      assert!(
        std::time::Instant::now() < deadline,
        "expected {n} crew calls, saw {}",
        calls.load(Ordering::SeqCst)
      );
      tokio::task::yield_now().await;
    }
  }

  async fn settle() {
    for _ in 0..20 {
      tokio::task::yield_now().await;
    }
  }

  async fn responses<S: ClubStore>(store: &S, uid: &str) -> Vec<club_core::crew::CrewResponse> {
    store
      .list_crew_responses(CrewResponseQuery {
        user_uid: Some(uid.into()),
        ..Default::default()
      })
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn pass_creates_one_response_per_eligible_user() {
    let store = store_with(&[
      ("alice", Some("a bakery"), None),
      ("bob", None, Some(Goal::RapidGrowth)),
      ("carol", None, None),
    ])
    .await;
    let (crew, calls) = FakeCrew::new(json!({ "advice": "ship it" }));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.outcome_for("alice"), Some(&UserOutcome::Created));
    assert_eq!(report.outcome_for("carol"), Some(&UserOutcome::Skipped));

    assert_eq!(responses(&*store, "alice").await.len(), 1);
    assert_eq!(responses(&*store, "bob").await.len(), 1);
    assert!(responses(&*store, "carol").await.is_empty());

    let bob = &responses(&*store, "bob").await[0];
    assert_eq!(bob.request_goal.as_deref(), Some("Rapid growth"));
    assert_eq!(bob.request_context, None);
  }

  #[tokio::test]
  async fn second_pass_same_day_updates_in_place() {
    let store = store_with(&[("alice", Some("a bakery"), None)]).await;
    let (crew, _) = FakeCrew::new(json!({ "advice": "ship it" }));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    scheduler.run_now().await.unwrap();
    let first = responses(&*store, "alice").await.remove(0);
    let report = scheduler.run_now().await.unwrap();
    let second = responses(&*store, "alice").await;

    assert_eq!(report.outcome_for("alice"), Some(&UserOutcome::Updated));
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first.id);
    assert_eq!(second[0].created_at, first.created_at);
    assert!(first.updated_at.is_none());
    assert!(second[0].updated_at.is_some_and(|u| u >= first.created_at));
  }

  #[tokio::test]
  async fn failing_user_does_not_abort_the_pass() {
    let store = store_with(&[
      ("alice", Some("fail"), None),
      ("bob", Some("a bakery"), None),
    ])
    .await;
    let (crew, calls) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    let report = scheduler.run_now().await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert!(matches!(report.outcome_for("alice"), Some(UserOutcome::Failed(_))));
    assert!(responses(&*store, "alice").await.is_empty());
    assert_eq!(responses(&*store, "bob").await.len(), 1);
  }

  #[tokio::test]
  async fn detailed_payload_syncs_todays_questions() {
    let store = store_with(&[("alice", Some("a bakery"), None)]).await;
    let (crew, _) = FakeCrew::new(detailed_payload());
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    scheduler.run_now().await.unwrap();

    let saved = responses(&*store, "alice").await.remove(0);
    let set = store
      .get_question_set("alice".into(), saved.created_on)
      .await
      .unwrap()
      .expect("question set written for the response's day");
    assert_eq!(set.questions.len(), 5);
    assert_eq!(set.questions[0].question, "Q1?");
    assert_eq!(saved.created_on, Local::now().date_naive());
  }

  #[tokio::test]
  async fn unrecognized_payload_is_stored_without_questions() {
    let store = store_with(&[("alice", Some("a bakery"), None)]).await;
    let (crew, _) = FakeCrew::new(json!({ "questions": ["one", "two"] }));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.succeeded, 1);
    let saved = responses(&*store, "alice").await.remove(0);
    assert_eq!(saved.response_data, json!({ "questions": ["one", "two"] }));
    assert!(store
      .get_question_set("alice".into(), saved.created_on)
      .await
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn question_sync_failure_keeps_the_response() {
    let store = Arc::new(HookedStore::new().await);
    seed(&*store, &[("alice", Some("a bakery"), None)]).await;
    store.fail_question_sets();
    let (crew, _) = FakeCrew::new(detailed_payload());
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    let report = scheduler.run_now().await.unwrap();

    assert_eq!(report.outcome_for("alice"), Some(&UserOutcome::Created));
    let saved = responses(&*store, "alice").await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].response_data, detailed_payload());
    assert!(store
      .get_question_set("alice".into(), saved[0].created_on)
      .await
      .unwrap()
      .is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn timer_fires_a_pass_after_one_interval() {
    let store = store_with(&[("alice", Some("a bakery"), None)]).await;
    let (crew, calls) = FakeCrew::new(json!({ "advice": "ship it" }));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    scheduler.start(1).unwrap();
    tokio::time::advance(Duration::from_secs(59)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    wait_for_calls(&calls, 1).await;
    scheduler.stop();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while responses(&*store, "alice").await.is_empty() {
      assert!(std::time::Instant::now() < deadline, "timer pass never stored a response");
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test(start_paused = true)]
  async fn timer_keeps_firing_after_a_failed_pass() {
    let store = Arc::new(HookedStore::new().await);
    seed(&*store, &[("alice", Some("a bakery"), None)]).await;
    store.fail_list_users(1);
    let (crew, calls) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    scheduler.start(1).unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;

    // The first pass died listing users, before any crew call.
    assert_eq!(store.list_users_failures_left(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(scheduler.status().is_running);

    tokio::time::advance(Duration::from_secs(60)).await;
    wait_for_calls(&calls, 1).await;
    scheduler.stop();
  }

  #[tokio::test(start_paused = true)]
  async fn tick_during_a_running_pass_is_skipped() {
    let store = store_with(&[("alice", Some("a bakery"), None)]).await;
    let gate = Arc::new(Notify::new());
    let (mut crew, calls) = FakeCrew::new(json!({}));
    crew.gate = Some(Arc::clone(&gate));
    let scheduler = CrewScheduler::new(Arc::clone(&store), crew, 60);

    scheduler.start(1).unwrap();
    tokio::time::advance(Duration::from_secs(60)).await;
    wait_for_calls(&calls, 1).await;

    // Five more intervals pass while the first pass is stuck on the crew.
    for _ in 0..5 {
      tokio::time::advance(Duration::from_secs(60)).await;
      settle().await;
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    tokio::time::advance(Duration::from_secs(60)).await;
    wait_for_calls(&calls, 2).await;
    scheduler.stop();
  }

  #[tokio::test]
  async fn start_and_stop_update_status() {
    let store = store_with(&[]).await;
    let (crew, _) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(store, crew, 60);

    scheduler.start(30).unwrap();
    assert_eq!(scheduler.status(), SchedulerStatus {
      is_running:       true,
      interval_minutes: 30,
      api_url:          DEFAULT_URL.into(),
    });

    scheduler.stop();
    let status = scheduler.status();
    assert!(!status.is_running);
    assert_eq!(status.interval_minutes, 30);

    // Stopping twice is harmless.
    scheduler.stop();
  }

  #[tokio::test]
  async fn second_start_keeps_running_schedule() {
    let store = store_with(&[]).await;
    let (crew, _) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(store, crew, 60);

    scheduler.start(15).unwrap();
    scheduler.start(45).unwrap();
    assert_eq!(scheduler.status().interval_minutes, 15);
    scheduler.stop();
  }

  #[tokio::test]
  async fn zero_interval_is_rejected() {
    let store = store_with(&[]).await;
    let (crew, _) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(store, crew, 60);

    assert!(matches!(scheduler.start(0), Err(Error::InvalidInterval(0))));
    assert!(!scheduler.status().is_running);
  }

  #[tokio::test]
  async fn api_url_can_be_changed() {
    let store = store_with(&[]).await;
    let (crew, _) = FakeCrew::new(json!({}));
    let scheduler = CrewScheduler::new(store, crew, 60);

    scheduler.set_api_url("http://crew.internal/run".into());
    assert_eq!(scheduler.status().api_url, "http://crew.internal/run");
  }

  #[test]
  fn outcomes_serialize_with_status_tag() {
    let mut report = PassReport::default();
    report.record("alice".into(), UserOutcome::Failed("timeout".into()));
    report.record("bob".into(), UserOutcome::Created);

    assert_eq!(
      serde_json::to_value(&report).unwrap(),
      json!({
        "succeeded": 1,
        "failed": 1,
        "skipped": 0,
        "users": [
          { "uid": "alice", "status": "failed", "reason": "timeout" },
          { "uid": "bob", "status": "created" },
        ],
      })
    );
  }
}
