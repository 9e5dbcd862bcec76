//! In-process queue turning journal entries into solutions.
//!
//! Discovery sweeps push unprocessed entries onto an in-memory FIFO and flag
//! them queued in the store. A drain loop pops one job per tick and sends it to
//! the both-crews service. Only one job is in flight at a time, and an entry is
//! never held twice, queued or in flight.
//!
//! A failed job goes to the back of the queue until it has had
//! [`MAX_RETRIES`] attempts; after that it is unqueued in the store so a later
//! sweep can pick it up again.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Local, NaiveDate, Utc};
use club_core::{
  journal::JournalEntry,
  solution::{NewSolution, Solution},
  store::ClubStore,
};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result,
  client::{SolutionRequest, SolutionService},
};

/// Attempts per job before it is handed back to the sweep.
pub const MAX_RETRIES: u32 = 3;

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
  pub queue_size:    usize,
  pub is_processing: bool,
}

/// Result of one discovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
  pub entry_date:     Option<NaiveDate>,
  /// Unprocessed entries found for the date.
  pub discovered:     usize,
  pub enqueued:       usize,
  /// Already queued or in flight in this process.
  pub already_queued: usize,
  /// Processed after discovery, before they could be flagged.
  pub settled:        usize,
  /// Entries that could not be flagged queued in the store.
  pub failed:         usize,
}

/// What a single drain did with the job it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
  Processed { entry_id: i64, solution_id: i64 },
  /// Failed; back in the queue with `retries` failures behind it.
  Requeued { entry_id: i64, retries: u32 },
  /// Failed for the last time and unqueued in the store.
  Exhausted { entry_id: i64, attempts: u32 },
}

// ─── Queue ───────────────────────────────────────────────────────────────────

struct Job {
  entry:   JournalEntry,
  retries: u32,
}

#[derive(Default)]
struct QueueState {
  jobs:      VecDeque<Job>,
  in_flight: Option<i64>,
}

impl QueueState {
  fn holds(&self, entry_id: i64) -> bool {
    self.in_flight == Some(entry_id) || self.jobs.iter().any(|j| j.entry.id == entry_id)
  }
}

/// Clears the in-flight slot when a drain ends, however it ends.
struct InFlight<'a>(&'a Mutex<QueueState>);

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.lock().unwrap_or_else(PoisonError::into_inner).in_flight = None;
  }
}

struct Inner<S, B> {
  store:      Arc<S>,
  solver:     B,
  state:      Mutex<QueueState>,
  /// Serializes sweeps and reconciliation against each other.
  sweep_lock: tokio::sync::Mutex<()>,
}

impl<S, B> Inner<S, B> {
  fn state(&self) -> MutexGuard<'_, QueueState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Handle to the solution queue. Cheap to clone.
pub struct SolutionQueue<S, B> {
  inner: Arc<Inner<S, B>>,
}

impl<S, B> Clone for SolutionQueue<S, B> {
  fn clone(&self) -> Self { Self { inner: Arc::clone(&self.inner) } }
}

impl<S, B> SolutionQueue<S, B>
where
  S: ClubStore + 'static,
  B: SolutionService + 'static,
{
  pub fn new(store: Arc<S>, solver: B) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        solver,
        state: Mutex::new(QueueState::default()),
        sweep_lock: tokio::sync::Mutex::new(()),
      }),
    }
  }

  // ── Discovery ─────────────────────────────────────────────────────────────

  /// Sweep today's (local calendar) unprocessed entries into the queue.
  pub async fn process_today_entries(&self) -> Result<SweepReport> {
    self.enqueue_unprocessed_for(Local::now().date_naive()).await
  }

  /// Sweep `date`'s unprocessed entries into the queue. Entries this process
  /// already holds are left alone.
  pub async fn enqueue_unprocessed_for(&self, date: NaiveDate) -> Result<SweepReport> {
    let _sweep = self.inner.sweep_lock.lock().await;
    let store = &*self.inner.store;

    let entries = store
      .unprocessed_entries_for_date(date)
      .await
      .map_err(Error::store)?;

    let mut report = SweepReport {
      entry_date: Some(date),
      discovered: entries.len(),
      ..SweepReport::default()
    };
    for entry in entries {
      match self.admit(entry).await {
        Admit::Enqueued => report.enqueued += 1,
        Admit::AlreadyHeld => report.already_queued += 1,
        Admit::Settled => report.settled += 1,
        Admit::Failed => report.failed += 1,
      }
    }

    info!(
      %date,
      discovered = report.discovered,
      enqueued = report.enqueued,
      already_queued = report.already_queued,
      settled = report.settled,
      failed = report.failed,
      "solution sweep complete"
    );
    Ok(report)
  }

  /// Re-admit entries left flagged queued for longer than `older_than` that
  /// this process does not hold, typically because an earlier process died
  /// with them in memory. Returns how many were re-admitted.
  pub async fn reconcile_stale(&self, older_than: Duration) -> Result<usize> {
    let _sweep = self.inner.sweep_lock.lock().await;

    let cutoff = chrono::Duration::from_std(older_than)
      .ok()
      .and_then(|age| Utc::now().checked_sub_signed(age))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let stale = self
      .inner
      .store
      .stale_queued_entries(cutoff)
      .await
      .map_err(Error::store)?;

    let mut readmitted = 0;
    for entry in stale {
      if let Admit::Enqueued = self.admit(entry).await {
        readmitted += 1;
      }
    }

    if readmitted > 0 {
      warn!(readmitted, "re-queued stale journal entries");
    }
    Ok(readmitted)
  }

  /// Flag `entry` queued and push it, unless it is already held. Callers
  /// hold the sweep lock.
  ///
  /// `entry` comes from a snapshot taken before earlier admissions awaited
  /// the store, so a drain may have finished it since. The store refuses to
  /// flag a processed entry, and such an entry is dropped here.
  async fn admit(&self, entry: JournalEntry) -> Admit {
    if self.inner.state().holds(entry.id) {
      return Admit::AlreadyHeld;
    }
    match self.inner.store.mark_entry_queued(entry.id).await {
      Ok(true) => {}
      Ok(false) => {
        debug!(entry_id = entry.id, "entry processed since discovery, skipping");
        return Admit::Settled;
      }
      Err(e) => {
        error!(entry_id = entry.id, error = %e, "failed to flag entry queued");
        return Admit::Failed;
      }
    }
    debug!(entry_id = entry.id, user = %entry.user_uid, "entry queued");
    self.inner.state().jobs.push_back(Job { entry, retries: 0 });
    Admit::Enqueued
  }

  // ── Draining ──────────────────────────────────────────────────────────────

  /// Take the oldest job and process it. Returns `None` without doing
  /// anything if the queue is empty or a job is already in flight.
  pub async fn drain_once(&self) -> Option<JobOutcome> {
    let job = {
      let mut state = self.inner.state();
      if state.in_flight.is_some() {
        return None;
      }
      let job = state.jobs.pop_front()?;
      state.in_flight = Some(job.entry.id);
      job
    };
    let _in_flight = InFlight(&self.inner.state);

    let entry_id = job.entry.id;
    let outcome = match self.process(&job.entry).await {
      Ok(solution) => {
        info!(entry_id, solution_id = solution.id, "journal entry processed");
        JobOutcome::Processed { entry_id, solution_id: solution.id }
      }
      Err(e) => self.fail(job, e).await,
    };
    Some(outcome)
  }

  async fn process(&self, entry: &JournalEntry) -> Result<Solution> {
    let store = &*self.inner.store;

    let payload = self
      .inner
      .solver
      .solve(SolutionRequest { qna_pairs: entry.content.clone() })
      .await?;

    let solution = store
      .create_solution(NewSolution {
        user_uid:         entry.user_uid.clone(),
        entry_date:       entry.entry_date,
        journal_entry_id: entry.id,
        solution:         payload,
      })
      .await
      .map_err(Error::store)?;

    store.mark_entry_processed(entry.id).await.map_err(Error::store)?;
    store.mark_entry_unqueued(entry.id).await.map_err(Error::store)?;
    Ok(solution)
  }

  async fn fail(&self, job: Job, err: Error) -> JobOutcome {
    let entry_id = job.entry.id;
    let attempts = job.retries + 1;

    if attempts < MAX_RETRIES {
      warn!(entry_id, attempts, error = %err, "solution attempt failed, re-queueing at the back");
      let retries = job.retries + 1;
      self.inner.state().jobs.push_back(Job { retries, ..job });
      return JobOutcome::Requeued { entry_id, retries };
    }

    error!(entry_id, attempts, error = %err, "solution attempts exhausted, unqueueing entry");
    if let Err(e) = self.inner.store.mark_entry_unqueued(entry_id).await {
      error!(entry_id, error = %e, "failed to unqueue entry");
    }
    JobOutcome::Exhausted { entry_id, attempts }
  }

  /// Drain one job every `period` until `shutdown` is cancelled.
  ///
  /// Cancellation is only observed between drains. A job still in flight can
  /// be cut short by aborting the returned handle; its entry stays flagged
  /// queued in the store until [`reconcile_stale`] re-admits it.
  ///
  /// [`reconcile_stale`]: Self::reconcile_stale
  pub fn spawn_drain_loop(&self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    let queue = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      info!(period_ms = period.as_millis() as u64, "solution drain loop started");

      loop {
        tokio::select! {
          _ = shutdown.cancelled() => break,
          _ = ticker.tick() => {
            queue.drain_once().await;
          }
        }
      }
      info!("solution drain loop stopped");
    })
  }

  // ── Status ────────────────────────────────────────────────────────────────

  pub fn status(&self) -> QueueStatus {
    let state = self.inner.state();
    QueueStatus {
      queue_size:    state.jobs.len(),
      is_processing: state.in_flight.is_some(),
    }
  }

  pub fn api_url(&self) -> String { self.inner.solver.endpoint() }

  pub fn set_api_url(&self, url: String) {
    info!(%url, "both-crews service URL changed");
    self.inner.solver.set_endpoint(url);
  }
}

enum Admit {
  Enqueued,
  AlreadyHeld,
  /// Processed, or deleted, since the snapshot.
  Settled,
  Failed,
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use club_core::{journal::NewJournalEntry, solution::SolutionQuery};
  use club_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tokio::sync::Notify;

  use super::*;
  use crate::hooked_store::HookedStore;

  /// Both-crews fake. Fails its first `failures` calls and records the text
  /// of every call. With a gate, each call waits for a permit first.
  struct FakeSolver {
    failures: AtomicUsize,
    seen:     Arc<Mutex<Vec<String>>>,
    gate:     Option<Arc<Notify>>,
    endpoint: Mutex<String>,
  }

  impl FakeSolver {
    fn failing(failures: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
      let seen = Arc::new(Mutex::new(Vec::new()));
      let solver = Self {
        failures: AtomicUsize::new(failures),
        seen:     Arc::clone(&seen),
        gate:     None,
        endpoint: Mutex::new("http://localhost:8000/api/v1/both-crews".into()),
      };
      (solver, seen)
    }

    fn ok() -> (Self, Arc<Mutex<Vec<String>>>) { Self::failing(0) }
  }

  impl SolutionService for FakeSolver {
    async fn solve(&self, request: SolutionRequest) -> Result<Value> {
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      self.seen.lock().unwrap().push(request.qna_pairs.clone());

      let failing = self
        .failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
      if failing {
        return Err(Error::Status { status: 500, body: "boom".into() });
      }
      Ok(json!({ "solution": request.qna_pairs }))
    }

    fn endpoint(&self) -> String { self.endpoint.lock().unwrap().clone() }

    fn set_endpoint(&self, url: String) { *self.endpoint.lock().unwrap() = url; }
  }

  fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 2).unwrap() }

  async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.unwrap())
  }

  async fn write_entry<S: ClubStore>(store: &S, uid: &str, date: NaiveDate, content: &str) -> i64 {
    store
      .upsert_journal_entry(NewJournalEntry::new(uid, date, content).unwrap())
      .await
      .unwrap()
      .id
  }

  async fn entry<S: ClubStore>(store: &S, id: i64) -> JournalEntry {
    store.get_journal_entry_by_id(id).await.unwrap().unwrap()
  }

  async fn solutions_for<S: ClubStore>(store: &S, id: i64) -> Vec<Solution> {
    store
      .list_solutions(SolutionQuery::default())
      .await
      .unwrap()
      .into_iter()
      .filter(|s| s.journal_entry_id == id)
      .collect()
  }

  #[tokio::test]
  async fn sweep_is_idempotent() {
    let store = store().await;
    let a = write_entry(&*store, "alice", day(), "one").await;
    write_entry(&*store, "bob", day(), "two").await;
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);

    let first = queue.enqueue_unprocessed_for(day()).await.unwrap();
    let second = queue.enqueue_unprocessed_for(day()).await.unwrap();

    assert_eq!(first.enqueued, 2);
    assert_eq!(second.enqueued, 0);
    assert_eq!(second.already_queued, 2);
    assert_eq!(queue.status(), QueueStatus { queue_size: 2, is_processing: false });
    assert!(entry(&*store, a).await.is_queued);
  }

  #[tokio::test]
  async fn today_sweep_reports_queue_size() {
    let store = store().await;
    let today = Local::now().date_naive();
    for uid in ["alice", "bob", "carol"] {
      write_entry(&*store, uid, today, "wrote something").await;
    }
    write_entry(&*store, "dave", day(), "another day").await;
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);

    let report = queue.process_today_entries().await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(queue.status().queue_size, 3);
  }

  #[tokio::test]
  async fn processed_entries_are_not_swept() {
    let store = store().await;
    let id = write_entry(&*store, "alice", day(), "done already").await;
    store.mark_entry_processed(id).await.unwrap();
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);

    let report = queue.enqueue_unprocessed_for(day()).await.unwrap();
    assert_eq!(report.discovered, 0);
    assert_eq!(queue.status().queue_size, 0);
  }

  #[tokio::test]
  async fn success_writes_solution_and_flags() {
    let store = store().await;
    let id = write_entry(&*store, "alice", day(), "slept badly").await;
    let (solver, seen) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    let outcome = queue.drain_once().await.unwrap();

    let JobOutcome::Processed { entry_id, solution_id } = outcome else {
      panic!("expected processed, got {outcome:?}");
    };
    assert_eq!(entry_id, id);
    assert_eq!(*seen.lock().unwrap(), vec!["slept badly".to_owned()]);

    let e = entry(&*store, id).await;
    assert!(e.is_processed_for_solutions);
    assert!(!e.is_queued);

    let solutions = solutions_for(&*store, id).await;
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].id, solution_id);
    assert_eq!(solutions[0].solution, json!({ "solution": "slept badly" }));
    assert_eq!(queue.status(), QueueStatus { queue_size: 0, is_processing: false });
  }

  #[tokio::test]
  async fn three_failures_unqueue_without_solution() {
    let store = store().await;
    let id = write_entry(&*store, "alice", day(), "text").await;
    let (solver, seen) = FakeSolver::failing(usize::MAX);
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    assert_eq!(
      queue.drain_once().await,
      Some(JobOutcome::Requeued { entry_id: id, retries: 1 })
    );
    assert_eq!(
      queue.drain_once().await,
      Some(JobOutcome::Requeued { entry_id: id, retries: 2 })
    );
    assert_eq!(
      queue.drain_once().await,
      Some(JobOutcome::Exhausted { entry_id: id, attempts: 3 })
    );
    assert_eq!(queue.drain_once().await, None);
    assert_eq!(seen.lock().unwrap().len(), 3);

    let e = entry(&*store, id).await;
    assert!(!e.is_queued);
    assert!(!e.is_processed_for_solutions);
    assert!(solutions_for(&*store, id).await.is_empty());

    // Eligible again on the next sweep.
    let report = queue.enqueue_unprocessed_for(day()).await.unwrap();
    assert_eq!(report.enqueued, 1);
  }

  #[tokio::test]
  async fn failed_job_retries_behind_later_jobs() {
    let store = store().await;
    write_entry(&*store, "alice", day(), "first").await;
    write_entry(&*store, "bob", day(), "second").await;
    let (solver, seen) = FakeSolver::failing(1);
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    while queue.drain_once().await.is_some() {}

    assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "first"]);
    assert_eq!(
      store.list_solutions(SolutionQuery::default()).await.unwrap().len(),
      2
    );
  }

  #[tokio::test]
  async fn entry_in_flight_is_not_requeued() {
    let store = store().await;
    write_entry(&*store, "alice", day(), "slow one").await;
    let gate = Arc::new(Notify::new());
    let (mut solver, _) = FakeSolver::ok();
    solver.gate = Some(Arc::clone(&gate));
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    let drain = tokio::spawn({
      let queue = queue.clone();
      async move { queue.drain_once().await }
    });
    while !queue.status().is_processing {
      tokio::task::yield_now().await;
    }

    let report = queue.enqueue_unprocessed_for(day()).await.unwrap();
    assert_eq!(report.already_queued, 1);
    assert_eq!(report.enqueued, 0);
    assert_eq!(queue.drain_once().await, None);

    gate.notify_one();
    let outcome = drain.await.unwrap();
    assert!(matches!(outcome, Some(JobOutcome::Processed { .. })));
    assert!(!queue.status().is_processing);
  }

  #[tokio::test]
  async fn sweep_skips_entry_processed_after_discovery() {
    let store = Arc::new(HookedStore::new().await);
    let id = write_entry(&*store, "alice", day(), "raced").await;
    let (solver, seen) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    // A second sweep reads the entry as unprocessed, then stalls while the
    // drain finishes it.
    let pause = store.pause_after_snapshot();
    let sweep = tokio::spawn({
      let queue = queue.clone();
      async move { queue.enqueue_unprocessed_for(day()).await }
    });
    pause.reached.notified().await;
    assert!(matches!(
      queue.drain_once().await,
      Some(JobOutcome::Processed { entry_id, .. }) if entry_id == id
    ));
    pause.release.notify_one();

    let report = sweep.await.unwrap().unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.settled, 1);
    assert_eq!(report.enqueued, 0);
    assert_eq!(queue.status().queue_size, 0);
    assert_eq!(queue.drain_once().await, None);

    let e = entry(&*store, id).await;
    assert!(e.is_processed_for_solutions);
    assert!(!e.is_queued);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(solutions_for(&*store, id).await.len(), 1);
  }

  #[tokio::test]
  async fn reconcile_readmits_entries_left_queued() {
    let store = store().await;
    let stuck = write_entry(&*store, "alice", day(), "orphaned").await;
    store.mark_entry_queued(stuck).await.unwrap();
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);

    assert_eq!(queue.reconcile_stale(Duration::from_secs(3600)).await.unwrap(), 0);
    assert_eq!(queue.reconcile_stale(Duration::ZERO).await.unwrap(), 1);
    assert_eq!(queue.status().queue_size, 1);

    // Already held now.
    assert_eq!(queue.reconcile_stale(Duration::ZERO).await.unwrap(), 0);
    assert!(matches!(
      queue.drain_once().await,
      Some(JobOutcome::Processed { entry_id, .. }) if entry_id == stuck
    ));
  }

  #[tokio::test]
  async fn drain_loop_processes_until_cancelled() {
    let store = store().await;
    let id = write_entry(&*store, "alice", day(), "loop").await;
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    let shutdown = CancellationToken::new();
    let handle = queue.spawn_drain_loop(Duration::from_millis(10), shutdown.clone());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !entry(&*store, id).await.is_processed_for_solutions {
      assert!(tokio::time::Instant::now() < deadline, "drain loop never ran");
      tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    handle.await.unwrap();
  }

  #[tokio::test]
  async fn aborted_drain_leaves_entry_for_reconcile() {
    let store = store().await;
    let id = write_entry(&*store, "alice", day(), "cut short").await;
    let (mut solver, _) = FakeSolver::ok();
    solver.gate = Some(Arc::new(Notify::new()));
    let queue = SolutionQueue::new(Arc::clone(&store), solver);
    queue.enqueue_unprocessed_for(day()).await.unwrap();

    let handle = queue.spawn_drain_loop(Duration::from_millis(1), CancellationToken::new());
    while !queue.status().is_processing {
      tokio::task::yield_now().await;
    }
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    assert!(!queue.status().is_processing);
    assert!(entry(&*store, id).await.is_queued);

    // A fresh process finds it on its startup reconcile.
    let (solver, _) = FakeSolver::ok();
    let restarted = SolutionQueue::new(Arc::clone(&store), solver);
    assert_eq!(restarted.reconcile_stale(Duration::ZERO).await.unwrap(), 1);
    assert!(matches!(
      restarted.drain_once().await,
      Some(JobOutcome::Processed { entry_id, .. }) if entry_id == id
    ));
  }

  #[tokio::test]
  async fn api_url_round_trips() {
    let (solver, _) = FakeSolver::ok();
    let queue = SolutionQueue::new(store().await, solver);
    queue.set_api_url("http://solver.internal".into());
    assert_eq!(queue.api_url(), "http://solver.internal");
  }
}
