//! A [`ClubStore`] for worker tests. Delegates to an in-memory
//! [`SqliteStore`] and can fail or pause selected calls.

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, AtomicUsize, Ordering},
};

use chrono::{DateTime, NaiveDate, Utc};
use club_core::{
  crew::{CrewResponse, CrewResponseQuery, NewCrewResponse},
  journal::{JournalEntry, JournalQuery, NewJournalEntry},
  question::{JournalQuestionSet, Question},
  solution::{NewSolution, Solution, SolutionQuery},
  store::ClubStore,
  user::{User, UserProfile},
};
use club_store_sqlite::SqliteStore;
use tokio::sync::Notify;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
  #[error("injected failure")]
  Injected,

  #[error(transparent)]
  Store(#[from] club_store_sqlite::Error),
}

type Result<T> = std::result::Result<T, HookError>;

/// Both halves of a one-shot pause.
pub struct Pause {
  /// Notified once the paused call has its result in hand.
  pub reached: Arc<Notify>,
  /// Notify to let the paused call return.
  pub release: Arc<Notify>,
}

pub struct HookedStore {
  inner:               SqliteStore,
  list_users_failures: AtomicUsize,
  question_sets_fail:  AtomicBool,
  snapshot_pause:      Mutex<Option<Pause>>,
}

impl HookedStore {
  pub async fn new() -> Self {
    Self {
      inner:               SqliteStore::open_in_memory().await.unwrap(),
      list_users_failures: AtomicUsize::new(0),
      question_sets_fail:  AtomicBool::new(false),
      snapshot_pause:      Mutex::new(None),
    }
  }

  /// Fail the next `n` calls to `list_users`.
  pub fn fail_list_users(&self, n: usize) {
    self.list_users_failures.store(n, Ordering::SeqCst);
  }

  pub fn list_users_failures_left(&self) -> usize {
    self.list_users_failures.load(Ordering::SeqCst)
  }

  /// Fail every `upsert_question_set`.
  pub fn fail_question_sets(&self) { self.question_sets_fail.store(true, Ordering::SeqCst); }

  /// Hold the next `unprocessed_entries_for_date` after it has read its rows.
  pub fn pause_after_snapshot(&self) -> Pause {
    let pause = Pause {
      reached: Arc::new(Notify::new()),
      release: Arc::new(Notify::new()),
    };
    *self.snapshot_pause.lock().unwrap() = Some(Pause {
      reached: Arc::clone(&pause.reached),
      release: Arc::clone(&pause.release),
    });
    pause
  }
}

impl ClubStore for HookedStore {
  type Error = HookError;

  async fn save_user(&self, profile: UserProfile) -> Result<User> {
    Ok(self.inner.save_user(profile).await?)
  }

  async fn get_user(&self, uid: String) -> Result<Option<User>> {
    Ok(self.inner.get_user(uid).await?)
  }

  async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
    let injected = self
      .list_users_failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if injected {
      return Err(HookError::Injected);
    }
    Ok(self.inner.list_users(limit, offset).await?)
  }

  async fn upsert_crew_response(&self, input: NewCrewResponse) -> Result<CrewResponse> {
    Ok(self.inner.upsert_crew_response(input).await?)
  }

  async fn get_crew_response(&self, id: i64) -> Result<Option<CrewResponse>> {
    Ok(self.inner.get_crew_response(id).await?)
  }

  async fn crew_response_for_day(
    &self,
    user_uid: String,
    day: NaiveDate,
  ) -> Result<Option<CrewResponse>> {
    Ok(self.inner.crew_response_for_day(user_uid, day).await?)
  }

  async fn list_crew_responses(&self, query: CrewResponseQuery) -> Result<Vec<CrewResponse>> {
    Ok(self.inner.list_crew_responses(query).await?)
  }

  async fn delete_crew_response(&self, id: i64) -> Result<bool> {
    Ok(self.inner.delete_crew_response(id).await?)
  }

  async fn upsert_journal_entry(&self, input: NewJournalEntry) -> Result<JournalEntry> {
    Ok(self.inner.upsert_journal_entry(input).await?)
  }

  async fn get_journal_entry(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> Result<Option<JournalEntry>> {
    Ok(self.inner.get_journal_entry(user_uid, entry_date).await?)
  }

  async fn get_journal_entry_by_id(&self, id: i64) -> Result<Option<JournalEntry>> {
    Ok(self.inner.get_journal_entry_by_id(id).await?)
  }

  async fn list_journal_entries(&self, query: JournalQuery) -> Result<Vec<JournalEntry>> {
    Ok(self.inner.list_journal_entries(query).await?)
  }

  async fn journal_entry_dates(
    &self,
    user_uid: String,
    year: i32,
    month: u32,
  ) -> Result<Vec<NaiveDate>> {
    Ok(self.inner.journal_entry_dates(user_uid, year, month).await?)
  }

  async fn unprocessed_entries_for_date(&self, entry_date: NaiveDate) -> Result<Vec<JournalEntry>> {
    let entries = self.inner.unprocessed_entries_for_date(entry_date).await?;
    let pause = self.snapshot_pause.lock().unwrap().take();
    if let Some(pause) = pause {
      pause.reached.notify_one();
      pause.release.notified().await;
    }
    Ok(entries)
  }

  async fn stale_queued_entries(&self, queued_before: DateTime<Utc>) -> Result<Vec<JournalEntry>> {
    Ok(self.inner.stale_queued_entries(queued_before).await?)
  }

  async fn mark_entry_queued(&self, id: i64) -> Result<bool> {
    Ok(self.inner.mark_entry_queued(id).await?)
  }

  async fn mark_entry_unqueued(&self, id: i64) -> Result<()> {
    Ok(self.inner.mark_entry_unqueued(id).await?)
  }

  async fn mark_entry_processed(&self, id: i64) -> Result<()> {
    Ok(self.inner.mark_entry_processed(id).await?)
  }

  async fn delete_journal_entry(&self, id: i64) -> Result<bool> {
    Ok(self.inner.delete_journal_entry(id).await?)
  }

  async fn create_solution(&self, input: NewSolution) -> Result<Solution> {
    Ok(self.inner.create_solution(input).await?)
  }

  async fn get_solution(&self, id: i64) -> Result<Option<Solution>> {
    Ok(self.inner.get_solution(id).await?)
  }

  async fn list_solutions(&self, query: SolutionQuery) -> Result<Vec<Solution>> {
    Ok(self.inner.list_solutions(query).await?)
  }

  async fn delete_solution(&self, id: i64) -> Result<bool> {
    Ok(self.inner.delete_solution(id).await?)
  }

  async fn get_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> Result<Option<JournalQuestionSet>> {
    Ok(self.inner.get_question_set(user_uid, entry_date).await?)
  }

  async fn upsert_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
    questions: Vec<Question>,
  ) -> Result<JournalQuestionSet> {
    if self.question_sets_fail.load(Ordering::SeqCst) {
      return Err(HookError::Injected);
    }
    Ok(self.inner.upsert_question_set(user_uid, entry_date, questions).await?)
  }

  async fn default_questions(&self) -> Result<Vec<Question>> {
    Ok(self.inner.default_questions().await?)
  }
}
