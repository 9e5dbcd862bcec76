//! The `ClubStore` persistence trait.
//!
//! The trait is implemented by storage backends (e.g. `club-store-sqlite`).
//! The background worker and the HTTP API depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
  crew::{CrewResponse, CrewResponseQuery, NewCrewResponse},
  journal::{JournalEntry, JournalQuery, NewJournalEntry},
  question::{JournalQuestionSet, Question},
  solution::{NewSolution, Solution, SolutionQuery},
  user::{User, UserProfile},
};

/// Abstraction over a 1% Club storage backend.
///
/// Crew responses, journal entries and question sets are written with atomic
/// upserts keyed on their uniqueness constraint. Solutions are never updated.
/// Deletes exist only for the user-facing API; the background workers never
/// call them.
///
/// Every method returns a `Send` future, so a store can sit behind axum
/// handlers and spawned worker tasks alike.
pub trait ClubStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Insert the profile, or overwrite the stored profile with the same uid.
  fn save_user(
    &self,
    profile: UserProfile,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    uid: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  /// List users in creation order.
  fn list_users(
    &self,
    limit: usize,
    offset: usize,
  ) -> impl Future<Output = Result<Vec<User>, Self::Error>> + Send + '_;

  // ── Crew responses ────────────────────────────────────────────────────

  /// Insert a response for `(user, today)` or update the one already there.
  ///
  /// Must be a single atomic statement against the `(user_uid, created_on)`
  /// uniqueness constraint. On update `created_at` and `created_on` are left
  /// untouched and `updated_at` is stamped.
  fn upsert_crew_response(
    &self,
    input: NewCrewResponse,
  ) -> impl Future<Output = Result<CrewResponse, Self::Error>> + Send + '_;

  fn get_crew_response(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<CrewResponse>, Self::Error>> + Send + '_;

  fn crew_response_for_day(
    &self,
    user_uid: String,
    day: NaiveDate,
  ) -> impl Future<Output = Result<Option<CrewResponse>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_crew_responses(
    &self,
    query: CrewResponseQuery,
  ) -> impl Future<Output = Result<Vec<CrewResponse>, Self::Error>> + Send + '_;

  /// Returns `false` if no response had that id.
  fn delete_crew_response(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Journal entries ───────────────────────────────────────────────────

  /// Insert or replace the content of the entry for `(user_uid, entry_date)`.
  /// The processing flags are left as they are.
  fn upsert_journal_entry(
    &self,
    input: NewJournalEntry,
  ) -> impl Future<Output = Result<JournalEntry, Self::Error>> + Send + '_;

  fn get_journal_entry(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> impl Future<Output = Result<Option<JournalEntry>, Self::Error>> + Send + '_;

  fn get_journal_entry_by_id(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<JournalEntry>, Self::Error>> + Send + '_;

  /// Entries for one user, newest date first.
  fn list_journal_entries(
    &self,
    query: JournalQuery,
  ) -> impl Future<Output = Result<Vec<JournalEntry>, Self::Error>> + Send + '_;

  /// Dates within `year`/`month` (1-based) on which the user wrote an entry.
  fn journal_entry_dates(
    &self,
    user_uid: String,
    year: i32,
    month: u32,
  ) -> impl Future<Output = Result<Vec<NaiveDate>, Self::Error>> + Send + '_;

  /// All users' entries for `entry_date` with `is_processed_for_solutions = false`,
  /// oldest first.
  fn unprocessed_entries_for_date(
    &self,
    entry_date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<JournalEntry>, Self::Error>> + Send + '_;

  /// Entries still flagged queued but unprocessed whose `queued_at` is before
  /// `queued_before`.
  fn stale_queued_entries(
    &self,
    queued_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<JournalEntry>, Self::Error>> + Send + '_;

  /// Set `is_queued` and stamp `queued_at`, unless the entry is already
  /// processed. Returns whether the entry was flagged.
  fn mark_entry_queued(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Clear `is_queued` and `queued_at`.
  fn mark_entry_unqueued(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn mark_entry_processed(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete the entry and its solutions. Returns `false` if no entry had that id.
  fn delete_journal_entry(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Solutions ─────────────────────────────────────────────────────────

  fn create_solution(
    &self,
    input: NewSolution,
  ) -> impl Future<Output = Result<Solution, Self::Error>> + Send + '_;

  fn get_solution(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Solution>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_solutions(
    &self,
    query: SolutionQuery,
  ) -> impl Future<Output = Result<Vec<Solution>, Self::Error>> + Send + '_;

  fn delete_solution(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Question sets ─────────────────────────────────────────────────────

  fn get_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> impl Future<Output = Result<Option<JournalQuestionSet>, Self::Error>> + Send + '_;

  /// Update the set for `(user_uid, entry_date)` if present, else insert it.
  fn upsert_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
    questions: Vec<Question>,
  ) -> impl Future<Output = Result<JournalQuestionSet, Self::Error>> + Send + '_;

  /// The questions stored under the `default_template` user, or the built-in
  /// template if no such row exists.
  fn default_questions(
    &self,
  ) -> impl Future<Output = Result<Vec<Question>, Self::Error>> + Send + '_;
}
