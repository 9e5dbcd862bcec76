//! [`SqliteStore`]: the SQLite implementation of [`ClubStore`].

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};

use club_core::{
  crew::{CrewResponse, CrewResponseQuery, NewCrewResponse},
  journal::{JournalEntry, JournalQuery, NewJournalEntry},
  question::{DEFAULT_TEMPLATE_USER, JournalQuestionSet, Question, builtin_default_questions},
  solution::{NewSolution, Solution, SolutionQuery},
  store::ClubStore,
  user::{User, UserProfile},
};

use crate::{
  Result,
  encode::{
    CREW_COLUMNS, ENTRY_COLUMNS, QUESTION_SET_COLUMNS, RawCrewResponse, RawJournalEntry,
    RawQuestionSet, RawSolution, RawUser, SOLUTION_COLUMNS, USER_COLUMNS, decode_date,
    decode_questions, encode_date, encode_dt, encode_json, encode_questions, month_bounds,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A 1% Club store backed by a single SQLite file.
///
/// The inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-row `SELECT` built from `sql` and decode it with `map`.
  async fn select_one<R>(
    &self,
    sql: String,
    args: Vec<SqlValue>,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
  ) -> Result<Option<R>>
  where
    R: Send + 'static,
  {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(args), map)
            .optional()?,
        )
      })
      .await?;
    Ok(raw)
  }

  /// Run a multi-row `SELECT` built from `sql` and decode it with `map`.
  async fn select_all<R>(
    &self,
    sql: String,
    args: Vec<SqlValue>,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
  ) -> Result<Vec<R>>
  where
    R: Send + 'static,
  {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(args), map)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(raws)
  }

  /// Run an `INSERT … RETURNING` (or upsert) that yields exactly one row.
  async fn write_returning<R>(
    &self,
    sql: String,
    args: Vec<SqlValue>,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
  ) -> Result<R>
  where
    R: Send + 'static,
  {
    let raw = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, rusqlite::params_from_iter(args), map)?))
      .await?;
    Ok(raw)
  }

  /// Run a write statement and return the number of rows it changed.
  async fn execute(&self, sql: &'static str, args: Vec<SqlValue>) -> Result<usize> {
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(args))?))
      .await?;
    Ok(changed)
  }

  async fn delete_by_id(&self, sql: &'static str, id: i64) -> Result<bool> {
    Ok(self.execute(sql, vec![SqlValue::Integer(id)]).await? > 0)
  }
}

// ─── Query building ──────────────────────────────────────────────────────────

/// Accumulates `WHERE` conditions with positional parameters.
#[derive(Default)]
struct Filter {
  conds: Vec<String>,
  args:  Vec<SqlValue>,
}

impl Filter {
  fn push(&mut self, cond: &str, value: SqlValue) {
    self.args.push(value);
    self.conds.push(format!("{cond} ?{}", self.args.len()));
  }

  /// Render the `WHERE` clause and the `LIMIT`/`OFFSET` tail, returning the
  /// finished parameter list. SQLite needs a `LIMIT` before an `OFFSET`, so an
  /// offset on its own is paired with `LIMIT -1`.
  fn finish(
    mut self,
    limit: Option<usize>,
    offset: Option<usize>,
  ) -> (String, String, Vec<SqlValue>) {
    let where_clause = if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    };

    let mut tail = String::new();
    if limit.is_some() || offset.is_some() {
      self
        .args
        .push(SqlValue::Integer(limit.map_or(-1, |l| l as i64)));
      tail.push_str(&format!("LIMIT ?{}", self.args.len()));
    }
    if let Some(offset) = offset {
      self.args.push(SqlValue::Integer(offset as i64));
      tail.push_str(&format!(" OFFSET ?{}", self.args.len()));
    }

    (where_clause, tail, self.args)
  }
}

fn text(s: impl Into<String>) -> SqlValue { SqlValue::Text(s.into()) }

fn opt_text(s: Option<impl Into<String>>) -> SqlValue {
  s.map(text).unwrap_or(SqlValue::Null)
}

fn date(d: NaiveDate) -> SqlValue { text(encode_date(d)) }

fn timestamp(dt: DateTime<Utc>) -> SqlValue { text(encode_dt(dt)) }

// ─── ClubStore impl ──────────────────────────────────────────────────────────

impl ClubStore for SqliteStore {
  type Error = crate::Error;

  // ── Users ─────────────────────────────────────────────────────────────────

  async fn save_user(&self, profile: UserProfile) -> Result<User> {
    let now = timestamp(Utc::now());
    let args = vec![
      text(profile.uid),
      opt_text(profile.email),
      opt_text(profile.display_name),
      opt_text(profile.first_name),
      opt_text(profile.last_name),
      opt_text(profile.photo_url),
      SqlValue::Integer(i64::from(profile.email_verified)),
      opt_text(profile.use_case.map(|u| u.as_str())),
      opt_text(profile.goal.map(|g| g.as_str())),
      opt_text(profile.context),
      now,
    ];

    let raw = self
      .write_returning(
        format!(
          "INSERT INTO users (
             uid, email, display_name, first_name, last_name, photo_url,
             email_verified, use_case, goal, context, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
           ON CONFLICT (uid) DO UPDATE SET
             email          = excluded.email,
             display_name   = excluded.display_name,
             first_name     = excluded.first_name,
             last_name      = excluded.last_name,
             photo_url      = excluded.photo_url,
             email_verified = excluded.email_verified,
             use_case       = excluded.use_case,
             goal           = excluded.goal,
             context        = excluded.context,
             updated_at     = excluded.updated_at
           RETURNING {USER_COLUMNS}"
        ),
        args,
        RawUser::from_row,
      )
      .await?;

    raw.into_user()
  }

  async fn get_user(&self, uid: String) -> Result<Option<User>> {
    let raw = self
      .select_one(
        format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?1"),
        vec![text(uid)],
        RawUser::from_row,
      )
      .await?;
    raw.map(RawUser::into_user).transpose()
  }

  async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<User>> {
    let raws = self
      .select_all(
        format!(
          "SELECT {USER_COLUMNS} FROM users
           ORDER BY created_at, uid
           LIMIT ?1 OFFSET ?2"
        ),
        vec![SqlValue::Integer(limit as i64), SqlValue::Integer(offset as i64)],
        RawUser::from_row,
      )
      .await?;
    raws.into_iter().map(RawUser::into_user).collect()
  }

  // ── Crew responses ────────────────────────────────────────────────────────

  async fn upsert_crew_response(&self, input: NewCrewResponse) -> Result<CrewResponse> {
    let now = Utc::now();
    let created_on = now.with_timezone(&Local).date_naive();

    let args = vec![
      text(input.user_uid),
      opt_text(input.request_context),
      opt_text(input.request_goal),
      text(encode_json(&input.response_data)?),
      timestamp(now),
      date(created_on),
    ];

    // The conflicting row keeps its created_at/created_on; excluded.created_at
    // is this call's timestamp.
    let raw = self
      .write_returning(
        format!(
          "INSERT INTO crew_responses (
             user_uid, request_context, request_goal, response_data, created_at, created_on
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (user_uid, created_on) DO UPDATE SET
             request_context = excluded.request_context,
             request_goal    = excluded.request_goal,
             response_data   = excluded.response_data,
             updated_at      = excluded.created_at
           RETURNING {CREW_COLUMNS}"
        ),
        args,
        RawCrewResponse::from_row,
      )
      .await?;

    raw.into_crew_response()
  }

  async fn get_crew_response(&self, id: i64) -> Result<Option<CrewResponse>> {
    let raw = self
      .select_one(
        format!("SELECT {CREW_COLUMNS} FROM crew_responses WHERE id = ?1"),
        vec![SqlValue::Integer(id)],
        RawCrewResponse::from_row,
      )
      .await?;
    raw.map(RawCrewResponse::into_crew_response).transpose()
  }

  async fn crew_response_for_day(
    &self,
    user_uid: String,
    day: NaiveDate,
  ) -> Result<Option<CrewResponse>> {
    let raw = self
      .select_one(
        format!(
          "SELECT {CREW_COLUMNS} FROM crew_responses
           WHERE user_uid = ?1 AND created_on = ?2"
        ),
        vec![text(user_uid), date(day)],
        RawCrewResponse::from_row,
      )
      .await?;
    raw.map(RawCrewResponse::into_crew_response).transpose()
  }

  async fn list_crew_responses(&self, query: CrewResponseQuery) -> Result<Vec<CrewResponse>> {
    let mut filter = Filter::default();
    if let Some(uid) = query.user_uid {
      filter.push("user_uid =", text(uid));
    }
    if let Some(start) = query.start_date {
      filter.push("created_on >=", date(start));
    }
    if let Some(end) = query.end_date {
      filter.push("created_on <=", date(end));
    }
    let (clause, tail, args) = filter.finish(
      Some(query.limit.unwrap_or(100)),
      Some(query.offset.unwrap_or(0)),
    );

    let raws = self
      .select_all(
        format!(
          "SELECT {CREW_COLUMNS} FROM crew_responses {clause}
           ORDER BY created_at DESC, id DESC {tail}"
        ),
        args,
        RawCrewResponse::from_row,
      )
      .await?;
    raws.into_iter().map(RawCrewResponse::into_crew_response).collect()
  }

  async fn delete_crew_response(&self, id: i64) -> Result<bool> {
    self.delete_by_id("DELETE FROM crew_responses WHERE id = ?1", id).await
  }

  // ── Journal entries ───────────────────────────────────────────────────────

  async fn upsert_journal_entry(&self, input: NewJournalEntry) -> Result<JournalEntry> {
    let word_count = input.word_count();
    let args = vec![
      text(input.user_uid),
      date(input.entry_date),
      text(input.content),
      SqlValue::Integer(i64::from(word_count)),
      timestamp(Utc::now()),
    ];

    let raw = self
      .write_returning(
        format!(
          "INSERT INTO journal_entries (
             user_uid, entry_date, content, word_count, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
           ON CONFLICT (user_uid, entry_date) DO UPDATE SET
             content    = excluded.content,
             word_count = excluded.word_count,
             updated_at = excluded.updated_at
           RETURNING {ENTRY_COLUMNS}"
        ),
        args,
        RawJournalEntry::from_row,
      )
      .await?;

    raw.into_entry()
  }

  async fn get_journal_entry(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> Result<Option<JournalEntry>> {
    let raw = self
      .select_one(
        format!(
          "SELECT {ENTRY_COLUMNS} FROM journal_entries
           WHERE user_uid = ?1 AND entry_date = ?2"
        ),
        vec![text(user_uid), date(entry_date)],
        RawJournalEntry::from_row,
      )
      .await?;
    raw.map(RawJournalEntry::into_entry).transpose()
  }

  async fn get_journal_entry_by_id(&self, id: i64) -> Result<Option<JournalEntry>> {
    let raw = self
      .select_one(
        format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1"),
        vec![SqlValue::Integer(id)],
        RawJournalEntry::from_row,
      )
      .await?;
    raw.map(RawJournalEntry::into_entry).transpose()
  }

  async fn list_journal_entries(&self, query: JournalQuery) -> Result<Vec<JournalEntry>> {
    let mut filter = Filter::default();
    filter.push("user_uid =", text(query.user_uid));
    if let Some(start) = query.start_date {
      filter.push("entry_date >=", date(start));
    }
    if let Some(end) = query.end_date {
      filter.push("entry_date <=", date(end));
    }
    let (clause, tail, args) = filter.finish(query.limit, None);

    let raws = self
      .select_all(
        format!(
          "SELECT {ENTRY_COLUMNS} FROM journal_entries {clause}
           ORDER BY entry_date DESC {tail}"
        ),
        args,
        RawJournalEntry::from_row,
      )
      .await?;
    raws.into_iter().map(RawJournalEntry::into_entry).collect()
  }

  async fn journal_entry_dates(
    &self,
    user_uid: String,
    year: i32,
    month: u32,
  ) -> Result<Vec<NaiveDate>> {
    let (start, end) = month_bounds(year, month)?;
    let raws = self
      .select_all(
        "SELECT entry_date FROM journal_entries
         WHERE user_uid = ?1 AND entry_date >= ?2 AND entry_date < ?3
         ORDER BY entry_date"
          .to_owned(),
        vec![text(user_uid), date(start), date(end)],
        |row| row.get::<_, String>(0),
      )
      .await?;
    raws.iter().map(|s| decode_date(s)).collect()
  }

  async fn unprocessed_entries_for_date(&self, entry_date: NaiveDate) -> Result<Vec<JournalEntry>> {
    let raws = self
      .select_all(
        format!(
          "SELECT {ENTRY_COLUMNS} FROM journal_entries
           WHERE entry_date = ?1 AND is_processed_for_solutions = 0
           ORDER BY id"
        ),
        vec![date(entry_date)],
        RawJournalEntry::from_row,
      )
      .await?;
    raws.into_iter().map(RawJournalEntry::into_entry).collect()
  }

  async fn stale_queued_entries(&self, queued_before: DateTime<Utc>) -> Result<Vec<JournalEntry>> {
    // Rows queued before `queued_at` existed have it NULL; treat them as stale.
    let raws = self
      .select_all(
        format!(
          "SELECT {ENTRY_COLUMNS} FROM journal_entries
           WHERE is_queued = 1
             AND is_processed_for_solutions = 0
             AND (queued_at IS NULL OR queued_at < ?1)
           ORDER BY queued_at, id"
        ),
        vec![timestamp(queued_before)],
        RawJournalEntry::from_row,
      )
      .await?;
    raws.into_iter().map(RawJournalEntry::into_entry).collect()
  }

  async fn mark_entry_queued(&self, id: i64) -> Result<bool> {
    let changed = self
      .execute(
        "UPDATE journal_entries SET is_queued = 1, queued_at = ?2
         WHERE id = ?1 AND is_processed_for_solutions = 0",
        vec![SqlValue::Integer(id), timestamp(Utc::now())],
      )
      .await?;
    Ok(changed > 0)
  }

  async fn mark_entry_unqueued(&self, id: i64) -> Result<()> {
    self
      .execute(
        "UPDATE journal_entries SET is_queued = 0, queued_at = NULL WHERE id = ?1",
        vec![SqlValue::Integer(id)],
      )
      .await?;
    Ok(())
  }

  async fn mark_entry_processed(&self, id: i64) -> Result<()> {
    self
      .execute(
        "UPDATE journal_entries SET is_processed_for_solutions = 1 WHERE id = ?1",
        vec![SqlValue::Integer(id)],
      )
      .await?;
    Ok(())
  }

  async fn delete_journal_entry(&self, id: i64) -> Result<bool> {
    self.delete_by_id("DELETE FROM journal_entries WHERE id = ?1", id).await
  }

  // ── Solutions ─────────────────────────────────────────────────────────────

  async fn create_solution(&self, input: NewSolution) -> Result<Solution> {
    let args = vec![
      text(input.user_uid),
      date(input.entry_date),
      SqlValue::Integer(input.journal_entry_id),
      text(encode_json(&input.solution)?),
      timestamp(Utc::now()),
    ];

    let raw = self
      .write_returning(
        format!(
          "INSERT INTO solutions (user_uid, entry_date, journal_entry_id, solution, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           RETURNING {SOLUTION_COLUMNS}"
        ),
        args,
        RawSolution::from_row,
      )
      .await?;

    raw.into_solution()
  }

  async fn get_solution(&self, id: i64) -> Result<Option<Solution>> {
    let raw = self
      .select_one(
        format!("SELECT {SOLUTION_COLUMNS} FROM solutions WHERE id = ?1"),
        vec![SqlValue::Integer(id)],
        RawSolution::from_row,
      )
      .await?;
    raw.map(RawSolution::into_solution).transpose()
  }

  async fn list_solutions(&self, query: SolutionQuery) -> Result<Vec<Solution>> {
    let mut filter = Filter::default();
    if let Some(uid) = query.user_uid {
      filter.push("user_uid =", text(uid));
    }
    if let Some(day) = query.entry_date {
      filter.push("entry_date =", date(day));
    }
    if let Some(start) = query.start_date {
      filter.push("entry_date >=", date(start));
    }
    if let Some(end) = query.end_date {
      filter.push("entry_date <=", date(end));
    }
    let (clause, tail, args) = filter.finish(query.limit, query.offset);

    let raws = self
      .select_all(
        format!(
          "SELECT {SOLUTION_COLUMNS} FROM solutions {clause}
           ORDER BY created_at DESC, id DESC {tail}"
        ),
        args,
        RawSolution::from_row,
      )
      .await?;
    raws.into_iter().map(RawSolution::into_solution).collect()
  }

  async fn delete_solution(&self, id: i64) -> Result<bool> {
    self.delete_by_id("DELETE FROM solutions WHERE id = ?1", id).await
  }

  // ── Question sets ─────────────────────────────────────────────────────────

  async fn get_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
  ) -> Result<Option<JournalQuestionSet>> {
    let raw = self
      .select_one(
        format!(
          "SELECT {QUESTION_SET_COLUMNS} FROM journal_questions
           WHERE user_uid = ?1 AND entry_date = ?2"
        ),
        vec![text(user_uid), date(entry_date)],
        RawQuestionSet::from_row,
      )
      .await?;
    raw.map(RawQuestionSet::into_question_set).transpose()
  }

  async fn upsert_question_set(
    &self,
    user_uid: String,
    entry_date: NaiveDate,
    questions: Vec<Question>,
  ) -> Result<JournalQuestionSet> {
    let args = vec![
      text(user_uid),
      date(entry_date),
      text(encode_questions(&questions)?),
      timestamp(Utc::now()),
    ];

    let raw = self
      .write_returning(
        format!(
          "INSERT INTO journal_questions (user_uid, entry_date, questions, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?4)
           ON CONFLICT (user_uid, entry_date) DO UPDATE SET
             questions  = excluded.questions,
             updated_at = excluded.updated_at
           RETURNING {QUESTION_SET_COLUMNS}"
        ),
        args,
        RawQuestionSet::from_row,
      )
      .await?;

    raw.into_question_set()
  }

  async fn default_questions(&self) -> Result<Vec<Question>> {
    let stored = self
      .select_one(
        "SELECT questions FROM journal_questions
         WHERE user_uid = ?1
         ORDER BY entry_date DESC
         LIMIT 1"
          .to_owned(),
        vec![text(DEFAULT_TEMPLATE_USER)],
        |row| row.get::<_, String>(0),
      )
      .await?;

    match stored {
      Some(json) => decode_questions(&json),
      None => Ok(builtin_default_questions()),
    }
  }
}
