//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that they
//! compare correctly as text. Calendar dates are `YYYY-MM-DD`. JSON payloads
//! and question lists are stored as compact JSON.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use club_core::{
  crew::CrewResponse,
  journal::JournalEntry,
  question::{JournalQuestionSet, Question},
  solution::Solution,
  user::{Goal, UseCase, User},
};
use serde_json::Value;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

/// Half-open `[first day, first day of next month)` bounds for a month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
  let start = NaiveDate::from_ymd_opt(year, month, 1)
    .ok_or(Error::InvalidMonth { year, month })?;
  let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
  let end = NaiveDate::from_ymd_opt(ny, nm, 1)
    .ok_or(Error::InvalidMonth { year, month })?;
  Ok((start, end))
}

// ─── Profile enums ───────────────────────────────────────────────────────────

fn decode_goal(s: Option<String>) -> Result<Option<Goal>> {
  Ok(s.as_deref().map(Goal::parse).transpose()?)
}

fn decode_use_case(s: Option<String>) -> Result<Option<UseCase>> {
  Ok(s.as_deref().map(UseCase::parse).transpose()?)
}

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json(v: &Value) -> Result<String> { Ok(serde_json::to_string(v)?) }

pub fn encode_questions(q: &[Question]) -> Result<String> {
  Ok(serde_json::to_string(q)?)
}

pub fn decode_questions(s: &str) -> Result<Vec<Question>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Raw row types ───────────────────────────────────────────────────────────

pub const USER_COLUMNS: &str = "uid, email, display_name, first_name, last_name, photo_url,
   email_verified, use_case, goal, context, created_at, updated_at";

/// Raw strings read directly from a `users` row.
pub struct RawUser {
  pub uid:            String,
  pub email:          Option<String>,
  pub display_name:   Option<String>,
  pub first_name:     Option<String>,
  pub last_name:      Option<String>,
  pub photo_url:      Option<String>,
  pub email_verified: bool,
  pub use_case:       Option<String>,
  pub goal:           Option<String>,
  pub context:        Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawUser {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      uid:            row.get(0)?,
      email:          row.get(1)?,
      display_name:   row.get(2)?,
      first_name:     row.get(3)?,
      last_name:      row.get(4)?,
      photo_url:      row.get(5)?,
      email_verified: row.get(6)?,
      use_case:       row.get(7)?,
      goal:           row.get(8)?,
      context:        row.get(9)?,
      created_at:     row.get(10)?,
      updated_at:     row.get(11)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      uid:            self.uid,
      email:          self.email,
      display_name:   self.display_name,
      first_name:     self.first_name,
      last_name:      self.last_name,
      photo_url:      self.photo_url,
      email_verified: self.email_verified,
      use_case:       decode_use_case(self.use_case)?,
      goal:           decode_goal(self.goal)?,
      context:        self.context,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

pub const CREW_COLUMNS: &str = "id, user_uid, request_context, request_goal, response_data,
   created_at, created_on, updated_at";

pub struct RawCrewResponse {
  pub id:              i64,
  pub user_uid:        String,
  pub request_context: Option<String>,
  pub request_goal:    Option<String>,
  pub response_data:   String,
  pub created_at:      String,
  pub created_on:      String,
  pub updated_at:      Option<String>,
}

impl RawCrewResponse {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      user_uid:        row.get(1)?,
      request_context: row.get(2)?,
      request_goal:    row.get(3)?,
      response_data:   row.get(4)?,
      created_at:      row.get(5)?,
      created_on:      row.get(6)?,
      updated_at:      row.get(7)?,
    })
  }

  pub fn into_crew_response(self) -> Result<CrewResponse> {
    Ok(CrewResponse {
      id:              self.id,
      user_uid:        self.user_uid,
      request_context: self.request_context,
      request_goal:    self.request_goal,
      response_data:   serde_json::from_str(&self.response_data)?,
      created_at:      decode_dt(&self.created_at)?,
      created_on:      decode_date(&self.created_on)?,
      updated_at:      decode_opt_dt(self.updated_at)?,
    })
  }
}

pub const ENTRY_COLUMNS: &str = "id, user_uid, entry_date, content, word_count, is_queued,
   is_processed_for_solutions, queued_at, created_at, updated_at";

pub struct RawJournalEntry {
  pub id:                         i64,
  pub user_uid:                   String,
  pub entry_date:                 String,
  pub content:                    String,
  pub word_count:                 u32,
  pub is_queued:                  bool,
  pub is_processed_for_solutions: bool,
  pub queued_at:                  Option<String>,
  pub created_at:                 String,
  pub updated_at:                 String,
}

impl RawJournalEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                         row.get(0)?,
      user_uid:                   row.get(1)?,
      entry_date:                 row.get(2)?,
      content:                    row.get(3)?,
      word_count:                 row.get(4)?,
      is_queued:                  row.get(5)?,
      is_processed_for_solutions: row.get(6)?,
      queued_at:                  row.get(7)?,
      created_at:                 row.get(8)?,
      updated_at:                 row.get(9)?,
    })
  }

  pub fn into_entry(self) -> Result<JournalEntry> {
    Ok(JournalEntry {
      id:                         self.id,
      user_uid:                   self.user_uid,
      entry_date:                 decode_date(&self.entry_date)?,
      content:                    self.content,
      word_count:                 self.word_count,
      is_queued:                  self.is_queued,
      is_processed_for_solutions: self.is_processed_for_solutions,
      queued_at:                  decode_opt_dt(self.queued_at)?,
      created_at:                 decode_dt(&self.created_at)?,
      updated_at:                 decode_dt(&self.updated_at)?,
    })
  }
}

pub const SOLUTION_COLUMNS: &str =
  "id, user_uid, entry_date, journal_entry_id, solution, created_at";

pub struct RawSolution {
  pub id:               i64,
  pub user_uid:         String,
  pub entry_date:       String,
  pub journal_entry_id: i64,
  pub solution:         String,
  pub created_at:       String,
}

impl RawSolution {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      user_uid:         row.get(1)?,
      entry_date:       row.get(2)?,
      journal_entry_id: row.get(3)?,
      solution:         row.get(4)?,
      created_at:       row.get(5)?,
    })
  }

  pub fn into_solution(self) -> Result<Solution> {
    Ok(Solution {
      id:               self.id,
      user_uid:         self.user_uid,
      entry_date:       decode_date(&self.entry_date)?,
      journal_entry_id: self.journal_entry_id,
      solution:         serde_json::from_str(&self.solution)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

pub const QUESTION_SET_COLUMNS: &str =
  "id, user_uid, entry_date, questions, created_at, updated_at";

pub struct RawQuestionSet {
  pub id:         i64,
  pub user_uid:   String,
  pub entry_date: String,
  pub questions:  String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawQuestionSet {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      user_uid:   row.get(1)?,
      entry_date: row.get(2)?,
      questions:  row.get(3)?,
      created_at: row.get(4)?,
      updated_at: row.get(5)?,
    })
  }

  pub fn into_question_set(self) -> Result<JournalQuestionSet> {
    Ok(JournalQuestionSet {
      id:         self.id,
      user_uid:   self.user_uid,
      entry_date: decode_date(&self.entry_date)?,
      questions:  decode_questions(&self.questions)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
