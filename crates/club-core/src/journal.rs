//! Journal entries, one free-text entry per user per calendar day.
//!
//! The user-facing API writes `content`; the two processing flags belong to
//! the background queue and are never touched by an entry upsert.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A persisted journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
  pub id:                         i64,
  pub user_uid:                   String,
  /// Calendar date the entry is about, not a timestamp.
  pub entry_date:                 NaiveDate,
  pub content:                    String,
  /// Cached word count; recomputed on every upsert.
  pub word_count:                 u32,
  pub is_queued:                  bool,
  pub is_processed_for_solutions: bool,
  /// When the entry was last marked queued. `None` while unqueued.
  pub queued_at:                  Option<DateTime<Utc>>,
  pub created_at:                 DateTime<Utc>,
  pub updated_at:                 DateTime<Utc>,
}

impl JournalEntry {
  /// An entry may be picked up by a discovery sweep until it has a solution.
  pub fn is_sweep_eligible(&self) -> bool { !self.is_processed_for_solutions }
}

/// Input for creating or replacing the entry for `(user_uid, entry_date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJournalEntry {
  pub user_uid:   String,
  pub entry_date: NaiveDate,
  pub content:    String,
}

impl NewJournalEntry {
  /// Build an entry, rejecting content that is empty after trimming.
  pub fn new(
    user_uid: impl Into<String>,
    entry_date: NaiveDate,
    content: impl Into<String>,
  ) -> Result<Self> {
    let content = content.into();
    if content.trim().is_empty() {
      return Err(Error::EmptyContent);
    }
    Ok(Self { user_uid: user_uid.into(), entry_date, content })
  }

  pub fn word_count(&self) -> u32 { word_count(&self.content) }
}

/// Count whitespace-separated words.
pub fn word_count(content: &str) -> u32 {
  content.split_whitespace().count() as u32
}

/// Parameters for [`ClubStore::list_journal_entries`](crate::store::ClubStore::list_journal_entries).
#[derive(Debug, Clone, Default)]
pub struct JournalQuery {
  pub user_uid:   String,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
}
