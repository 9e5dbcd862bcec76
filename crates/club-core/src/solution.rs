//! Solutions: the derived result of running a journal entry through the
//! both-crews service. Append-only.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
  pub id:               i64,
  pub user_uid:         String,
  pub entry_date:       NaiveDate,
  pub journal_entry_id: i64,
  pub solution:         Value,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSolution {
  pub user_uid:         String,
  pub entry_date:       NaiveDate,
  pub journal_entry_id: i64,
  pub solution:         Value,
}

/// Parameters for [`ClubStore::list_solutions`](crate::store::ClubStore::list_solutions).
#[derive(Debug, Clone, Default)]
pub struct SolutionQuery {
  pub user_uid:   Option<String>,
  pub entry_date: Option<NaiveDate>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}
