//! Crew responses: the daily recommendation produced for each user.
//!
//! At most one row exists per user per calendar day. A second fan-out pass on
//! the same day rewrites the payload in place and stamps `updated_at`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted crew response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewResponse {
  pub id:              i64,
  pub user_uid:        String,
  /// The context that was sent to the crew service.
  pub request_context: Option<String>,
  /// The goal label that was sent to the crew service.
  pub request_goal:    Option<String>,
  /// Opaque payload returned by the crew service.
  pub response_data:   Value,
  pub created_at:      DateTime<Utc>,
  /// Local calendar day of `created_at`; half of the uniqueness key.
  pub created_on:      NaiveDate,
  /// Set only when a later pass on the same day overwrote this row.
  pub updated_at:      Option<DateTime<Utc>>,
}

impl CrewResponse {
  pub fn was_updated(&self) -> bool { self.updated_at.is_some() }
}

/// Input for [`ClubStore::upsert_crew_response`](crate::store::ClubStore::upsert_crew_response).
#[derive(Debug, Clone)]
pub struct NewCrewResponse {
  pub user_uid:        String,
  pub request_context: Option<String>,
  pub request_goal:    Option<String>,
  pub response_data:   Value,
}

/// Parameters for [`ClubStore::list_crew_responses`](crate::store::ClubStore::list_crew_responses).
#[derive(Debug, Clone, Default)]
pub struct CrewResponseQuery {
  pub user_uid:   Option<String>,
  /// Inclusive bound on `created_on`.
  pub start_date: Option<NaiveDate>,
  /// Inclusive bound on `created_on`.
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}
