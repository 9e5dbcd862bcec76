//! Handlers for `/journal` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/journal` | Body: `{"userUid", "entryDate", "content"}` |
//! | `GET`  | `/journal` | `?userUid` required; `entryDate` for one entry, else `startDate`/`endDate`/`limit` |
//! | `GET`  | `/journal/dates` | `?userUid&year&month` |
//! | `DELETE` | `/journal/{id}` | Removes the entry and its solutions; 204, or 404 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::NaiveDate;
use club_core::{
  journal::{JournalEntry, JournalQuery, NewJournalEntry},
  store::ClubStore,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

fn require_uid(uid: Option<String>) -> Result<String, ApiError> {
  uid
    .filter(|u| !u.trim().is_empty())
    .ok_or_else(|| ApiError::BadRequest("userUid is required".into()))
}

// ─── Upsert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertBody {
  pub user_uid:   String,
  pub entry_date: NaiveDate,
  pub content:    String,
}

/// `POST /journal`: create or replace the entry for the user and date.
pub async fn upsert<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<UpsertBody>,
) -> Result<Json<JournalEntry>, ApiError>
where
  S: ClubStore,
{
  let user_uid = require_uid(Some(body.user_uid))?;
  let input = NewJournalEntry::new(user_uid, body.entry_date, body.content)?;
  let entry = store
    .upsert_journal_entry(input)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entry))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub user_uid:   Option<String>,
  pub entry_date: Option<NaiveDate>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
}

/// Either the single entry asked for by date, or a list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum JournalResponse {
  One(Option<JournalEntry>),
  Many(Vec<JournalEntry>),
}

/// `GET /journal?userUid=…[&entryDate=…|&startDate=…&endDate=…&limit=…]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<JournalResponse>, ApiError>
where
  S: ClubStore,
{
  let user_uid = require_uid(params.user_uid)?;

  if let Some(date) = params.entry_date {
    let entry = store
      .get_journal_entry(user_uid, date)
      .await
      .map_err(ApiError::store)?;
    return Ok(Json(JournalResponse::One(entry)));
  }

  let entries = store
    .list_journal_entries(JournalQuery {
      user_uid,
      start_date: params.start_date,
      end_date: params.end_date,
      limit: params.limit,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(JournalResponse::Many(entries)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesParams {
  pub user_uid: Option<String>,
  pub year:     i32,
  pub month:    u32,
}

/// `GET /journal/dates?userUid=…&year=…&month=…`
pub async fn dates<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<DatesParams>,
) -> Result<Json<Vec<NaiveDate>>, ApiError>
where
  S: ClubStore,
{
  let user_uid = require_uid(params.user_uid)?;
  if !(1..=12).contains(&params.month) {
    return Err(ApiError::BadRequest(format!("invalid month: {}", params.month)));
  }

  let dates = store
    .journal_entry_dates(user_uid, params.year, params.month)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(dates))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /journal/{id}`
///
/// A job the solution queue still holds for the entry fails on its next
/// attempt and is dropped once its retries run out.
pub async fn delete_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: ClubStore,
{
  if !store.delete_journal_entry(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound(format!("journal entry {id} not found")));
  }
  tracing::info!(id, "deleted journal entry");
  Ok(StatusCode::NO_CONTENT)
}
