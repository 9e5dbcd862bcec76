//! Handlers for `/crew-responses` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/crew-responses` | Optional `userUid`, `startDate`, `endDate`, `limit` (default 100), `offset` |
//! | `POST` | `/crew-responses` | Manual write; body `{"userUid", "responseData", "requestContext"?, "requestGoal"?}` |
//! | `GET`  | `/crew-responses/{id}` | 404 if not found |
//! | `DELETE` | `/crew-responses/{id}` | 204, or 404 if not found |
//!
//! A manual write lands on today's row like a scheduler pass does: it
//! creates the row (201) or replaces it in place (200).

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::NaiveDate;
use club_core::{
  crew::{CrewResponse, CrewResponseQuery, NewCrewResponse},
  store::ClubStore,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub user_uid:   Option<String>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /crew-responses`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CrewResponse>>, ApiError>
where
  S: ClubStore,
{
  let responses = store
    .list_crew_responses(CrewResponseQuery {
      user_uid:   params.user_uid,
      start_date: params.start_date,
      end_date:   params.end_date,
      limit:      params.limit,
      offset:     params.offset,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(responses))
}

/// `GET /crew-responses/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<CrewResponse>, ApiError>
where
  S: ClubStore,
{
  let response = store
    .get_crew_response(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("crew response {id} not found")))?;
  Ok(Json(response))
}

/// `DELETE /crew-responses/{id}`
pub async fn delete_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: ClubStore,
{
  let deleted = store
    .delete_crew_response(id)
    .await
    .map_err(ApiError::store)?;
  if !deleted {
    return Err(ApiError::NotFound(format!("crew response {id} not found")));
  }
  tracing::info!(id, "deleted crew response");
  Ok(StatusCode::NO_CONTENT)
}

// ─── Manual write ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub user_uid:        Option<String>,
  pub request_context: Option<String>,
  pub request_goal:    Option<String>,
  pub response_data:   Option<Value>,
}

/// `POST /crew-responses`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<CrewResponse>), ApiError>
where
  S: ClubStore,
{
  let (Some(user_uid), Some(response_data)) = (
    body.user_uid.filter(|u| !u.trim().is_empty()),
    body.response_data,
  ) else {
    return Err(ApiError::BadRequest("userUid and responseData are required".into()));
  };

  if store
    .get_user(user_uid.clone())
    .await
    .map_err(ApiError::store)?
    .is_none()
  {
    return Err(ApiError::NotFound(format!("user {user_uid} not found")));
  }

  let saved = store
    .upsert_crew_response(NewCrewResponse {
      user_uid,
      request_context: body.request_context,
      request_goal: body.request_goal,
      response_data,
    })
    .await
    .map_err(ApiError::store)?;

  let status = if saved.was_updated() { StatusCode::OK } else { StatusCode::CREATED };
  Ok((status, Json(saved)))
}
