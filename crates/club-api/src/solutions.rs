//! Handlers for `/solutions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/solutions` | Optional `userUid`, `entryDate`, `startDate`, `endDate`, `limit`, `offset` |
//! | `GET`  | `/solutions/{id}` | 404 if not found |
//! | `DELETE` | `/solutions/{id}` | 204, or 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use chrono::NaiveDate;
use club_core::{
  solution::{Solution, SolutionQuery},
  store::ClubStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub user_uid:   Option<String>,
  pub entry_date: Option<NaiveDate>,
  pub start_date: Option<NaiveDate>,
  pub end_date:   Option<NaiveDate>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /solutions`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Solution>>, ApiError>
where
  S: ClubStore,
{
  let solutions = store
    .list_solutions(SolutionQuery {
      user_uid:   params.user_uid,
      entry_date: params.entry_date,
      start_date: params.start_date,
      end_date:   params.end_date,
      limit:      params.limit,
      offset:     params.offset,
    })
    .await
    .map_err(ApiError::store)?;
  Ok(Json(solutions))
}

/// `GET /solutions/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Solution>, ApiError>
where
  S: ClubStore,
{
  let solution = store
    .get_solution(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("solution {id} not found")))?;
  Ok(Json(solution))
}

/// `DELETE /solutions/{id}`. The journal entry keeps its processed flag.
pub async fn delete_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<StatusCode, ApiError>
where
  S: ClubStore,
{
  if !store.delete_solution(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound(format!("solution {id} not found")));
  }
  tracing::info!(id, "deleted solution");
  Ok(StatusCode::NO_CONTENT)
}
