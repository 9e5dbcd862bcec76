//! Handlers for `/users` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/users/save` | Body: profile JSON; `uid` and `email` required |
//! | `GET`  | `/users/{uid}` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use club_core::{
  store::ClubStore,
  user::{User, UserProfile},
};

use crate::error::ApiError;

/// `POST /users/save`
pub async fn save<S>(
  State(store): State<Arc<S>>,
  Json(profile): Json<UserProfile>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ClubStore,
{
  let has_email = profile.email.as_deref().is_some_and(|e| !e.trim().is_empty());
  if profile.uid.trim().is_empty() || !has_email {
    return Err(ApiError::BadRequest("uid and email are required".into()));
  }

  let user = store.save_user(profile).await.map_err(ApiError::store)?;
  tracing::info!(uid = %user.uid, "user saved");
  Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/{uid}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(uid): Path<String>,
) -> Result<Json<User>, ApiError>
where
  S: ClubStore,
{
  let user = store
    .get_user(uid.clone())
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("user {uid} not found")))?;
  Ok(Json(user))
}
