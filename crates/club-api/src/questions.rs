//! Handlers for `/journal-questions` endpoints.
//!
//! Question sets are written only by the crew question sync. Users read them.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/journal-questions` | `?userUid&entryDate`; falls back to the default template |
//! | `GET`  | `/journal-questions/default` | The default template |
//! | `PUT`/`POST` | `/journal-questions` | Always 403 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use club_core::{question::Question, store::ClubStore};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetParams {
  pub user_uid:   Option<String>,
  pub entry_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsResponse {
  pub questions:  Vec<Question>,
  pub is_default: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub user_uid:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub entry_date: Option<NaiveDate>,
}

/// `GET /journal-questions?userUid=…&entryDate=…`
///
/// When the user has no set for the date the default template is returned
/// without being written.
pub async fn get<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<GetParams>,
) -> Result<Json<QuestionsResponse>, ApiError>
where
  S: ClubStore,
{
  let user_uid = params
    .user_uid
    .filter(|u| !u.trim().is_empty())
    .ok_or_else(|| ApiError::BadRequest("userUid is required".into()))?;
  let entry_date = params
    .entry_date
    .ok_or_else(|| ApiError::BadRequest("entryDate is required".into()))?;

  let stored = store
    .get_question_set(user_uid.clone(), entry_date)
    .await
    .map_err(ApiError::store)?;

  let (questions, is_default) = match stored {
    Some(set) => (set.questions, false),
    None => (store.default_questions().await.map_err(ApiError::store)?, true),
  };

  Ok(Json(QuestionsResponse {
    questions,
    is_default,
    user_uid: Some(user_uid),
    entry_date: Some(entry_date),
  }))
}

/// `GET /journal-questions/default`
pub async fn default_template<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<QuestionsResponse>, ApiError>
where
  S: ClubStore,
{
  let questions = store.default_questions().await.map_err(ApiError::store)?;
  Ok(Json(QuestionsResponse {
    questions,
    is_default: true,
    user_uid: None,
    entry_date: None,
  }))
}

/// `PUT`/`POST /journal-questions`
pub async fn read_only() -> ApiError {
  ApiError::Forbidden("journal questions are read-only".into())
}
