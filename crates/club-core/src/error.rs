//! Error types for `club-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown goal: {0:?}")]
  UnknownGoal(String),

  #[error("unknown use case: {0:?}")]
  UnknownUseCase(String),

  #[error("journal entry content cannot be empty")]
  EmptyContent,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
