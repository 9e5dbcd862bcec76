//! The user account whose business context drives crew recommendations.
//!
//! Users are created at signup and edited from the profile screen. The
//! background processing core only ever reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The growth strategy a user has picked for their business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
  #[serde(rename = "Sustainable growth")]
  SustainableGrowth,
  #[serde(rename = "Rapid growth")]
  RapidGrowth,
}

impl Goal {
  /// The label stored in the database and sent to the crew service.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::SustainableGrowth => "Sustainable growth",
      Self::RapidGrowth => "Rapid growth",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "Sustainable growth" => Ok(Self::SustainableGrowth),
      "Rapid growth" => Ok(Self::RapidGrowth),
      other => Err(Error::UnknownGoal(other.to_owned())),
    }
  }
}

/// What the user signed up to improve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseCase {
  #[serde(rename = "Personal Growth")]
  PersonalGrowth,
  #[serde(rename = "Professional Growth")]
  ProfessionalGrowth,
  #[serde(rename = "Own Business Growth")]
  OwnBusinessGrowth,
}

impl UseCase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::PersonalGrowth => "Personal Growth",
      Self::ProfessionalGrowth => "Professional Growth",
      Self::OwnBusinessGrowth => "Own Business Growth",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "Personal Growth" => Ok(Self::PersonalGrowth),
      "Professional Growth" => Ok(Self::ProfessionalGrowth),
      "Own Business Growth" => Ok(Self::OwnBusinessGrowth),
      other => Err(Error::UnknownUseCase(other.to_owned())),
    }
  }
}

/// A persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  /// Identity-provider UID; the primary key everywhere else.
  pub uid:            String,
  pub email:          Option<String>,
  pub display_name:   Option<String>,
  pub first_name:     Option<String>,
  pub last_name:      Option<String>,
  #[serde(rename = "photoURL")]
  pub photo_url:      Option<String>,
  pub email_verified: bool,
  pub use_case:       Option<UseCase>,
  pub goal:           Option<Goal>,
  /// Free-text description of the user's business.
  pub context:        Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

impl User {
  /// The business context, with blank strings treated as absent.
  pub fn context_text(&self) -> Option<&str> {
    self.context.as_deref().map(str::trim).filter(|c| !c.is_empty())
  }

  /// Whether the user has given the crew service anything to work with.
  pub fn has_crew_inputs(&self) -> bool {
    self.context_text().is_some() || self.goal.is_some()
  }
}

/// Profile data submitted on signup or profile edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub uid:            String,
  pub email:          Option<String>,
  pub display_name:   Option<String>,
  pub first_name:     Option<String>,
  pub last_name:      Option<String>,
  #[serde(rename = "photoURL")]
  pub photo_url:      Option<String>,
  #[serde(default)]
  pub email_verified: bool,
  pub use_case:       Option<UseCase>,
  pub goal:           Option<Goal>,
  pub context:        Option<String>,
}

impl UserProfile {
  pub fn new(uid: impl Into<String>) -> Self {
    Self { uid: uid.into(), ..Self::default() }
  }
}
