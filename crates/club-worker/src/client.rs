//! HTTP clients for the two downstream AI services.
//!
//! The scheduler and the queue are generic over [`CrewService`] and
//! [`SolutionService`]; the `Http*` types are the production implementations.

use std::{
  future::Future,
  sync::{PoisonError, RwLock},
  time::Duration,
};

use club_core::user::User;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::{Error, Result};

/// Hard bound on a single crew-service call.
pub const CREW_TIMEOUT: Duration = Duration::from_secs(60);

/// Hard bound on a single both-crews call. Solutions can take minutes.
pub const SOLUTION_TIMEOUT: Duration = Duration::from_secs(600);

// ─── Wire bodies ─────────────────────────────────────────────────────────────

/// Body posted to the crew service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrewRequest {
  pub customer_business_background_latest: Option<String>,
  pub customer_goal_latest:                Option<String>,
}

impl CrewRequest {
  /// Blank strings are sent as `null`.
  pub fn new(context: Option<&str>, goal: Option<&str>) -> Self {
    let non_blank = |s: Option<&str>| {
      s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
    };
    Self {
      customer_business_background_latest: non_blank(context),
      customer_goal_latest:                non_blank(goal),
    }
  }

  pub fn for_user(user: &User) -> Self {
    Self::new(user.context_text(), user.goal.map(|g| g.as_str()))
  }
}

/// Body posted to the both-crews service: the raw journal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SolutionRequest {
  pub qna_pairs: String,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Generates a daily recommendation from a user's business context and goal.
pub trait CrewService: Send + Sync {
  fn generate(
    &self,
    request: CrewRequest,
  ) -> impl Future<Output = Result<Value>> + Send + '_;

  fn endpoint(&self) -> String;

  /// Point subsequent calls at a different URL.
  fn set_endpoint(&self, url: String);
}

/// Derives a solution from a journal entry's text.
pub trait SolutionService: Send + Sync {
  fn solve(
    &self,
    request: SolutionRequest,
  ) -> impl Future<Output = Result<Value>> + Send + '_;

  fn endpoint(&self) -> String;

  fn set_endpoint(&self, url: String);
}

// ─── HTTP implementations ────────────────────────────────────────────────────

/// A JSON-over-HTTP endpoint whose URL can be swapped at runtime.
struct Endpoint {
  client: Client,
  url:    RwLock<String>,
}

impl Endpoint {
  fn new(url: String, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, url: RwLock::new(url) })
  }

  fn url(&self) -> String {
    self.url.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn set_url(&self, url: String) {
    *self.url.write().unwrap_or_else(PoisonError::into_inner) = url;
  }

  async fn post<B: Serialize>(&self, body: &B) -> Result<Value> {
    let url = self.url();
    let resp = self.client.post(&url).json(body).send().await?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      error!(%url, status = status.as_u16(), %body, "service request failed");
      return Err(Error::Status { status: status.as_u16(), body });
    }
    Ok(resp.json().await?)
  }
}

/// [`CrewService`] backed by a `reqwest` client with a 60 s timeout.
pub struct HttpCrewService {
  endpoint: Endpoint,
}

impl HttpCrewService {
  pub fn new(url: impl Into<String>) -> Result<Self> {
    Self::with_timeout(url, CREW_TIMEOUT)
  }

  pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    Ok(Self { endpoint: Endpoint::new(url.into(), timeout)? })
  }
}

impl CrewService for HttpCrewService {
  async fn generate(&self, request: CrewRequest) -> Result<Value> {
    self.endpoint.post(&request).await
  }

  fn endpoint(&self) -> String { self.endpoint.url() }

  fn set_endpoint(&self, url: String) { self.endpoint.set_url(url) }
}

/// [`SolutionService`] backed by a `reqwest` client with a 10 minute timeout.
pub struct HttpSolutionService {
  endpoint: Endpoint,
}

impl HttpSolutionService {
  pub fn new(url: impl Into<String>) -> Result<Self> {
    Self::with_timeout(url, SOLUTION_TIMEOUT)
  }

  pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
    Ok(Self { endpoint: Endpoint::new(url.into(), timeout)? })
  }
}

impl SolutionService for HttpSolutionService {
  async fn solve(&self, request: SolutionRequest) -> Result<Value> {
    self.endpoint.post(&request).await
  }

  fn endpoint(&self) -> String { self.endpoint.url() }

  fn set_endpoint(&self, url: String) { self.endpoint.set_url(url) }
}
