//! JSON REST API for the 1% Club backend.
//!
//! Exposes an axum [`Router`] backed by any [`club_core::store::ClubStore`],
//! plus the control routes for the crew scheduler and the solution queue.
//! No authentication is applied here.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", club_api::api_router(store.clone(), scheduler, queue))
//! ```

pub mod control;
pub mod crew_responses;
pub mod error;
pub mod journal;
pub mod questions;
pub mod solutions;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use club_core::store::ClubStore;
use club_worker::{CrewScheduler, CrewService, SolutionQueue, SolutionService};

pub use control::Control;
pub use error::ApiError;

/// Build a fully-materialised API router.
///
/// Data routes share the store; control routes share the worker handles.
/// Both are merged into one stateless `Router`.
pub fn api_router<S, C, B>(
  store: Arc<S>,
  scheduler: CrewScheduler<S, C>,
  queue: SolutionQueue<S, B>,
) -> Router<()>
where
  S: ClubStore + 'static,
  C: CrewService + 'static,
  B: SolutionService + 'static,
{
  let data = Router::new()
    // Users
    .route("/users/save", post(users::save::<S>))
    .route("/users/{uid}", get(users::get_one::<S>))
    // Journal
    .route("/journal", get(journal::list::<S>).post(journal::upsert::<S>))
    .route("/journal/dates", get(journal::dates::<S>))
    .route("/journal/{id}", delete(journal::delete_one::<S>))
    // Questions
    .route(
      "/journal-questions",
      get(questions::get::<S>)
        .put(questions::read_only)
        .post(questions::read_only),
    )
    .route("/journal-questions/default", get(questions::default_template::<S>))
    // Derived data
    .route("/solutions", get(solutions::list::<S>))
    .route(
      "/solutions/{id}",
      get(solutions::get_one::<S>).delete(solutions::delete_one::<S>),
    )
    .route(
      "/crew-responses",
      get(crew_responses::list::<S>).post(crew_responses::create::<S>),
    )
    .route(
      "/crew-responses/{id}",
      get(crew_responses::get_one::<S>).delete(crew_responses::delete_one::<S>),
    )
    .with_state(store);

  let control = Router::new()
    .route(
      "/scheduler",
      get(control::scheduler_status::<S, C, B>).post(control::scheduler_control::<S, C, B>),
    )
    .route("/both-crews/status", get(control::queue_status::<S, C, B>))
    .route("/both-crews/sweep", post(control::sweep::<S, C, B>))
    .with_state(Control { scheduler, queue });

  data.merge(control)
}

// ─── Integration tests ────────────────────────────────────────────────────────
