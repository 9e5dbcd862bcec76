//! The background processing core of the 1% Club backend.
//!
//! Two independent subsystems share a store handle:
//!
//! - [`CrewScheduler`] periodically asks the crew service for a fresh
//!   recommendation for every user and upserts one row per user per day.
//! - [`SolutionQueue`] feeds unprocessed journal entries to the both-crews
//!   service one at a time, retrying failures at the back of the queue.

pub mod client;
pub mod error;
pub mod question_sync;
pub mod queue;
pub mod scheduler;

#[cfg(test)]
mod hooked_store;

pub use client::{CrewService, HttpCrewService, HttpSolutionService, SolutionService};
pub use error::{Error, Result};
pub use queue::{QueueStatus, SolutionQueue, SweepReport};
pub use scheduler::{CrewScheduler, PassReport, SchedulerStatus};
