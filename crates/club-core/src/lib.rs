//! Core types and trait definitions for the 1% Club journaling backend.
//!
//! No HTTP or database code lives here; the store and server crates build on it.

pub mod crew;
pub mod error;
pub mod journal;
pub mod question;
pub mod solution;
pub mod store;
pub mod user;

pub use error::{Error, Result};
