//! Access Control Engine: per-object principal sets and the data keys they guard.
//!
//! # Invariants
//!
//! - A principal obtains an object's data key only through [`AccessEngine::authorize`].
//! - Denial reveals nothing about the record beyond its existence.
//! - Every successful add/remove moves the record version by exactly one.

pub mod engine;
pub mod record;

pub use engine::{AccessEngine, AccessError};
