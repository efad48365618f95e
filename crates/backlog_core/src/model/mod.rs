//! Backlog domain model.
//!
//! # Responsibility
//! - Define the story record and its write-side invariants.
//! - Define journal records for mutations performed on stories.
//!
//! # Invariants
//! - Stories are identified by a store-assigned, monotonically increasing id.
//! - The core never deletes stories; it only updates them.

pub mod journal;
pub mod story;
