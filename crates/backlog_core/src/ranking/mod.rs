//! Ranking engine: natural order, rank projection and move planning.
//!
//! # Responsibility
//! - Define the single comparison order over stories of one bucket.
//! - Derive dense per-bucket ranks at read time.
//! - Plan position writes for "move after" requests.
//!
//! # Invariants
//! - Everything here is pure; persistence lives in `repo`.
//! - Ranks are never cached across mutations.

pub mod order;
pub mod positioner;
pub mod projector;
