//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the collaborator contracts the ranking core calls into.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Story writes enforce `Story::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `ProjectNotFound`)
//!   in addition to DB transport errors.

pub mod catalog_repo;
pub mod journal_repo;
pub mod project_repo;
pub mod story_repo;
