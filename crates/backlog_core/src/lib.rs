//! Sprint backlog ranking engine.
//! This crate is the single source of truth for story ordering invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod ranking;
pub mod repo;
pub mod service;
pub mod settings;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::journal::{FieldChange, JournalAction, JournalEntry};
pub use model::story::{
    parse_points, Actor, NewStory, PointsChange, PointsParseError, ProjectId, SprintId, StatusId,
    Story, StoryId, StoryValidationError, TypeId, UserId,
};
pub use ranking::order::{sort_naturally, OrderKey};
pub use ranking::positioner::{plan_move, MovePlan, Placement, PositionUpdate, POSITION_GAP};
pub use ranking::projector::{project_ranks, Backlogs, RankedStory};
pub use repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
pub use repo::journal_repo::{JournalRepository, SqliteJournalRepository};
pub use repo::project_repo::{Project, ProjectRepository, SqliteProjectRepository};
pub use repo::story_repo::{
    ExtraPredicate, RepoError, RepoResult, SqliteStoryRepository, StoryFilter, StoryOrder,
    StoryRepository,
};
pub use service::backlog_service::{BacklogOptions, BacklogService, BacklogServiceError};
pub use service::story_service::{
    BacklogPlacement, StatusChange, StoryParams, StoryService, StoryServiceError,
    TaskStatusSummary,
};
pub use settings::{BacklogSettings, SettingsError, SqliteSettingsStore, TypeConfiguration};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
