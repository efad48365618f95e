//! Backlog use-case services.
//!
//! # Responsibility
//! - Compose collaborator contracts into backlog query and positioning
//!   use-cases.
//! - Keep callers decoupled from storage details.

pub mod backlog_service;
pub mod story_service;

use crate::model::story::{ProjectId, SprintId};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::story_repo::{RepoError, StoryFilter};
use crate::settings::{SettingsError, TypeConfiguration};
use std::collections::BTreeSet;

/// Builds the group filter: project closure x story types x buckets.
///
/// An empty story type configuration produces a filter that matches nothing.
pub(crate) fn story_group<P, C, E>(
    projects: &P,
    types: &C,
    project_id: ProjectId,
    sprint_ids: BTreeSet<Option<SprintId>>,
) -> Result<StoryFilter, E>
where
    P: ProjectRepository,
    C: TypeConfiguration,
    E: From<RepoError> + From<SettingsError>,
{
    let project_ids = projects.closure(project_id)?;
    let type_ids = types.story_types()?;
    Ok(StoryFilter::new(project_ids, type_ids, sprint_ids))
}
