//! Backlog query use-case service.
//!
//! # Responsibility
//! - Resolve a project's hierarchy and the configured story types into a
//!   group filter.
//! - Fetch candidates in natural order and project per-bucket ranks.
//! - Answer single-story rank and "story at rank" lookups.
//!
//! # Invariants
//! - Every requested bucket appears in the result, possibly empty; buckets
//!   that were not requested never do.
//! - Empty story type configuration yields empty buckets, not an error.
//! - Batch ranks and `rank_of` agree on the same snapshot.

use crate::model::story::{ProjectId, SprintId, Story, StoryId};
use crate::ranking::projector::{project_ranks_for, Backlogs, RankBound, RankedStory};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::story_repo::{ExtraPredicate, RepoError, StoryOrder, StoryRepository};
use crate::service::story_group;
use crate::settings::{SettingsError, TypeConfiguration};
use log::{info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from backlog query operations.
#[derive(Debug)]
pub enum BacklogServiceError {
    ProjectNotFound(ProjectId),
    StoryNotFound(StoryId),
    Settings(SettingsError),
    Repo(RepoError),
}

impl Display for BacklogServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::StoryNotFound(id) => write!(f, "story not found: {id}"),
            Self::Settings(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BacklogServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Settings(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BacklogServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            RepoError::NotFound(id) => Self::StoryNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<SettingsError> for BacklogServiceError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

/// Optional knobs for [`BacklogService::backlogs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogOptions {
    /// Predicates added on top of the group filter.
    pub extra: Vec<ExtraPredicate>,
    /// Order override. Ranks follow whatever order is used.
    pub order: StoryOrder,
}

/// Backlog query service facade.
pub struct BacklogService<S, P, C>
where
    S: StoryRepository,
    P: ProjectRepository,
    C: TypeConfiguration,
{
    stories: S,
    projects: P,
    types: C,
}

impl<S, P, C> BacklogService<S, P, C>
where
    S: StoryRepository,
    P: ProjectRepository,
    C: TypeConfiguration,
{
    pub fn new(stories: S, projects: P, types: C) -> Self {
        Self {
            stories,
            projects,
            types,
        }
    }

    /// Lists ranked stories per requested bucket.
    ///
    /// # Contract
    /// - Scope is the project plus all descendant projects.
    /// - Ranks are dense and restart at 1 in every bucket.
    pub fn backlogs(
        &self,
        project_id: ProjectId,
        sprint_ids: &[Option<SprintId>],
        options: &BacklogOptions,
    ) -> Result<Backlogs, BacklogServiceError> {
        let started_at = Instant::now();
        let buckets: BTreeSet<Option<SprintId>> = sprint_ids.iter().copied().collect();

        let filter = options.extra.iter().cloned().fold(
            story_group::<_, _, BacklogServiceError>(
                &self.projects,
                &self.types,
                project_id,
                buckets.clone(),
            )?,
            |filter, predicate| filter.with_extra(predicate),
        );
        if filter.type_ids.is_empty() {
            warn!(
                "event=backlog_query module=backlog status=empty reason=no_story_types project_id={project_id}"
            );
        }

        let stories = self.stories.query_stories(&filter, options.order)?;
        let story_count = stories.len();
        let backlogs = project_ranks_for(buckets, stories);

        info!(
            "event=backlog_query module=backlog status=ok project_id={project_id} buckets={} stories={story_count} duration_ms={}",
            backlogs.len(),
            started_at.elapsed().as_millis()
        );
        Ok(backlogs)
    }

    /// Lists the ranked stories of one bucket.
    pub fn sprint_backlog(
        &self,
        project_id: ProjectId,
        sprint_id: Option<SprintId>,
    ) -> Result<Vec<RankedStory>, BacklogServiceError> {
        let mut backlogs = self.backlogs(project_id, &[sprint_id], &BacklogOptions::default())?;
        Ok(backlogs.remove(&sprint_id).unwrap_or_default())
    }

    /// Loads the story at 1-based `rank` in one bucket.
    ///
    /// Returns `None` for rank `0` or a rank past the end of the bucket.
    pub fn at_rank(
        &self,
        project_id: ProjectId,
        sprint_id: Option<SprintId>,
        rank: u32,
    ) -> Result<Option<Story>, BacklogServiceError> {
        let Some(offset) = rank.checked_sub(1) else {
            return Ok(None);
        };
        let filter = story_group::<_, _, BacklogServiceError>(
            &self.projects,
            &self.types,
            project_id,
            BTreeSet::from([sprint_id]),
        )?;
        self.stories
            .nth_story(&filter, StoryOrder::Natural, offset)
            .map_err(Into::into)
    }

    /// Computes one story's rank in the backlog of `project_id` by counting
    /// the stories ranked at or before it.
    ///
    /// Returns `None` when the story is not part of that backlog: its
    /// project lies outside the hierarchy or its type is not a ranked story
    /// type.
    pub fn rank_of(
        &self,
        project_id: ProjectId,
        story_id: StoryId,
    ) -> Result<Option<u32>, BacklogServiceError> {
        let story = self
            .stories
            .get_story(story_id)?
            .ok_or(BacklogServiceError::StoryNotFound(story_id))?;

        let filter = story_group::<_, _, BacklogServiceError>(
            &self.projects,
            &self.types,
            project_id,
            BTreeSet::from([story.sprint_id]),
        )?;
        if !filter.project_ids.contains(&story.project_id)
            || !filter.type_ids.contains(&story.type_id)
        {
            return Ok(None);
        }

        let rank = self
            .stories
            .count_stories(&filter.with_rank_bound(RankBound::of(&story)))?;
        Ok(Some(rank))
    }
}
