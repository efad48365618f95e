//! Story mutation and task aggregation use-cases.
//!
//! # Responsibility
//! - Create, update and move stories, applying placement after the save.
//! - Normalize story point input.
//! - Navigate and summarize tasks hanging under a story.
//! - Journal every persisted mutation, including sibling positions
//!   rewritten by a renumbering move.
//!
//! # Invariants
//! - Validation failures abort before anything is written; no positioning
//!   happens for a story that failed to save.
//! - The move group is the hierarchy closure of the backlog project.
//! - Placement targets outside the group are ignored.
//! - Positioning always works on the reloaded, post-save story.

use crate::model::journal::{diff_stories, FieldChange, JournalAction, JournalEntry};
use crate::model::story::{
    parse_points, Actor, NewStory, PointsChange, PointsParseError, ProjectId, SprintId, StatusId,
    Story, StoryId, StoryValidationError, TypeId,
};
use crate::ranking::positioner::{MovePlan, Placement};
use crate::repo::journal_repo::JournalRepository;
use crate::repo::project_repo::ProjectRepository;
use crate::repo::story_repo::{RepoError, StoryFilter, StoryRepository};
use crate::service::story_group;
use crate::settings::{SettingsError, TypeConfiguration};
use log::{debug, info};
use serde::Serialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from story mutation and task operations.
#[derive(Debug)]
pub enum StoryServiceError {
    Validation(StoryValidationError),
    StoryNotFound(StoryId),
    ProjectNotFound(ProjectId),
    InvalidPoints(PointsParseError),
    Settings(SettingsError),
    Repo(RepoError),
}

impl Display for StoryServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::StoryNotFound(id) => write!(f, "story not found: {id}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::InvalidPoints(err) => write!(f, "{err}"),
            Self::Settings(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoryServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::InvalidPoints(err) => Some(err),
            Self::Settings(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoryValidationError> for StoryServiceError {
    fn from(value: StoryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for StoryServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(id) => Self::StoryNotFound(id),
            RepoError::ProjectNotFound(id) => Self::ProjectNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<SettingsError> for StoryServiceError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}

impl From<PointsParseError> for StoryServiceError {
    fn from(value: PointsParseError) -> Self {
        Self::InvalidPoints(value)
    }
}

/// Status edit carried by [`StoryParams`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusChange {
    #[default]
    Keep,
    Clear,
    Set(StatusId),
}

/// Partial story update. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryParams {
    pub subject: Option<String>,
    pub project_id: Option<ProjectId>,
    pub sprint_id: Option<Option<SprintId>>,
    pub type_id: Option<TypeId>,
    pub status: StatusChange,
    pub parent_id: Option<Option<StoryId>>,
    pub story_points: Option<Option<u32>>,
}

impl StoryParams {
    fn apply_to(&self, story: &mut Story) {
        if let Some(subject) = &self.subject {
            story.subject = subject.trim().to_string();
        }
        if let Some(project_id) = self.project_id {
            story.project_id = project_id;
        }
        if let Some(sprint_id) = self.sprint_id {
            story.sprint_id = sprint_id;
        }
        if let Some(type_id) = self.type_id {
            story.type_id = type_id;
        }
        match self.status {
            StatusChange::Keep => {}
            StatusChange::Clear => story.status_id = None,
            StatusChange::Set(status_id) => story.status_id = Some(status_id),
        }
        if let Some(parent_id) = self.parent_id {
            story.parent_id = parent_id;
        }
        if let Some(story_points) = self.story_points {
            story.story_points = story_points;
        }
    }
}

/// Placement inside the backlog of one project hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogPlacement {
    /// Backlog project; its hierarchy closure forms the move group.
    pub project_id: ProjectId,
    pub placement: Placement,
}

impl BacklogPlacement {
    pub fn new(project_id: ProjectId, placement: Placement) -> Self {
        Self {
            project_id,
            placement,
        }
    }

    pub fn first(project_id: ProjectId) -> Self {
        Self::new(project_id, Placement::First)
    }

    pub fn after(project_id: ProjectId, story_id: StoryId) -> Self {
        Self::new(project_id, Placement::After(story_id))
    }
}

/// Open/closed split of a story's direct tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatusSummary {
    pub open: u32,
    pub closed: u32,
}

impl TaskStatusSummary {
    pub fn total(&self) -> u32 {
        self.open + self.closed
    }
}

/// Story use-case service.
pub struct StoryService<S, P, C, J>
where
    S: StoryRepository,
    P: ProjectRepository,
    C: TypeConfiguration,
    J: JournalRepository,
{
    stories: S,
    projects: P,
    types: C,
    journal: J,
}

impl<S, P, C, J> StoryService<S, P, C, J>
where
    S: StoryRepository,
    P: ProjectRepository,
    C: TypeConfiguration,
    J: JournalRepository,
{
    pub fn new(stories: S, projects: P, types: C, journal: J) -> Self {
        Self {
            stories,
            projects,
            types,
            journal,
        }
    }

    /// Creates a story, then places it when `placement` is given.
    ///
    /// Without a placement the story stays unpositioned and ranks after
    /// every positioned story of its bucket. The placement group is
    /// resolved before the insert, so an unknown backlog project or a
    /// broken type configuration creates nothing. A storage failure while
    /// writing positions leaves the story created but unplaced.
    pub fn create_and_position(
        &self,
        actor: Actor,
        new_story: &NewStory,
        placement: Option<BacklogPlacement>,
    ) -> Result<Story, StoryServiceError> {
        new_story.validate()?;
        let group = placement
            .map(|target| self.placement_group(target, new_story.sprint_id))
            .transpose()?;

        let story = self.stories.create_story(new_story, Some(actor.user_id))?;
        self.journal.record(&JournalEntry::new(
            actor,
            story.id,
            JournalAction::Created,
            Vec::new(),
        ))?;
        info!(
            "event=story_create module=story status=ok story_id={} project_id={} sprint_id={:?}",
            story.id, story.project_id, story.sprint_id
        );

        match (placement, group) {
            (Some(target), Some(group)) => self
                .place(actor, story, &group, target.placement)
                .map(|(story, _)| story),
            _ => Ok(story),
        }
    }

    /// Applies `params`, saves, then places the reloaded story.
    ///
    /// The group is resolved for the post-update bucket before anything is
    /// written.
    pub fn update_and_position(
        &self,
        actor: Actor,
        story_id: StoryId,
        params: &StoryParams,
        placement: Option<BacklogPlacement>,
    ) -> Result<Story, StoryServiceError> {
        let current = self.require_story(story_id)?;
        let mut updated = current.clone();
        params.apply_to(&mut updated);
        updated.validate()?;
        let group = placement
            .map(|target| self.placement_group(target, updated.sprint_id))
            .transpose()?;

        self.stories.update_story(&updated)?;
        let changes = diff_stories(&current, &updated);
        if !changes.is_empty() {
            self.journal.record(&JournalEntry::new(
                actor,
                story_id,
                JournalAction::Updated,
                changes,
            ))?;
        }
        info!("event=story_update module=story status=ok story_id={story_id}");

        let reloaded = self.require_story(story_id)?;
        match (placement, group) {
            (Some(target), Some(group)) => self
                .place(actor, reloaded, &group, target.placement)
                .map(|(story, _)| story),
            _ => Ok(reloaded),
        }
    }

    /// Moves one story inside the backlog of `target.project_id`;
    /// `Placement::First` puts it at the top of its bucket.
    pub fn move_after(
        &self,
        actor: Actor,
        story_id: StoryId,
        target: BacklogPlacement,
    ) -> Result<MovePlan, StoryServiceError> {
        let story = self.require_story(story_id)?;
        let group = self.placement_group(target, story.sprint_id)?;
        self.place(actor, story, &group, target.placement)
            .map(|(_, plan)| plan)
    }

    /// Parses free-form point input and stores the result.
    ///
    /// Returns the points the story carries afterwards. Negative numbers
    /// leave the story untouched.
    pub fn set_points(
        &self,
        actor: Actor,
        story_id: StoryId,
        input: &str,
    ) -> Result<Option<u32>, StoryServiceError> {
        let story = self.require_story(story_id)?;
        let points = match parse_points(input)? {
            PointsChange::Clear => None,
            PointsChange::Set(points) => Some(points),
            PointsChange::Unchanged => {
                debug!("event=story_points module=story status=skipped story_id={story_id} reason=negative");
                return Ok(story.story_points);
            }
        };
        if points == story.story_points {
            return Ok(points);
        }

        self.stories.set_story_points(story_id, points)?;
        let updated = Story {
            story_points: points,
            ..story.clone()
        };
        self.journal.record(&JournalEntry::new(
            actor,
            story_id,
            JournalAction::PointsSet,
            diff_stories(&story, &updated),
        ))?;
        info!("event=story_points module=story status=ok story_id={story_id} points={points:?}");
        Ok(points)
    }

    /// Direct children of the configured task type.
    pub fn tasks(&self, story_id: StoryId) -> Result<Vec<Story>, StoryServiceError> {
        self.require_story(story_id)?;
        let Some(task_type) = self.types.task_type()? else {
            return Ok(Vec::new());
        };
        Ok(self.stories.list_children(story_id, Some(task_type))?)
    }

    /// Every descendant of the configured task type, at any depth.
    pub fn tasks_and_subtasks(&self, story_id: StoryId) -> Result<Vec<Story>, StoryServiceError> {
        self.require_story(story_id)?;
        let Some(task_type) = self.types.task_type()? else {
            return Ok(Vec::new());
        };
        Ok(self.stories.list_descendants(story_id, Some(task_type))?)
    }

    /// Direct tasks plus every descendant of those tasks, whatever its type.
    pub fn direct_tasks_and_subtasks(
        &self,
        story_id: StoryId,
    ) -> Result<Vec<Story>, StoryServiceError> {
        let tasks = self.tasks(story_id)?;
        let mut items = Vec::with_capacity(tasks.len());
        for task in tasks {
            let task_id = task.id;
            items.push(task);
            items.extend(self.stories.list_descendants(task_id, None)?);
        }
        Ok(items)
    }

    /// Counts open and closed direct tasks.
    pub fn task_status(&self, story_id: StoryId) -> Result<TaskStatusSummary, StoryServiceError> {
        self.require_story(story_id)?;
        let Some(task_type) = self.types.task_type()? else {
            return Ok(TaskStatusSummary::default());
        };
        let summary = self
            .stories
            .child_task_states(story_id, task_type)?
            .iter()
            .fold(TaskStatusSummary::default(), |mut summary, state| {
                if state.is_closed {
                    summary.closed += 1;
                } else {
                    summary.open += 1;
                }
                summary
            });
        Ok(summary)
    }

    fn require_story(&self, story_id: StoryId) -> Result<Story, StoryServiceError> {
        self.stories
            .get_story(story_id)?
            .ok_or(StoryServiceError::StoryNotFound(story_id))
    }

    fn placement_group(
        &self,
        target: BacklogPlacement,
        sprint_id: Option<SprintId>,
    ) -> Result<StoryFilter, StoryServiceError> {
        story_group(
            &self.projects,
            &self.types,
            target.project_id,
            BTreeSet::from([sprint_id]),
        )
    }

    fn place(
        &self,
        actor: Actor,
        story: Story,
        group: &StoryFilter,
        placement: Placement,
    ) -> Result<(Story, MovePlan), StoryServiceError> {
        if !group.project_ids.contains(&story.project_id) || !group.type_ids.contains(&story.type_id)
        {
            info!(
                "event=story_move module=positioner status=skipped story_id={} reason=outside_group",
                story.id
            );
            return Ok((story, MovePlan::Noop));
        }

        let plan = self.stories.reposition(story.id, group, placement)?;
        info!(
            "event=story_move module=positioner status=ok story_id={} placement={placement:?} strategy={} writes={}",
            story.id,
            plan.strategy(),
            plan.updates().len()
        );
        if matches!(plan, MovePlan::Noop) {
            return Ok((story, plan));
        }

        // Renumbering rewrites siblings too; each rewritten story gets its own entry.
        for update in plan.updates() {
            self.journal.record(&JournalEntry::new(
                actor,
                update.story_id,
                JournalAction::Moved,
                vec![FieldChange::position(update.previous, update.position)],
            ))?;
        }
        let moved = self.require_story(story.id)?;
        Ok((moved, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusChange, StoryParams, TaskStatusSummary};
    use crate::model::story::Story;

    fn story() -> Story {
        Story {
            id: 7,
            project_id: 1,
            sprint_id: Some(3),
            type_id: 2,
            status_id: Some(4),
            parent_id: None,
            author_id: None,
            subject: "Checkout".to_string(),
            story_points: Some(5),
            position: Some(1024),
        }
    }

    #[test]
    fn empty_params_leave_story_untouched() {
        let mut updated = story();
        StoryParams::default().apply_to(&mut updated);
        assert_eq!(updated, story());
    }

    #[test]
    fn params_distinguish_keep_from_clear() {
        let mut updated = story();
        StoryParams {
            subject: Some("  Payment  ".to_string()),
            sprint_id: Some(None),
            status: StatusChange::Clear,
            story_points: Some(Some(8)),
            ..StoryParams::default()
        }
        .apply_to(&mut updated);

        assert_eq!(updated.subject, "Payment");
        assert_eq!(updated.sprint_id, None);
        assert_eq!(updated.status_id, None);
        assert_eq!(updated.story_points, Some(8));
        assert_eq!(updated.position, Some(1024));
    }

    #[test]
    fn summary_total_adds_both_sides() {
        let summary = TaskStatusSummary { open: 2, closed: 3 };
        assert_eq!(summary.total(), 5);
    }
}
