//! Story domain model.
//!
//! # Responsibility
//! - Define the backlog item record ranked inside a sprint bucket.
//! - Validate write-side invariants before persistence.
//! - Interpret free-form story point input.
//!
//! # Invariants
//! - `id` is assigned by the store, monotonically, and never reused.
//! - `position`, when present, is non-negative. Uniqueness is not enforced.
//! - `sprint_id = None` places the story in the shared unscheduled bucket.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned story identifier.
pub type StoryId = i64;
/// Project identifier.
pub type ProjectId = i64;
/// Sprint (bucket) identifier.
pub type SprintId = i64;
/// Work item type identifier.
pub type TypeId = i64;
/// Work item status identifier.
pub type StatusId = i64;
/// User identifier used for authorship and journaling.
pub type UserId = i64;

/// Persisted backlog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub project_id: ProjectId,
    /// Owning bucket. `None` means unscheduled.
    pub sprint_id: Option<SprintId>,
    pub type_id: TypeId,
    pub status_id: Option<StatusId>,
    /// Parent story for tasks and sub-tasks.
    pub parent_id: Option<StoryId>,
    pub author_id: Option<UserId>,
    pub subject: String,
    pub story_points: Option<u32>,
    /// Primary ordering key. `None` sorts after every positioned story.
    pub position: Option<i64>,
}

impl Story {
    /// Validates write-side invariants.
    pub fn validate(&self) -> Result<(), StoryValidationError> {
        validate_subject(&self.subject)?;
        if let Some(position) = self.position {
            if position < 0 {
                return Err(StoryValidationError::NegativePosition(position));
            }
        }
        if self.parent_id == Some(self.id) {
            return Err(StoryValidationError::ParentIsSelf(self.id));
        }
        Ok(())
    }

    /// Returns whether the story carries an explicit position.
    pub fn is_positioned(&self) -> bool {
        self.position.is_some()
    }
}

/// Creation payload for a story that has no identifier yet.
///
/// New stories are always persisted without a position; placement happens
/// afterwards through the positioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStory {
    pub project_id: ProjectId,
    pub sprint_id: Option<SprintId>,
    pub type_id: TypeId,
    pub status_id: Option<StatusId>,
    pub parent_id: Option<StoryId>,
    pub subject: String,
    pub story_points: Option<u32>,
}

impl NewStory {
    /// Creates an unscheduled story payload with optional fields unset.
    pub fn new(project_id: ProjectId, type_id: TypeId, subject: impl Into<String>) -> Self {
        Self {
            project_id,
            sprint_id: None,
            type_id,
            status_id: None,
            parent_id: None,
            subject: subject.into(),
            story_points: None,
        }
    }

    /// Places the payload into a sprint bucket.
    pub fn in_sprint(mut self, sprint_id: SprintId) -> Self {
        self.sprint_id = Some(sprint_id);
        self
    }

    pub fn validate(&self) -> Result<(), StoryValidationError> {
        validate_subject(&self.subject)
    }
}

/// User on whose behalf a mutation is performed and journaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
}

impl Actor {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Story validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryValidationError {
    /// Subject is blank after trim.
    EmptySubject,
    /// Position is below zero.
    NegativePosition(i64),
    /// Story names itself as parent.
    ParentIsSelf(StoryId),
}

impl Display for StoryValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySubject => write!(f, "story subject must not be blank"),
            Self::NegativePosition(value) => {
                write!(f, "story position must be non-negative, got {value}")
            }
            Self::ParentIsSelf(id) => write!(f, "story {id} cannot be its own parent"),
        }
    }
}

impl Error for StoryValidationError {}

fn validate_subject(subject: &str) -> Result<(), StoryValidationError> {
    if subject.trim().is_empty() {
        return Err(StoryValidationError::EmptySubject);
    }
    Ok(())
}

/// Effect of one story point input on the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsChange {
    /// Blank or `-`: points are cleared.
    Clear,
    /// Numeric input, or `s` for the smallest size (`0`).
    Set(u32),
    /// Negative numbers are accepted but leave points untouched.
    Unchanged,
}

/// Story point input that is neither numeric nor a known sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsParseError {
    pub input: String,
}

impl Display for PointsParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid story points `{}`: expected an integer, `-` or `s`",
            self.input
        )
    }
}

impl Error for PointsParseError {}

/// Interprets free-form story point input.
///
/// # Contract
/// - Blank input and `-` clear points.
/// - `s` (any case) sets points to `0`.
/// - Integers `>= 0` set points; negative integers are ignored.
/// - Anything else is rejected without side effects.
pub fn parse_points(input: &str) -> Result<PointsChange, PointsParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(PointsChange::Clear);
    }
    if trimmed.eq_ignore_ascii_case("s") {
        return Ok(PointsChange::Set(0));
    }

    let value = trimmed.parse::<i64>().map_err(|_| PointsParseError {
        input: input.to_string(),
    })?;
    if value < 0 {
        return Ok(PointsChange::Unchanged);
    }
    u32::try_from(value)
        .map(PointsChange::Set)
        .map_err(|_| PointsParseError {
            input: input.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::{parse_points, PointsChange, Story, StoryValidationError};

    fn story(position: Option<i64>) -> Story {
        Story {
            id: 7,
            project_id: 1,
            sprint_id: Some(1),
            type_id: 1,
            status_id: None,
            parent_id: None,
            author_id: None,
            subject: "Story".to_string(),
            story_points: None,
            position,
        }
    }

    #[test]
    fn parse_points_handles_sentinels() {
        assert_eq!(parse_points("-"), Ok(PointsChange::Clear));
        assert_eq!(parse_points("   "), Ok(PointsChange::Clear));
        assert_eq!(parse_points("s"), Ok(PointsChange::Set(0)));
        assert_eq!(parse_points("S"), Ok(PointsChange::Set(0)));
    }

    #[test]
    fn parse_points_accepts_integers_and_ignores_negatives() {
        assert_eq!(parse_points("3"), Ok(PointsChange::Set(3)));
        assert_eq!(parse_points(" 13 "), Ok(PointsChange::Set(13)));
        assert_eq!(parse_points("-2"), Ok(PointsChange::Unchanged));
    }

    #[test]
    fn parse_points_rejects_garbage() {
        let err = parse_points("abc").unwrap_err();
        assert_eq!(err.input, "abc");
        assert!(parse_points("1.5").is_err());
        assert!(parse_points("99999999999").is_err());
    }

    #[test]
    fn validate_rejects_negative_position_and_blank_subject() {
        assert_eq!(
            story(Some(-1)).validate(),
            Err(StoryValidationError::NegativePosition(-1))
        );

        let mut blank = story(None);
        blank.subject = "  ".to_string();
        assert_eq!(blank.validate(), Err(StoryValidationError::EmptySubject));

        let mut own_parent = story(Some(3));
        own_parent.parent_id = Some(own_parent.id);
        assert_eq!(
            own_parent.validate(),
            Err(StoryValidationError::ParentIsSelf(7))
        );
    }
}
