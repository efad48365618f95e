//! Audit journal model.
//!
//! # Invariants
//! - Every entry names the acting user explicitly; there is no ambient
//!   "current user".
//! - `changes` only lists fields whose value actually changed.

use crate::model::story::{Actor, Story, StoryId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalAction {
    Created,
    Updated,
    Moved,
    PointsSet,
}

impl JournalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Moved => "moved",
            Self::PointsSet => "points_set",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "moved" => Some(Self::Moved),
            "points_set" => Some(Self::PointsSet),
            _ => None,
        }
    }
}

/// One field transition, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

impl FieldChange {
    fn of<T: ToString>(field: &str, old: Option<T>, new: Option<T>) -> Self {
        Self {
            field: field.to_string(),
            old: old.map(|value| value.to_string()),
            new: new.map(|value| value.to_string()),
        }
    }

    /// Position transition written by a move.
    pub fn position(old: Option<i64>, new: i64) -> Self {
        Self::of("position", old, Some(new))
    }
}

/// Journal record for one story mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub journal_uuid: Uuid,
    pub story_id: StoryId,
    pub actor_id: UserId,
    pub action: JournalAction,
    pub changes: Vec<FieldChange>,
}

impl JournalEntry {
    pub fn new(
        actor: Actor,
        story_id: StoryId,
        action: JournalAction,
        changes: Vec<FieldChange>,
    ) -> Self {
        Self {
            journal_uuid: Uuid::new_v4(),
            story_id,
            actor_id: actor.user_id,
            action,
            changes,
        }
    }
}

/// Lists field-level differences between two snapshots of one story.
pub fn diff_stories(old: &Story, new: &Story) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if old.subject != new.subject {
        changes.push(FieldChange::of(
            "subject",
            Some(old.subject.as_str()),
            Some(new.subject.as_str()),
        ));
    }
    if old.project_id != new.project_id {
        changes.push(FieldChange::of(
            "project_id",
            Some(old.project_id),
            Some(new.project_id),
        ));
    }
    if old.type_id != new.type_id {
        changes.push(FieldChange::of("type_id", Some(old.type_id), Some(new.type_id)));
    }

    let optional_fields = [
        ("sprint_id", old.sprint_id, new.sprint_id),
        ("status_id", old.status_id, new.status_id),
        ("parent_id", old.parent_id, new.parent_id),
        ("position", old.position, new.position),
        (
            "story_points",
            old.story_points.map(i64::from),
            new.story_points.map(i64::from),
        ),
    ];
    for (field, old_value, new_value) in optional_fields {
        if old_value != new_value {
            changes.push(FieldChange::of(field, old_value, new_value));
        }
    }
    changes
}
