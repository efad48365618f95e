//! Backlog type configuration.
//!
//! # Responsibility
//! - Persist which work item types are ranked as stories and which type is
//!   the task type.
//! - Expose them to services through `TypeConfiguration`.
//!
//! # Invariants
//! - Type ids are stored as strings and converted strictly; a malformed id
//!   is an error, not silently dropped.
//! - Missing or empty configuration yields an empty story type set. Callers
//!   treat that as "nothing to rank", never as a failure.

use crate::db::DbError;
use crate::model::story::TypeId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Settings row key holding the serialized [`BacklogSettings`].
pub const BACKLOG_SETTINGS_KEY: &str = "backlogs";

/// Errors from settings persistence and interpretation.
#[derive(Debug)]
pub enum SettingsError {
    Db(DbError),
    Serialization(serde_json::Error),
    /// Configured type id is not an integer.
    InvalidTypeId(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "invalid backlog settings: {err}"),
            Self::InvalidTypeId(value) => write!(f, "invalid type id in settings: `{value}`"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::InvalidTypeId(_) => None,
        }
    }
}

impl From<rusqlite::Error> for SettingsError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Source of the type ids the backlog ranks.
pub trait TypeConfiguration {
    /// Type ids eligible for ranking. May be empty.
    fn story_types(&self) -> Result<BTreeSet<TypeId>, SettingsError>;
    /// Type id of tasks hanging under stories, if configured.
    fn task_type(&self) -> Result<Option<TypeId>, SettingsError>;
}

/// Persisted backlog configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogSettings {
    #[serde(default)]
    pub story_types: Vec<String>,
    #[serde(default)]
    pub task_type: Option<String>,
}

impl BacklogSettings {
    pub fn new(story_types: &[TypeId], task_type: Option<TypeId>) -> Self {
        Self {
            story_types: story_types.iter().map(ToString::to_string).collect(),
            task_type: task_type.map(|value| value.to_string()),
        }
    }
}

impl TypeConfiguration for BacklogSettings {
    fn story_types(&self) -> Result<BTreeSet<TypeId>, SettingsError> {
        self.story_types
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(parse_type_id)
            .collect()
    }

    fn task_type(&self) -> Result<Option<TypeId>, SettingsError> {
        match self.task_type.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => parse_type_id(value).map(Some),
        }
    }
}

/// Settings store backed by the `settings` table.
///
/// Reads on every call, so configuration changes apply to the next query.
pub struct SqliteSettingsStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Loads settings; a missing row yields defaults.
    pub fn load(&self) -> Result<BacklogSettings, SettingsError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1;",
                [BACKLOG_SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            None => Ok(BacklogSettings::default()),
            Some(value) => Ok(serde_json::from_str(&value)?),
        }
    }

    /// Replaces the stored settings.
    pub fn save(&self, settings: &BacklogSettings) -> Result<(), SettingsError> {
        let value = serde_json::to_string(settings)?;
        self.conn.execute(
            "INSERT INTO settings (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET
                value = excluded.value,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![BACKLOG_SETTINGS_KEY, value],
        )?;
        Ok(())
    }
}

impl TypeConfiguration for SqliteSettingsStore<'_> {
    fn story_types(&self) -> Result<BTreeSet<TypeId>, SettingsError> {
        self.load()?.story_types()
    }

    fn task_type(&self) -> Result<Option<TypeId>, SettingsError> {
        self.load()?.task_type()
    }
}

fn parse_type_id(value: &str) -> Result<TypeId, SettingsError> {
    value
        .parse::<TypeId>()
        .map_err(|_| SettingsError::InvalidTypeId(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{BacklogSettings, SettingsError, TypeConfiguration};
    use std::collections::BTreeSet;

    #[test]
    fn empty_settings_yield_no_story_types() {
        let settings = BacklogSettings::default();
        assert!(settings.story_types().unwrap().is_empty());
        assert_eq!(settings.task_type().unwrap(), None);
    }

    #[test]
    fn story_types_are_parsed_and_blank_entries_skipped() {
        let settings: BacklogSettings =
            serde_json::from_str(r#"{"story_types": ["3", " 5 ", ""], "task_type": "9"}"#)
                .unwrap();
        assert_eq!(settings.story_types().unwrap(), BTreeSet::from([3, 5]));
        assert_eq!(settings.task_type().unwrap(), Some(9));
    }

    #[test]
    fn malformed_type_id_is_rejected() {
        let settings = BacklogSettings {
            story_types: vec!["story".to_string()],
            task_type: None,
        };
        assert!(matches!(
            settings.story_types(),
            Err(SettingsError::InvalidTypeId(value)) if value == "story"
        ));
    }
}
