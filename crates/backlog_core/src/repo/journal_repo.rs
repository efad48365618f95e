//! Story journal contracts and SQLite implementation.
//!
//! # Invariants
//! - Entries are append-only.
//! - Field changes are stored as a JSON array in `journals.changes`.

use crate::model::journal::{FieldChange, JournalAction, JournalEntry};
use crate::model::story::StoryId;
use crate::repo::story_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Repository interface for the audit journal.
pub trait JournalRepository {
    fn record(&self, entry: &JournalEntry) -> RepoResult<()>;
    /// Lists entries of one story, oldest first.
    fn list_for_story(&self, story_id: StoryId) -> RepoResult<Vec<JournalEntry>>;
}

/// SQLite-backed journal.
pub struct SqliteJournalRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteJournalRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl JournalRepository for SqliteJournalRepository<'_> {
    fn record(&self, entry: &JournalEntry) -> RepoResult<()> {
        let changes = serde_json::to_string(&entry.changes)
            .map_err(|err| RepoError::InvalidData(format!("journal changes: {err}")))?;
        self.conn.execute(
            "INSERT INTO journals (journal_uuid, story_id, actor_id, action, changes)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entry.journal_uuid.to_string(),
                entry.story_id,
                entry.actor_id,
                entry.action.as_str(),
                changes,
            ],
        )?;
        Ok(())
    }

    fn list_for_story(&self, story_id: StoryId) -> RepoResult<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT journal_uuid, story_id, actor_id, action, changes
             FROM journals
             WHERE story_id = ?1
             ORDER BY created_at ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([story_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_journal_row(row)?);
        }
        Ok(entries)
    }
}

fn parse_journal_row(row: &Row<'_>) -> RepoResult<JournalEntry> {
    let uuid_text: String = row.get("journal_uuid")?;
    let journal_uuid = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{uuid_text}` in journals.journal_uuid"))
    })?;

    let action_text: String = row.get("action")?;
    let action = JournalAction::parse(&action_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid action `{action_text}` in journals.action"))
    })?;

    let changes_text: String = row.get("changes")?;
    let changes: Vec<FieldChange> = serde_json::from_str(&changes_text)
        .map_err(|err| RepoError::InvalidData(format!("invalid journals.changes: {err}")))?;

    Ok(JournalEntry {
        journal_uuid,
        story_id: row.get("story_id")?,
        actor_id: row.get("actor_id")?,
        action,
        changes,
    })
}
