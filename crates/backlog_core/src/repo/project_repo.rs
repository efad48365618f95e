//! Project hierarchy contracts and SQLite implementation.
//!
//! # Invariants
//! - `closure(id)` contains `id` itself plus every transitive descendant.
//! - Unknown projects are reported as `RepoError::ProjectNotFound`.

use crate::model::story::ProjectId;
use crate::repo::story_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

/// Project read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub parent_id: Option<ProjectId>,
    pub name: String,
}

/// Project hierarchy service.
pub trait ProjectRepository {
    fn create_project(&self, parent_id: Option<ProjectId>, name: &str) -> RepoResult<Project>;
    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    /// Returns the project plus all of its descendants.
    fn closure(&self, id: ProjectId) -> RepoResult<BTreeSet<ProjectId>>;
}

/// SQLite-backed project hierarchy.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, parent_id: Option<ProjectId>, name: &str) -> RepoResult<Project> {
        if let Some(parent_id) = parent_id {
            if self.get_project(parent_id)?.is_none() {
                return Err(RepoError::ProjectNotFound(parent_id));
            }
        }
        self.conn.execute(
            "INSERT INTO projects (parent_id, name) VALUES (?1, ?2);",
            params![parent_id, name.trim()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?.ok_or(RepoError::ProjectNotFound(id))
    }

    fn get_project(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        let project = self
            .conn
            .query_row(
                "SELECT id, parent_id, name FROM projects WHERE id = ?1;",
                [id],
                |row| {
                    Ok(Project {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    fn closure(&self, id: ProjectId) -> RepoResult<BTreeSet<ProjectId>> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE hierarchy(id) AS (
                SELECT id
                FROM projects
                WHERE id = ?1
                UNION
                SELECT child.id
                FROM projects child
                INNER JOIN hierarchy parent ON child.parent_id = parent.id
            )
            SELECT id FROM hierarchy;",
        )?;
        let mut rows = stmt.query([id])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(row.get::<_, ProjectId>(0)?);
        }

        if ids.is_empty() {
            return Err(RepoError::ProjectNotFound(id));
        }
        Ok(ids)
    }
}
