//! Work item metadata: types, statuses and sprints.
//!
//! Only what ranking and task aggregation consume is modelled here: ids,
//! names and whether a status counts as closed.

use crate::model::story::{ProjectId, SprintId, StatusId, TypeId};
use crate::repo::story_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection};

/// Repository interface for work item metadata.
pub trait CatalogRepository {
    fn create_type(&self, name: &str) -> RepoResult<TypeId>;
    fn create_status(&self, name: &str, is_closed: bool) -> RepoResult<StatusId>;
    fn create_sprint(&self, project_id: ProjectId, name: &str) -> RepoResult<SprintId>;
}

/// SQLite-backed catalog.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_type(&self, name: &str) -> RepoResult<TypeId> {
        self.conn
            .execute("INSERT INTO types (name) VALUES (?1);", [name.trim()])?;
        Ok(self.conn.last_insert_rowid())
    }

    fn create_status(&self, name: &str, is_closed: bool) -> RepoResult<StatusId> {
        self.conn.execute(
            "INSERT INTO statuses (name, is_closed) VALUES (?1, ?2);",
            params![name.trim(), i64::from(is_closed)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn create_sprint(&self, project_id: ProjectId, name: &str) -> RepoResult<SprintId> {
        let project_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1);",
            [project_id],
            |row| row.get(0),
        )?;
        if project_exists == 0 {
            return Err(RepoError::ProjectNotFound(project_id));
        }

        self.conn.execute(
            "INSERT INTO sprints (project_id, name) VALUES (?1, ?2);",
            params![project_id, name.trim()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}
