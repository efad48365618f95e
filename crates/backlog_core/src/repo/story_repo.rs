//! Story store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist stories and their nullable `position`.
//! - Answer filtered list/count queries in natural order.
//! - Apply move plans atomically.
//!
//! # Invariants
//! - Write paths call `Story::validate()` / `NewStory::validate()` first.
//! - Filters are immutable values; SQL is assembled per call from them.
//! - A filter with an empty project, type or bucket set matches nothing and
//!   never reaches SQLite.
//! - `reposition` reads, plans and writes inside one `BEGIN IMMEDIATE`
//!   transaction, so concurrent moves on one database are serialized.

use crate::db::DbError;
use crate::model::story::{
    NewStory, ProjectId, SprintId, StatusId, Story, StoryId, StoryValidationError, TypeId, UserId,
};
use crate::ranking::order::NATURAL_ORDER_SQL;
use crate::ranking::positioner::{plan_move, MovePlan, Placement};
use crate::ranking::projector::RankBound;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const STORY_COLUMNS: &str = "id,
    project_id,
    sprint_id,
    type_id,
    status_id,
    parent_id,
    author_id,
    subject,
    story_points,
    position";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by backlog persistence layers.
#[derive(Debug)]
pub enum RepoError {
    Validation(StoryValidationError),
    Db(DbError),
    NotFound(StoryId),
    ProjectNotFound(ProjectId),
    /// Connection schema lacks a column the repository depends on.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "story not found: {id}"),
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "story repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted story data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoryValidationError> for RepoError {
    fn from(value: StoryValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Additional predicate layered on top of a group filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraPredicate {
    /// Status must be one of the given ids.
    StatusIn(BTreeSet<StatusId>),
    /// Stories in a closed status are excluded.
    ExcludeClosed,
}

/// Result ordering for story queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoryOrder {
    /// Ranking order (see `ranking::order`).
    #[default]
    Natural,
    IdAsc,
    SubjectAsc,
}

impl StoryOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::Natural => NATURAL_ORDER_SQL,
            Self::IdAsc => "id ASC",
            Self::SubjectAsc => "subject ASC, id ASC",
        }
    }
}

/// Group filter: project closure x story types x buckets, plus extras.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryFilter {
    pub project_ids: BTreeSet<ProjectId>,
    pub type_ids: BTreeSet<TypeId>,
    /// Requested buckets. `None` selects unscheduled stories.
    pub sprint_ids: BTreeSet<Option<SprintId>>,
    pub extra: Vec<ExtraPredicate>,
    /// Restricts the match to stories ranked at or before a bound.
    pub rank_bound: Option<RankBound>,
}

impl StoryFilter {
    pub fn new(
        project_ids: BTreeSet<ProjectId>,
        type_ids: BTreeSet<TypeId>,
        sprint_ids: BTreeSet<Option<SprintId>>,
    ) -> Self {
        Self {
            project_ids,
            type_ids,
            sprint_ids,
            extra: Vec::new(),
            rank_bound: None,
        }
    }

    pub fn with_extra(mut self, predicate: ExtraPredicate) -> Self {
        self.extra.push(predicate);
        self
    }

    pub fn with_rank_bound(mut self, bound: RankBound) -> Self {
        self.rank_bound = Some(bound);
        self
    }

    /// Returns whether the filter can match no story at all.
    pub fn is_unsatisfiable(&self) -> bool {
        self.project_ids.is_empty()
            || self.type_ids.is_empty()
            || self.sprint_ids.is_empty()
            || self.extra.iter().any(
                |predicate| matches!(predicate, ExtraPredicate::StatusIn(ids) if ids.is_empty()),
            )
    }

    /// Builds the `WHERE` clause and its bind values.
    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE 1 = 1");
        let mut binds = Vec::new();

        push_in_clause(&mut sql, &mut binds, "project_id", &self.project_ids);
        push_in_clause(&mut sql, &mut binds, "type_id", &self.type_ids);

        let scheduled: BTreeSet<SprintId> = self.sprint_ids.iter().flatten().copied().collect();
        let unscheduled = self.sprint_ids.contains(&None);
        match (scheduled.is_empty(), unscheduled) {
            (false, false) => push_in_clause(&mut sql, &mut binds, "sprint_id", &scheduled),
            (true, true) => sql.push_str(" AND sprint_id IS NULL"),
            (false, true) => sql.push_str(&format!(
                " AND (sprint_id IS NULL OR sprint_id IN {})",
                placeholder_list(&mut binds, &scheduled)
            )),
            (true, false) => sql.push_str(" AND 0 = 1"),
        }

        for predicate in &self.extra {
            match predicate {
                ExtraPredicate::StatusIn(ids) => {
                    push_in_clause(&mut sql, &mut binds, "status_id", ids);
                }
                ExtraPredicate::ExcludeClosed => sql.push_str(
                    " AND (status_id IS NULL
                       OR status_id NOT IN (SELECT id FROM statuses WHERE is_closed = 1))",
                ),
            }
        }

        match self.rank_bound {
            Some(RankBound::Positioned { position, id }) => {
                sql.push_str(
                    " AND position IS NOT NULL AND (position < ? OR (position = ? AND id <= ?))",
                );
                binds.push(Value::Integer(position));
                binds.push(Value::Integer(position));
                binds.push(Value::Integer(id));
            }
            Some(RankBound::Unpositioned { id }) => {
                sql.push_str(" AND (position IS NOT NULL OR id <= ?)");
                binds.push(Value::Integer(id));
            }
            None => {}
        }

        (sql, binds)
    }
}

/// Child task with its closed flag resolved from the status catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub task: Story,
    pub is_closed: bool,
}

/// Repository interface for the story position store.
pub trait StoryRepository {
    /// Inserts a new story without position and returns it.
    fn create_story(&self, story: &NewStory, author_id: Option<UserId>) -> RepoResult<Story>;
    /// Saves all mutable fields of an existing story.
    fn update_story(&self, story: &Story) -> RepoResult<()>;
    fn get_story(&self, id: StoryId) -> RepoResult<Option<Story>>;
    /// Lists stories matching `filter`.
    fn query_stories(&self, filter: &StoryFilter, order: StoryOrder) -> RepoResult<Vec<Story>>;
    /// Loads the story at zero-based `offset` in `order`.
    fn nth_story(
        &self,
        filter: &StoryFilter,
        order: StoryOrder,
        offset: u32,
    ) -> RepoResult<Option<Story>>;
    fn count_stories(&self, filter: &StoryFilter) -> RepoResult<u32>;
    fn set_story_points(&self, id: StoryId, points: Option<u32>) -> RepoResult<()>;
    /// Moves one story inside the group described by `filter`.
    fn reposition(
        &self,
        story_id: StoryId,
        filter: &StoryFilter,
        placement: Placement,
    ) -> RepoResult<MovePlan>;
    /// Lists direct children of one type, or of any type when `None`.
    fn list_children(&self, parent_id: StoryId, type_id: Option<TypeId>)
        -> RepoResult<Vec<Story>>;
    /// Lists transitive descendants of one type, or of any type when `None`.
    fn list_descendants(
        &self,
        root_id: StoryId,
        type_id: Option<TypeId>,
    ) -> RepoResult<Vec<Story>>;
    /// Lists direct children of one type with their closed flag.
    fn child_task_states(&self, parent_id: StoryId, type_id: TypeId)
        -> RepoResult<Vec<TaskState>>;
}

/// SQLite-backed story repository.
pub struct SqliteStoryRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStoryRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_story_columns(conn)?;
        Ok(Self { conn })
    }
}

impl StoryRepository for SqliteStoryRepository<'_> {
    fn create_story(&self, story: &NewStory, author_id: Option<UserId>) -> RepoResult<Story> {
        story.validate()?;

        self.conn.execute(
            "INSERT INTO stories (
                project_id,
                sprint_id,
                type_id,
                status_id,
                parent_id,
                author_id,
                subject,
                story_points,
                position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL);",
            params![
                story.project_id,
                story.sprint_id,
                story.type_id,
                story.status_id,
                story.parent_id,
                author_id,
                story.subject.trim(),
                story.story_points,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        load_story(self.conn, id)?.ok_or(RepoError::NotFound(id))
    }

    fn update_story(&self, story: &Story) -> RepoResult<()> {
        story.validate()?;

        let changed = self.conn.execute(
            "UPDATE stories
             SET
                project_id = ?2,
                sprint_id = ?3,
                type_id = ?4,
                status_id = ?5,
                parent_id = ?6,
                subject = ?7,
                story_points = ?8,
                position = ?9,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                story.id,
                story.project_id,
                story.sprint_id,
                story.type_id,
                story.status_id,
                story.parent_id,
                story.subject.trim(),
                story.story_points,
                story.position,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(story.id));
        }
        Ok(())
    }

    fn get_story(&self, id: StoryId) -> RepoResult<Option<Story>> {
        load_story(self.conn, id)
    }

    fn query_stories(&self, filter: &StoryFilter, order: StoryOrder) -> RepoResult<Vec<Story>> {
        select_stories(self.conn, filter, order, None)
    }

    fn nth_story(
        &self,
        filter: &StoryFilter,
        order: StoryOrder,
        offset: u32,
    ) -> RepoResult<Option<Story>> {
        Ok(select_stories(self.conn, filter, order, Some(offset))?
            .into_iter()
            .next())
    }

    fn count_stories(&self, filter: &StoryFilter) -> RepoResult<u32> {
        if filter.is_unsatisfiable() {
            return Ok(0);
        }

        let (where_sql, binds) = filter.to_sql();
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM stories{where_sql};"),
            params_from_iter(binds),
            |row| row.get(0),
        )?;
        u32::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("story count {count} out of range")))
    }

    fn set_story_points(&self, id: StoryId, points: Option<u32>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE stories
             SET story_points = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id, points],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn reposition(
        &self,
        story_id: StoryId,
        filter: &StoryFilter,
        placement: Placement,
    ) -> RepoResult<MovePlan> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let moving = load_story(&tx, story_id)?.ok_or(RepoError::NotFound(story_id))?;
        let group = select_stories(&tx, filter, StoryOrder::Natural, None)?;

        let plan = plan_move(&group, &moving, placement);
        for update in plan.updates() {
            tx.execute(
                "UPDATE stories
                 SET position = ?2,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![update.story_id, update.position],
            )?;
        }
        tx.commit()?;

        debug!(
            "event=story_reposition module=repo status=ok story_id={story_id} group_size={} writes={}",
            group.len(),
            plan.updates().len()
        );
        Ok(plan)
    }

    fn list_children(
        &self,
        parent_id: StoryId,
        type_id: Option<TypeId>,
    ) -> RepoResult<Vec<Story>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS}
             FROM stories
             WHERE parent_id = ?1
               AND (?2 IS NULL OR type_id = ?2)
             ORDER BY {NATURAL_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(params![parent_id, type_id])?;
        let mut stories = Vec::new();
        while let Some(row) = rows.next()? {
            stories.push(parse_story_row(row)?);
        }
        Ok(stories)
    }

    fn list_descendants(
        &self,
        root_id: StoryId,
        type_id: Option<TypeId>,
    ) -> RepoResult<Vec<Story>> {
        let mut stmt = self.conn.prepare(&format!(
            "WITH RECURSIVE subtree(id) AS (
                SELECT id
                FROM stories
                WHERE parent_id = ?1
                UNION
                SELECT child.id
                FROM stories child
                INNER JOIN subtree parent ON child.parent_id = parent.id
            )
            SELECT {STORY_COLUMNS}
            FROM stories
            WHERE id IN (SELECT id FROM subtree)
              AND id <> ?1
              AND (?2 IS NULL OR type_id = ?2)
            ORDER BY {NATURAL_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(params![root_id, type_id])?;
        let mut stories = Vec::new();
        while let Some(row) = rows.next()? {
            stories.push(parse_story_row(row)?);
        }
        Ok(stories)
    }

    fn child_task_states(
        &self,
        parent_id: StoryId,
        type_id: TypeId,
    ) -> RepoResult<Vec<TaskState>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {STORY_COLUMNS},
                COALESCE(
                    (SELECT statuses.is_closed FROM statuses WHERE statuses.id = stories.status_id),
                    0
                ) AS is_closed
             FROM stories
             WHERE parent_id = ?1
               AND type_id = ?2
             ORDER BY {NATURAL_ORDER_SQL};"
        ))?;
        let mut rows = stmt.query(params![parent_id, type_id])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            let is_closed = match row.get::<_, i64>("is_closed")? {
                0 => false,
                1 => true,
                other => {
                    return Err(RepoError::InvalidData(format!(
                        "invalid is_closed value `{other}` in statuses.is_closed"
                    )));
                }
            };
            tasks.push(TaskState {
                task: parse_story_row(row)?,
                is_closed,
            });
        }
        Ok(tasks)
    }
}

fn select_stories(
    conn: &Connection,
    filter: &StoryFilter,
    order: StoryOrder,
    offset: Option<u32>,
) -> RepoResult<Vec<Story>> {
    if filter.is_unsatisfiable() {
        return Ok(Vec::new());
    }

    let (where_sql, mut binds) = filter.to_sql();
    let mut sql = format!(
        "SELECT {STORY_COLUMNS} FROM stories{where_sql} ORDER BY {}",
        order.sql()
    );
    if let Some(offset) = offset {
        sql.push_str(" LIMIT 1 OFFSET ?");
        binds.push(Value::Integer(i64::from(offset)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut stories = Vec::new();
    while let Some(row) = rows.next()? {
        stories.push(parse_story_row(row)?);
    }
    Ok(stories)
}

fn load_story(conn: &Connection, id: StoryId) -> RepoResult<Option<Story>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STORY_COLUMNS}
         FROM stories
         WHERE id = ?1;"
    ))?;
    let mut rows = stmt.query([id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_story_row(row)?));
    }
    Ok(None)
}

fn push_in_clause<'a>(
    sql: &mut String,
    binds: &mut Vec<Value>,
    column: &str,
    values: impl IntoIterator<Item = &'a i64>,
) {
    sql.push_str(&format!(
        " AND {column} IN {}",
        placeholder_list(binds, values)
    ));
}

/// Binds `values` and returns the matching `(?, ?, ...)` list.
fn placeholder_list<'a>(
    binds: &mut Vec<Value>,
    values: impl IntoIterator<Item = &'a i64>,
) -> String {
    let placeholders: Vec<&str> = values
        .into_iter()
        .map(|value| {
            binds.push(Value::Integer(*value));
            "?"
        })
        .collect();
    format!("({})", placeholders.join(", "))
}

fn parse_story_row(row: &Row<'_>) -> RepoResult<Story> {
    let story_points = row
        .get::<_, Option<i64>>("story_points")?
        .map(|value| {
            u32::try_from(value).map_err(|_| {
                RepoError::InvalidData(format!(
                    "invalid story_points value `{value}` in stories.story_points"
                ))
            })
        })
        .transpose()?;

    let story = Story {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        sprint_id: row.get("sprint_id")?,
        type_id: row.get("type_id")?,
        status_id: row.get("status_id")?,
        parent_id: row.get("parent_id")?,
        author_id: row.get("author_id")?,
        subject: row.get("subject")?,
        story_points,
        position: row.get("position")?,
    };
    story
        .validate()
        .map_err(|err| RepoError::InvalidData(format!("story {}: {err}", story.id)))?;
    Ok(story)
}

fn ensure_story_columns(conn: &Connection) -> RepoResult<()> {
    let mut present = BTreeSet::new();
    let mut stmt = conn.prepare("PRAGMA table_info(stories);")?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        present.insert(row.get::<_, String>(1)?);
    }

    for column in [
        "id",
        "project_id",
        "sprint_id",
        "type_id",
        "status_id",
        "parent_id",
        "author_id",
        "subject",
        "story_points",
        "position",
    ] {
        if !present.contains(column) {
            return Err(RepoError::MissingRequiredColumn {
                table: "stories",
                column,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ExtraPredicate, StoryFilter};
    use crate::ranking::projector::RankBound;
    use std::collections::BTreeSet;

    fn filter(sprints: &[Option<i64>]) -> StoryFilter {
        StoryFilter::new(
            BTreeSet::from([1, 2]),
            BTreeSet::from([7]),
            sprints.iter().copied().collect(),
        )
    }

    #[test]
    fn mixed_bucket_clause_selects_null_or_listed_sprints() {
        let (sql, binds) = filter(&[None, Some(5)]).to_sql();
        assert!(sql.contains("(sprint_id IS NULL OR sprint_id IN (?))"));
        assert_eq!(binds.len(), 4);
    }

    #[test]
    fn unscheduled_only_clause_uses_is_null() {
        let (sql, _) = filter(&[None]).to_sql();
        assert!(sql.contains("AND sprint_id IS NULL"));
        assert!(!sql.contains("sprint_id IN"));
    }

    #[test]
    fn rank_bound_adds_tie_break_on_id() {
        let (sql, binds) = filter(&[Some(5)])
            .with_rank_bound(RankBound::Positioned { position: 9, id: 4 })
            .to_sql();
        assert!(sql.contains("position = ? AND id <= ?"));
        assert_eq!(binds.len(), 4 + 3);
    }

    #[test]
    fn empty_sets_are_unsatisfiable() {
        assert!(filter(&[]).is_unsatisfiable());
        assert!(StoryFilter::new(BTreeSet::from([1]), BTreeSet::new(), BTreeSet::from([None]))
            .is_unsatisfiable());
        assert!(filter(&[Some(1)])
            .with_extra(ExtraPredicate::StatusIn(BTreeSet::new()))
            .is_unsatisfiable());
        assert!(!filter(&[Some(1)])
            .with_extra(ExtraPredicate::ExcludeClosed)
            .is_unsatisfiable());
    }
}
