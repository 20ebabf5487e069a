//! SQLite-backed persistence for users and tasks.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    fields::ExternalField,
    models::{CreateTask, Task, TaskStatus, TaskType, UpdateTask, User},
    query::{SortSpec, StatusFilter, TaskFilter},
};

#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub task_type: TaskType,
    pub deadline: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn from_request(owner_id: i64, payload: CreateTask) -> Self {
        Self {
            owner_id,
            title: payload.title,
            description: payload.description,
            status: payload.status.unwrap_or_default(),
            task_type: payload.task_type,
            deadline: payload.deadline,
        }
    }
}

/// Column updates for a single task. `None` leaves a column untouched;
/// `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

impl TaskChanges {
    /// Full replacement: omitted optional fields are reset.
    pub fn replace(payload: CreateTask) -> Self {
        Self {
            title: Some(payload.title),
            description: Some(payload.description),
            status: Some(payload.status.unwrap_or_default()),
            task_type: Some(payload.task_type),
            deadline: Some(payload.deadline),
        }
    }

    pub fn partial(payload: UpdateTask) -> Self {
        Self {
            title: payload.title,
            description: payload.description.map(Some),
            status: payload.status,
            task_type: payload.task_type,
            deadline: payload.deadline.map(Some),
        }
    }
}

/// An open task with a deadline, joined with its owner's contact details.
#[derive(Debug, Clone, FromRow)]
pub struct DueTask {
    #[sqlx(flatten)]
    pub task: Task,
    pub owner_username: String,
    pub owner_email: String,
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TaskFilter) {
    builder.push(" WHERE owner_id = ").push_bind(filter.owner_id);

    if let Some(task_type) = filter.task_type {
        builder
            .push(format!(" AND {} = ", ExternalField::Type.column()))
            .push_bind(task_type);
    }

    match filter.status {
        StatusFilter::Any => {}
        StatusFilter::Only(status) => {
            builder
                .push(format!(" AND {} = ", ExternalField::Status.column()))
                .push_bind(status);
        }
        StatusFilter::ExcludeCompleted => {
            builder
                .push(format!(" AND {} <> ", ExternalField::Status.column()))
                .push_bind(TaskStatus::Completed);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, filter: &TaskFilter, sort: Option<SortSpec>) -> Result<Vec<Task>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM tasks");
        push_filter(&mut builder, filter);
        if let Some(sort) = sort {
            // Columns come from the field mapper's closed set, never from input.
            builder.push(format!(
                " ORDER BY {} {}, id {}",
                sort.column,
                sort.direction.as_sql(),
                sort.direction.as_sql()
            ));
        }
        builder.build_query_as::<Task>().fetch_all(&self.pool).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create(&self, task: NewTask) -> Result<Task, sqlx::Error> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO tasks (owner_id, title, description, task_status, task_type, task_deadline, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.owner_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status)
        .bind(task.task_type)
        .bind(task.deadline)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn update_by_id(&self, id: i64, changes: TaskChanges) -> Result<Option<Task>, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE tasks SET ");
        let mut set = builder.separated(", ");
        if let Some(title) = changes.title {
            set.push("title = ").push_bind_unseparated(title);
        }
        if let Some(description) = changes.description {
            set.push("description = ").push_bind_unseparated(description);
        }
        if let Some(status) = changes.status {
            set.push("task_status = ").push_bind_unseparated(status);
        }
        if let Some(task_type) = changes.task_type {
            set.push("task_type = ").push_bind_unseparated(task_type);
        }
        if let Some(deadline) = changes.deadline {
            set.push("task_deadline = ").push_bind_unseparated(deadline);
        }
        set.push("updated_at = ").push_bind_unseparated(Utc::now());
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    pub async fn delete_by_id(&self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query_as::<_, Task>("DELETE FROM tasks WHERE id = ? RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Removes every task matching `filter` in a single statement.
    pub async fn delete_many(&self, filter: &TaskFilter) -> Result<u64, sqlx::Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM tasks");
        push_filter(&mut builder, filter);
        Ok(builder.build().execute(&self.pool).await?.rows_affected())
    }

    /// Non-completed tasks due in `[start, end)`, with owner contact details.
    pub async fn find_open_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DueTask>, sqlx::Error> {
        // Deadlines are stored as RFC 3339 UTC text, which orders chronologically.
        sqlx::query_as::<_, DueTask>(
            "SELECT t.*, u.username AS owner_username, u.email AS owner_email
             FROM tasks t
             JOIN users u ON u.id = t.owner_id
             WHERE t.task_deadline >= ? AND t.task_deadline < ? AND t.task_status <> ?
             ORDER BY t.owner_id, t.task_deadline",
        )
        .bind(start)
        .bind(end)
        .bind(TaskStatus::Completed)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn username_or_email_taken(&self, username: &str, email: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = ? OR email = ?")
            .bind(username)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn create(&self, username: &str, email: &str, hashed_password: &str) -> Result<User, sqlx::Error> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO users (username, email, hashed_password, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(hashed_password)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }
}
