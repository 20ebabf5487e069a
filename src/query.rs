//! Builds typed task queries from raw client parameters.
//!
//! Every value is checked against its closed vocabulary before it is folded
//! into a [`TaskFilter`], so the repository only ever sees known fields and
//! enum values.

use std::str::FromStr;

use crate::{
    error::AppError,
    fields::{self, SortDirection},
    models::{DeleteTasksParams, ListTasksParams, TaskStatus, TaskType},
};

#[cfg(test)]
use crate::models::Task;

const SORT_KEYS: [&str; 4] = ["deadline", "-deadline", "createdAt", "-createdAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    Any,
    Only(TaskStatus),
    ExcludeCompleted,
}

/// Owner-scoped predicate over the task table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    pub owner_id: i64,
    pub task_type: Option<TaskType>,
    pub status: StatusFilter,
}

impl TaskFilter {
    pub fn for_owner(owner_id: i64) -> Self {
        Self {
            owner_id,
            task_type: None,
            status: StatusFilter::Any,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    /// In-memory evaluation of the same predicate the repository renders to SQL.
    #[cfg(test)]
    pub fn matches(&self, task: &Task) -> bool {
        if task.owner_id != self.owner_id {
            return false;
        }
        if self.task_type.is_some_and(|t| t != task.task_type) {
            return false;
        }
        match self.status {
            StatusFilter::Any => true,
            StatusFilter::Only(status) => task.status == status,
            StatusFilter::ExcludeCompleted => task.status != TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        let (column, direction) = fields::map_sort_key("createdAt");
        Self { column, direction }
    }
}

impl FromStr for SortSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !SORT_KEYS.contains(&s) {
            return Err(AppError::InvalidFilter(format!(
                "unknown sort '{s}', expected one of {}",
                SORT_KEYS.join(", ")
            )));
        }
        let (column, direction) = fields::map_sort_key(s);
        Ok(Self { column, direction })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardType {
    All,
    Only(TaskType),
}

impl FromStr for DashboardType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(DashboardType::All);
        }
        s.parse::<TaskType>().map(DashboardType::Only).map_err(|_| {
            AppError::InvalidFilter(format!(
                "unknown dashboard type '{s}', expected one of all, work, personal"
            ))
        })
    }
}

fn parse_type(raw: Option<&str>) -> Result<Option<TaskType>, AppError> {
    raw.map(|s| s.parse::<TaskType>().map_err(AppError::InvalidFilter))
        .transpose()
}

fn parse_status(raw: Option<&str>) -> Result<Option<TaskStatus>, AppError> {
    raw.map(|s| s.parse::<TaskStatus>().map_err(AppError::InvalidFilter))
        .transpose()
}

/// Filter and ordering for `GET /tasks`.
///
/// Without an explicit `status` the listing hides completed tasks. Without
/// `sort` it is ordered by creation time, oldest first.
pub fn build_list_query(
    owner_id: i64,
    params: &ListTasksParams,
) -> Result<(TaskFilter, SortSpec), AppError> {
    let mut filter = TaskFilter::for_owner(owner_id);

    if let Some(task_type) = parse_type(params.task_type.as_deref())? {
        filter = filter.with_type(task_type);
    }

    filter = match parse_status(params.status.as_deref())? {
        Some(status) => filter.with_status(StatusFilter::Only(status)),
        None => filter.with_status(StatusFilter::ExcludeCompleted),
    };

    let sort = match params.sort.as_deref() {
        Some(raw) => raw.parse::<SortSpec>()?,
        None => SortSpec::default(),
    };

    Ok((filter, sort))
}

pub fn build_dashboard_query(owner_id: i64, dashboard_type: &str) -> Result<TaskFilter, AppError> {
    let filter = TaskFilter::for_owner(owner_id);
    Ok(match dashboard_type.parse::<DashboardType>()? {
        DashboardType::All => filter,
        DashboardType::Only(task_type) => filter.with_type(task_type),
    })
}

/// Filter for `DELETE /tasks`. Unlike listing, an absent status matches every status.
pub fn build_bulk_delete_query(
    owner_id: i64,
    params: &DeleteTasksParams,
) -> Result<TaskFilter, AppError> {
    let mut filter = TaskFilter::for_owner(owner_id);
    if let Some(task_type) = parse_type(params.task_type.as_deref())? {
        filter = filter.with_type(task_type);
    }
    if let Some(status) = parse_status(params.status.as_deref())? {
        filter = filter.with_status(StatusFilter::Only(status));
    }
    Ok(filter)
}
