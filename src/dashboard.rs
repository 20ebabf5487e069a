use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Task, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProgressChart {
    pub pending: usize,
    #[serde(rename = "in-progress")]
    pub in_progress: usize,
    pub completed: usize,
}

impl ProgressChart {
    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub active_count: usize,
    pub completed_count: usize,
    pub overdue_count: usize,
    pub overdue_tasks: Vec<Task>,
    pub today_tasks: Vec<Task>,
    pub progress_chart: ProgressChart,
}

/// Calendar day of `instant` as seen from `tz`.
pub fn calendar_day<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Aggregates a user's tasks relative to the day containing `reference`.
///
/// Both day checks compare calendar dates in the reference's zone: a deadline
/// on an earlier date is before the start of today, a deadline on the same
/// date belongs to today. Overdue and today buckets are therefore disjoint,
/// while an overdue task still counts as active.
pub fn summarize<Tz: TimeZone>(tasks: Vec<Task>, reference: &DateTime<Tz>) -> DashboardSummary {
    let tz = reference.timezone();
    let today = reference.date_naive();
    let mut summary = DashboardSummary::default();

    for task in tasks {
        if task.status.is_active() {
            summary.active_count += 1;
        } else {
            summary.completed_count += 1;
        }

        let Some(day) = task.deadline.as_ref().map(|d| calendar_day(d, &tz)) else {
            continue;
        };

        if day < today && task.status != TaskStatus::Completed {
            summary.overdue_count += 1;
            summary.overdue_tasks.push(task);
        } else if day == today {
            summary.progress_chart.record(task.status);
            summary.today_tasks.push(task);
        }
    }

    summary
}
