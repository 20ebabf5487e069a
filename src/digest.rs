//! Daily email digest of tasks due today.
//!
//! Runs on its own tokio task, independent of request handling. One email
//! goes to each owner with open tasks due on the current local day; a failed
//! delivery is recorded in the [`DigestReport`] and the run moves on.

use chrono::{DateTime, Days, Local, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    mailer::Mailer,
    models::Task,
    repository::TaskRepository,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestFailure {
    pub owner_id: i64,
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestReport {
    pub recipients: usize,
    pub sent: usize,
    pub failures: Vec<DigestFailure>,
}

struct Recipient {
    username: String,
    email: String,
    tasks: Vec<Task>,
}

/// Sends one digest per owner with open tasks due on the day of `now`.
pub async fn run_digest<Tz: TimeZone>(
    tasks: &TaskRepository,
    mailer: &dyn Mailer,
    now: &DateTime<Tz>,
) -> Result<DigestReport, sqlx::Error> {
    let (start, end) = day_bounds(now);

    let mut recipients: BTreeMap<i64, Recipient> = BTreeMap::new();
    for due in tasks.find_open_due_between(start, end).await? {
        recipients
            .entry(due.task.owner_id)
            .or_insert_with(|| Recipient {
                username: due.owner_username.clone(),
                email: due.owner_email.clone(),
                tasks: Vec::new(),
            })
            .tasks
            .push(due.task);
    }

    let mut report = DigestReport {
        recipients: recipients.len(),
        ..DigestReport::default()
    };

    for (owner_id, recipient) in recipients {
        match mailer
            .send_digest(&recipient.email, &recipient.username, &recipient.tasks)
            .await
        {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failures.push(DigestFailure {
                    owner_id,
                    email: recipient.email,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

/// First instant of `day` in `tz`. Falls back to the first valid hour when
/// midnight falls in a DST gap.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    (0..=3)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// UTC range `[start, end)` covering the calendar day of `now` in its zone.
pub fn day_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (start_of_day(&tz, today), start_of_day(&tz, tomorrow))
}

/// Time from `now` until the next `hour:00` in `now`'s zone.
pub fn until_next_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Duration {
    let tz = now.timezone();
    (0..=2u64)
        .filter_map(|offset| now.date_naive().checked_add_days(Days::new(offset)))
        .filter_map(|day| day.and_hms_opt(hour, 0, 0))
        .filter_map(|naive| tz.from_local_datetime(&naive).earliest())
        .find(|candidate| candidate > now)
        .and_then(|next| (next - now.clone()).to_std().ok())
        .unwrap_or(Duration::from_secs(60 * 60))
}

/// Spawns the recurring digest loop.
pub fn spawn(tasks: TaskRepository, mailer: Arc<dyn Mailer>, hour: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = until_next_run(&Local::now(), hour);
            info!("next digest run in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;

            match run_digest(&tasks, mailer.as_ref(), &Local::now()).await {
                Ok(report) => {
                    for failure in &report.failures {
                        warn!(
                            owner_id = failure.owner_id,
                            email = %failure.email,
                            "digest delivery failed: {}",
                            failure.error
                        );
                    }
                    info!(
                        recipients = report.recipients,
                        sent = report.sent,
                        failed = report.failures.len(),
                        "digest run finished"
                    );
                }
                Err(e) => error!("digest run aborted: {}", e),
            }
        }
    })
}
