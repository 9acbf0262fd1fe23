use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronParser;
use db::{
    DBService, DbErr,
    models::{
        notification::{CreateNotification, Notification},
        project_member::ProjectMember,
        refresh_token::RefreshToken,
        sprint::Sprint,
        task::Task,
        user::User,
    },
};
use thiserror::Error;
use tokio::task::JoinHandle;

use super::{
    events::NotificationSink,
    notification::content,
    sprint::{CompletionPolicy, SprintService},
};

const DUE_SOON_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("invalid cron expression '{0}'")]
    Cron(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    DueDateReminders,
    OverdueReminders,
    SprintEndingReminders,
    NotificationCleanup,
    AutoCompleteSprints,
    InactiveUsers,
}

impl Job {
    pub const ALL: [Job; 6] = [
        Job::DueDateReminders,
        Job::OverdueReminders,
        Job::SprintEndingReminders,
        Job::NotificationCleanup,
        Job::AutoCompleteSprints,
        Job::InactiveUsers,
    ];

    /// Cron expression with a leading seconds field, evaluated in UTC.
    pub fn schedule(self) -> &'static str {
        match self {
            Job::DueDateReminders => "0 0 9 * * *",
            Job::OverdueReminders => "0 0 10 * * *",
            Job::SprintEndingReminders => "0 0 9 * * *",
            Job::NotificationCleanup => "0 0 0 * * Sun",
            Job::AutoCompleteSprints => "0 0 * * * *",
            Job::InactiveUsers => "0 */30 * * * *",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Job::DueDateReminders => "due-date-reminders",
            Job::OverdueReminders => "overdue-reminders",
            Job::SprintEndingReminders => "sprint-ending-reminders",
            Job::NotificationCleanup => "notification-cleanup",
            Job::AutoCompleteSprints => "auto-complete-sprints",
            Job::InactiveUsers => "inactive-users",
        }
    }

    pub fn next_run(self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let schedule = CronParser::from_str(self.schedule())
            .map_err(|_| SchedulerError::Cron(self.schedule().to_string()))?;
        Ok(schedule.after(&after).next())
    }
}

/// Periodic maintenance. Every job is also callable directly with an explicit `now`.
#[derive(Clone)]
pub struct SchedulerService {
    db: DBService,
    sink: Arc<dyn NotificationSink>,
    sprints: SprintService,
    notification_retention: Duration,
    inactive_after: Duration,
}

impl SchedulerService {
    pub fn new(
        db: DBService,
        sink: Arc<dyn NotificationSink>,
        notification_retention_days: i64,
        inactive_user_minutes: i64,
    ) -> Self {
        Self {
            db,
            sink,
            sprints: SprintService::new(),
            notification_retention: Duration::days(notification_retention_days),
            inactive_after: Duration::minutes(inactive_user_minutes),
        }
    }

    pub fn spawn_jobs(&self) -> Vec<JoinHandle<()>> {
        Job::ALL
            .into_iter()
            .map(|job| {
                let service = self.clone();
                tokio::spawn(async move { service.run_job_loop(job).await })
            })
            .collect()
    }

    async fn run_job_loop(&self, job: Job) {
        loop {
            let next = match job.next_run(Utc::now()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    tracing::warn!(job = job.name(), "schedule has no upcoming run, stopping");
                    return;
                }
                Err(err) => {
                    tracing::error!(job = job.name(), error = %err, "cannot schedule job");
                    return;
                }
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match self.run(job, Utc::now()).await {
                Ok(affected) => tracing::info!(job = job.name(), affected, "scheduled job finished"),
                Err(err) => tracing::error!(job = job.name(), error = %err, "scheduled job failed"),
            }
        }
    }

    pub async fn run(&self, job: Job, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        match job {
            Job::DueDateReminders => self.send_due_date_reminders(now).await,
            Job::OverdueReminders => self.send_overdue_reminders(now).await,
            Job::SprintEndingReminders => self.send_sprint_ending_reminders(now).await,
            Job::NotificationCleanup => self.clean_up_notifications(now).await,
            Job::AutoCompleteSprints => self.auto_complete_sprints(now).await,
            Job::InactiveUsers => self.mark_inactive_users(now).await,
        }
    }

    async fn deliver(&self, notification: CreateNotification) -> bool {
        let user_id = notification.user_id;
        match self.sink.create_notification(notification).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "reminder delivery failed");
                false
            }
        }
    }

    /// Open tasks due within the next few days.
    pub async fn send_due_date_reminders(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let tasks = Task::find_open_due_between(
            &self.db.pool,
            now,
            now + Duration::days(DUE_SOON_WINDOW_DAYS),
        )
        .await?;
        let mut sent = 0;
        for task in tasks {
            let (Some(assignee_id), Some(due)) = (task.assignee_id, task.due_date) else {
                continue;
            };
            let days_left = (due.date_naive() - now.date_naive()).num_days();
            let reminder =
                content::due_date_reminder(assignee_id, task.id, task.project_id, &task.title, days_left);
            if self.deliver(reminder).await {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub async fn send_overdue_reminders(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut sent = 0;
        for task in Task::find_open_overdue(&self.db.pool, now).await? {
            let Some(assignee_id) = task.assignee_id else {
                continue;
            };
            let reminder = content::overdue_reminder(assignee_id, task.id, task.project_id, &task.title);
            if self.deliver(reminder).await {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Active sprints ending within a day, announced to their project members.
    pub async fn send_sprint_ending_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, SchedulerError> {
        let sprints =
            Sprint::find_active_ending_between(&self.db.pool, now, now + Duration::hours(24))
                .await?;
        let mut sent = 0;
        for sprint in sprints {
            let members = ProjectMember::list_with_users(&self.db.pool, sprint.project_id).await?;
            for member in members {
                let reminder = content::sprint_ending(
                    member.user.id,
                    sprint.id,
                    sprint.project_id,
                    &sprint.name,
                );
                if self.deliver(reminder).await {
                    sent += 1;
                }
            }
        }
        Ok(sent)
    }

    /// Drops read notifications past the retention window and expired refresh tokens.
    pub async fn clean_up_notifications(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let removed =
            Notification::delete_read_before(&self.db.pool, now - self.notification_retention)
                .await?;
        let tokens = RefreshToken::delete_expired(&self.db.pool, now).await?;
        tracing::debug!(notifications = removed, refresh_tokens = tokens, "cleanup done");
        Ok(removed)
    }

    /// Completes active sprints whose end date has passed, sending open
    /// tasks to the backlog.
    pub async fn auto_complete_sprints(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        let mut completed = 0;
        for sprint in Sprint::find_active_overdue(&self.db.pool, now).await? {
            match self
                .sprints
                .complete(&self.db.pool, sprint.id, CompletionPolicy::Backlog)
                .await
            {
                Ok(_) => completed += 1,
                Err(err) => {
                    tracing::warn!(sprint_id = %sprint.id, error = %err, "auto-complete failed");
                }
            }
        }
        Ok(completed)
    }

    pub async fn mark_inactive_users(&self, now: DateTime<Utc>) -> Result<u64, SchedulerError> {
        Ok(User::mark_inactive_away(&self.db.pool, now - self.inactive_after).await?)
    }
}
