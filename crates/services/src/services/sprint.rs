use std::str::FromStr;

use chrono::{DateTime, Utc};
use db::{
    DbErr,
    events::{EVENT_SPRINT_COMPLETED, EVENT_SPRINT_STARTED, SprintEventPayload},
    models::{
        event_outbox::EventOutbox,
        project::Project,
        sprint::{CreateSprint, Sprint, UpdateSprint},
        task::Task,
    },
    retry_on_sqlite_busy,
    types::SprintStatus,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SprintError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Cannot move sprint from {from} to {to}")]
    InvalidTransition {
        from: SprintStatus,
        to: SprintStatus,
    },
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SprintError>;

/// Where unfinished tasks go when a sprint is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    #[default]
    Backlog,
    MoveTo(Uuid),
}

impl FromStr for CompletionPolicy {
    type Err = SprintError;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("backlog") {
            return Ok(CompletionPolicy::Backlog);
        }
        Uuid::parse_str(value)
            .map(CompletionPolicy::MoveTo)
            .map_err(|_| {
                SprintError::Validation(format!(
                    "Expected \"backlog\" or a sprint id, got \"{value}\""
                ))
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SprintCompletion {
    pub sprint: Sprint,
    pub moved_tasks: u64,
}

#[derive(Clone, Default)]
pub struct SprintService;

impl SprintService {
    pub fn new() -> Self {
        Self
    }

    fn check_dates(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
        match (start, end) {
            (Some(start), Some(end)) if end < start => Err(SprintError::Validation(
                "Sprint end date must not be before its start date".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub async fn create(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        payload: &CreateSprint,
    ) -> Result<Sprint> {
        if payload.name.trim().is_empty() {
            return Err(SprintError::Validation("Sprint name is required".to_string()));
        }
        Self::check_dates(payload.start_date, payload.end_date)?;
        if Project::find_by_id(pool, project_id).await?.is_none() {
            return Err(SprintError::NotFound("Project"));
        }
        Ok(Sprint::create(pool, project_id, payload).await?)
    }

    pub async fn get(&self, pool: &db::DbPool, id: Uuid) -> Result<Sprint> {
        Sprint::find_by_id(pool, id)
            .await?
            .ok_or(SprintError::NotFound("Sprint"))
    }

    pub async fn list(&self, pool: &db::DbPool, project_id: Uuid) -> Result<Vec<Sprint>> {
        if Project::find_by_id(pool, project_id).await?.is_none() {
            return Err(SprintError::NotFound("Project"));
        }
        Ok(Sprint::find_by_project_id(pool, project_id).await?)
    }

    pub async fn update(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        payload: &UpdateSprint,
    ) -> Result<Sprint> {
        if payload
            .name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(SprintError::Validation("Sprint name is required".to_string()));
        }
        let existing = self.get(pool, id).await?;
        Self::check_dates(
            payload.start_date.or(existing.start_date),
            payload.end_date.or(existing.end_date),
        )?;
        Ok(Sprint::update(pool, id, payload).await?)
    }

    /// Deletes the sprint; its tasks return to the backlog.
    pub async fn delete(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        if Sprint::delete(&tx, id).await? == 0 {
            return Err(SprintError::NotFound("Sprint"));
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_tasks(&self, pool: &db::DbPool, id: Uuid) -> Result<Vec<Task>> {
        self.get(pool, id).await?;
        Ok(Task::find_by_sprint_id(pool, id).await?)
    }

    /// PLANNING -> ACTIVE. Starting any other sprint is rejected.
    pub async fn start(&self, pool: &db::DbPool, id: Uuid) -> Result<Sprint> {
        let sprint = retry_on_sqlite_busy(|| async {
            let tx = db::begin_write(pool).await?;
            let sprint = Sprint::find_by_id(&tx, id)
                .await?
                .ok_or(SprintError::NotFound("Sprint"))?;
            if sprint.status != SprintStatus::Planning {
                return Err(SprintError::InvalidTransition {
                    from: sprint.status,
                    to: SprintStatus::Active,
                });
            }

            let sprint = Sprint::set_status(&tx, id, SprintStatus::Active, Utc::now()).await?;
            EventOutbox::enqueue_payload(
                &tx,
                EVENT_SPRINT_STARTED,
                "sprint",
                sprint.id,
                &SprintEventPayload {
                    sprint_id: sprint.id,
                    project_id: sprint.project_id,
                    name: sprint.name.clone(),
                },
            )
            .await?;
            tx.commit().await?;
            Ok::<_, SprintError>(sprint)
        })
        .await?;

        tracing::info!(sprint_id = %id, "sprint started");
        Ok(sprint)
    }

    /// ACTIVE -> COMPLETED. Tasks that are not DONE move according to
    /// `policy` in the same transaction as the status change.
    pub async fn complete(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        policy: CompletionPolicy,
    ) -> Result<SprintCompletion> {
        let (sprint, moved_tasks) = retry_on_sqlite_busy(|| async {
            let tx = db::begin_write(pool).await?;
            let sprint = Sprint::find_by_id(&tx, id)
                .await?
                .ok_or(SprintError::NotFound("Sprint"))?;
            if sprint.status != SprintStatus::Active {
                return Err(SprintError::InvalidTransition {
                    from: sprint.status,
                    to: SprintStatus::Completed,
                });
            }

            let target = match policy {
                CompletionPolicy::Backlog => None,
                CompletionPolicy::MoveTo(target_id) => {
                    if target_id == id {
                        return Err(SprintError::Validation(
                            "Cannot move tasks into the sprint being completed".to_string(),
                        ));
                    }
                    let target = Sprint::find_by_id(&tx, target_id)
                        .await?
                        .ok_or(SprintError::NotFound("Target sprint"))?;
                    if target.project_id != sprint.project_id {
                        return Err(SprintError::Validation(
                            "Target sprint belongs to another project".to_string(),
                        ));
                    }
                    if target.status == SprintStatus::Completed {
                        return Err(SprintError::Validation(
                            "Target sprint is already completed".to_string(),
                        ));
                    }
                    Some(target_id)
                }
            };

            let moved_tasks = Sprint::move_unfinished_tasks(&tx, id, target).await?;
            let sprint = Sprint::set_status(&tx, id, SprintStatus::Completed, Utc::now()).await?;
            EventOutbox::enqueue_payload(
                &tx,
                EVENT_SPRINT_COMPLETED,
                "sprint",
                sprint.id,
                &SprintEventPayload {
                    sprint_id: sprint.id,
                    project_id: sprint.project_id,
                    name: sprint.name.clone(),
                },
            )
            .await?;
            tx.commit().await?;
            Ok::<_, SprintError>((sprint, moved_tasks))
        })
        .await?;

        tracing::info!(sprint_id = %id, moved_tasks, "sprint completed");
        Ok(SprintCompletion {
            sprint,
            moved_tasks,
        })
    }
}
