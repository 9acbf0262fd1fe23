use db::{
    ConnectionTrait, DbErr,
    events::{EVENT_TASK_ASSIGNED, TaskAssignedPayload},
    models::{
        event_outbox::EventOutbox,
        label::Label,
        project::Project,
        sprint::Sprint,
        task::{
            BulkTaskUpdate, CreateTask, Task, TaskDetails, TaskFields, TaskFilters, UpdateTask,
        },
        user::User,
    },
    retry_on_sqlite_busy,
    types::TaskStatus,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Outcome of one item of a bulk update.
#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateResult {
    pub id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn enqueue_assigned<C: ConnectionTrait>(
    db: &C,
    task: &Task,
    assignee_id: Uuid,
    actor_id: Uuid,
) -> std::result::Result<(), DbErr> {
    EventOutbox::enqueue_payload(
        db,
        EVENT_TASK_ASSIGNED,
        "task",
        task.id,
        &TaskAssignedPayload {
            task_id: task.id,
            project_id: task.project_id,
            assignee_id,
            actor_id,
            title: task.title.clone(),
        },
    )
    .await
}

/// The assignee to notify after a change, if any: a new person who is not
/// the one making the change.
fn newly_assigned(previous: Option<Uuid>, next: Option<Uuid>, actor_id: Uuid) -> Option<Uuid> {
    next.filter(|assignee| Some(*assignee) != previous && *assignee != actor_id)
}

#[derive(Clone, Default)]
pub struct TaskService;

impl TaskService {
    pub fn new() -> Self {
        Self
    }

    async fn existing<C: ConnectionTrait>(&self, db: &C, id: Uuid) -> Result<Task> {
        Task::find_by_id(db, id)
            .await?
            .ok_or(TaskError::NotFound("Task"))
    }

    async fn ensure_project(&self, pool: &db::DbPool, project_id: Uuid) -> Result<()> {
        if Project::find_by_id(pool, project_id).await?.is_none() {
            return Err(TaskError::NotFound("Project"));
        }
        Ok(())
    }

    async fn check_sprint<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: Uuid,
        sprint_id: Uuid,
    ) -> Result<()> {
        let sprint = Sprint::find_by_id(db, sprint_id)
            .await?
            .ok_or(TaskError::NotFound("Sprint"))?;
        if sprint.project_id != project_id {
            return Err(TaskError::Validation(
                "Sprint belongs to another project".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that every reference in `fields` points at something of the
    /// same project, and that the parent chain does not loop back to `task_id`.
    async fn validate_fields<C: ConnectionTrait>(
        &self,
        db: &C,
        project_id: Uuid,
        task_id: Option<Uuid>,
        fields: &TaskFields,
    ) -> Result<()> {
        if fields.title.trim().is_empty() {
            return Err(TaskError::Validation("Task title is required".to_string()));
        }
        if fields.story_points.is_some_and(|points| points < 0) {
            return Err(TaskError::Validation(
                "Story points must not be negative".to_string(),
            ));
        }
        if let Some(sprint_id) = fields.sprint_id {
            self.check_sprint(db, project_id, sprint_id).await?;
        }
        if let Some(assignee_id) = fields.assignee_id
            && User::find_by_id(db, assignee_id).await?.is_none()
        {
            return Err(TaskError::NotFound("Assignee"));
        }

        let mut next_parent = fields.parent_id;
        while let Some(parent_id) = next_parent {
            if Some(parent_id) == task_id {
                return Err(TaskError::Validation(
                    "A task cannot be its own ancestor".to_string(),
                ));
            }
            let parent = Task::find_by_id(db, parent_id)
                .await?
                .ok_or(TaskError::NotFound("Parent task"))?;
            if parent.project_id != project_id {
                return Err(TaskError::Validation(
                    "Parent task belongs to another project".to_string(),
                ));
            }
            next_parent = parent.parent_id;
        }

        for label_id in &fields.label_ids {
            let label = Label::find_by_id(db, *label_id)
                .await?
                .ok_or(TaskError::NotFound("Label"))?;
            if label.project_id != project_id {
                return Err(TaskError::Validation(
                    "Label belongs to another project".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Creates a task with the next key of the project. The counter bump,
    /// the insert and the assignment event commit together.
    pub async fn create(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        reporter_id: Uuid,
        payload: &CreateTask,
    ) -> Result<Task> {
        self.ensure_project(pool, project_id).await?;
        let fields = TaskFields::from_create(payload);
        self.validate_fields(pool, project_id, None, &fields).await?;

        let task = retry_on_sqlite_busy(|| async {
            let tx = db::begin_write(pool).await?;
            let task = Task::create(&tx, project_id, reporter_id, &fields).await?;
            if let Some(assignee_id) = newly_assigned(None, task.assignee_id, reporter_id) {
                enqueue_assigned(&tx, &task, assignee_id, reporter_id).await?;
            }
            tx.commit().await?;
            Ok::<_, DbErr>(task)
        })
        .await?;

        tracing::info!(task_id = %task.id, key = %task.key, "task created");
        Ok(task)
    }

    pub async fn get(&self, pool: &db::DbPool, id: Uuid) -> Result<TaskDetails> {
        Task::find_details(pool, id)
            .await?
            .ok_or(TaskError::NotFound("Task"))
    }

    pub async fn list(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        filters: &TaskFilters,
    ) -> Result<Vec<Task>> {
        self.ensure_project(pool, project_id).await?;
        Ok(Task::find_by_project_id(pool, project_id, filters).await?)
    }

    pub async fn backlog(&self, pool: &db::DbPool, project_id: Uuid) -> Result<Vec<Task>> {
        self.ensure_project(pool, project_id).await?;
        Ok(Task::find_backlog(pool, project_id).await?)
    }

    pub async fn subtasks(&self, pool: &db::DbPool, id: Uuid) -> Result<Vec<Task>> {
        self.existing(pool, id).await?;
        Ok(Task::find_children(pool, id).await?)
    }

    pub async fn update(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        actor_id: Uuid,
        payload: &UpdateTask,
    ) -> Result<Task> {
        retry_on_sqlite_busy(|| async {
            let tx = db::begin_write(pool).await?;
            let current = self.existing(&tx, id).await?;
            let fields = TaskFields::merged(&current, payload);
            self.validate_fields(&tx, current.project_id, Some(id), &fields)
                .await?;

            let task = Task::update(&tx, id, &fields).await?;
            if let Some(assignee_id) =
                newly_assigned(current.assignee_id, task.assignee_id, actor_id)
            {
                enqueue_assigned(&tx, &task, assignee_id, actor_id).await?;
            }
            tx.commit().await?;
            Ok::<_, TaskError>(task)
        })
        .await
    }

    pub async fn update_status(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Task> {
        self.existing(pool, id).await?;
        Ok(Task::update_status(pool, id, status).await?)
    }

    pub async fn update_assignee(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        actor_id: Uuid,
        assignee_id: Option<Uuid>,
    ) -> Result<Task> {
        retry_on_sqlite_busy(|| async {
            let tx = db::begin_write(pool).await?;
            let current = self.existing(&tx, id).await?;
            if let Some(assignee_id) = assignee_id
                && User::find_by_id(&tx, assignee_id).await?.is_none()
            {
                return Err(TaskError::NotFound("Assignee"));
            }

            let task = Task::update_assignee(&tx, id, assignee_id).await?;
            if let Some(assignee_id) = newly_assigned(current.assignee_id, assignee_id, actor_id)
            {
                enqueue_assigned(&tx, &task, assignee_id, actor_id).await?;
            }
            tx.commit().await?;
            Ok::<_, TaskError>(task)
        })
        .await
    }

    /// Gives each listed task its position in `task_ids` as order index.
    /// Every id must be a task of the project; unlisted tasks keep theirs.
    pub async fn reorder(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        task_ids: &[Uuid],
    ) -> Result<u64> {
        self.ensure_project(pool, project_id).await?;
        for id in task_ids {
            match Task::find_by_id(pool, *id).await? {
                Some(task) if task.project_id == project_id => {}
                _ => {
                    return Err(TaskError::Validation(format!(
                        "Task {id} is not part of this project"
                    )));
                }
            }
        }

        let tx = db::begin_write(pool).await?;
        let updated = Task::reorder(&tx, project_id, task_ids).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn apply_bulk_item(&self, pool: &db::DbPool, item: &BulkTaskUpdate) -> Result<Task> {
        let current = self.existing(pool, item.id).await?;
        if let Some(Some(sprint_id)) = item.sprint_id {
            self.check_sprint(pool, current.project_id, sprint_id).await?;
        }
        Ok(Task::apply_bulk_update(pool, item).await?)
    }

    /// Applies each item on its own. A failing item does not stop the others
    /// and is reported with its error.
    pub async fn bulk_update(
        &self,
        pool: &db::DbPool,
        items: &[BulkTaskUpdate],
    ) -> Vec<BulkUpdateResult> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            match self.apply_bulk_item(pool, item).await {
                Ok(_) => results.push(BulkUpdateResult {
                    id: item.id,
                    ok: true,
                    error: None,
                }),
                Err(err) => {
                    tracing::debug!(task_id = %item.id, error = %err, "bulk update item failed");
                    results.push(BulkUpdateResult {
                        id: item.id,
                        ok: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
        results
    }

    /// Subtasks of a deleted task stay and lose their parent.
    pub async fn delete(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        if Task::delete(&tx, id).await? == 0 {
            return Err(TaskError::NotFound("Task"));
        }
        tx.commit().await?;
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }
}
