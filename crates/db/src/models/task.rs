use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
    sea_query::{Expr, Order},
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use crate::types::{TaskPriority, TaskStatus, TaskType};
use crate::{
    entities::{comment, task, task_label},
    models::{ids, label::Label, project::Project, user::User},
};

/// Distinguishes an absent field from an explicit `null`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub key: String,
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub story_points: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub order_index: i32,
    pub label_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetails {
    #[serde(flatten)]
    pub task: Task,
    pub labels: Vec<Label>,
    pub assignee: Option<User>,
    pub reporter: Option<User>,
}

impl std::ops::Deref for TaskDetails {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    pub assignee_id: Option<Uuid>,
    pub sprint_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub story_points: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub label_ids: Vec<Uuid>,
}

/// Partial update. Nullable references use `Some(None)` to clear.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub task_type: Option<TaskType>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub sprint_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "nullable")]
    pub story_points: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub order_index: Option<i32>,
    pub label_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkTaskUpdate {
    pub id: Uuid,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub sprint_id: Option<Option<Uuid>>,
    pub order_index: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSortField {
    #[default]
    OrderIndex,
    CreatedAt,
    UpdatedAt,
    Priority,
    DueDate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Vec<TaskStatus>,
    pub priority: Vec<TaskPriority>,
    pub task_type: Vec<TaskType>,
    pub assignee_ids: Vec<Uuid>,
    pub sprint_id: Option<Uuid>,
    pub label_ids: Vec<Uuid>,
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort_by: TaskSortField,
    pub sort_order: SortOrder,
}

/// Fully resolved column values for an insert or a whole-row update.
#[derive(Debug, Clone)]
pub struct TaskFields {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub task_type: TaskType,
    pub assignee_id: Option<Uuid>,
    pub sprint_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub story_points: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub order_index: i32,
    pub label_ids: Vec<Uuid>,
}

impl TaskFields {
    pub fn from_create(data: &CreateTask) -> Self {
        Self {
            title: data.title.clone(),
            description: data.description.clone(),
            status: data.status.unwrap_or_default(),
            priority: data.priority.unwrap_or_default(),
            task_type: data.task_type.unwrap_or_default(),
            assignee_id: data.assignee_id,
            sprint_id: data.sprint_id,
            parent_id: data.parent_id,
            story_points: data.story_points,
            due_date: data.due_date,
            order_index: 0,
            label_ids: data.label_ids.clone(),
        }
    }

    /// Current values of `task` with `changes` applied on top.
    pub fn merged(task: &Task, changes: &UpdateTask) -> Self {
        Self {
            title: changes.title.clone().unwrap_or_else(|| task.title.clone()),
            description: changes
                .description
                .clone()
                .unwrap_or_else(|| task.description.clone()),
            status: changes.status.unwrap_or(task.status),
            priority: changes.priority.unwrap_or(task.priority),
            task_type: changes.task_type.unwrap_or(task.task_type),
            assignee_id: changes.assignee_id.unwrap_or(task.assignee_id),
            sprint_id: changes.sprint_id.unwrap_or(task.sprint_id),
            parent_id: changes.parent_id.unwrap_or(task.parent_id),
            story_points: changes.story_points.unwrap_or(task.story_points),
            due_date: changes.due_date.unwrap_or(task.due_date),
            order_index: changes.order_index.unwrap_or(task.order_index),
            label_ids: changes
                .label_ids
                .clone()
                .unwrap_or_else(|| task.label_ids.clone()),
        }
    }
}

struct ResolvedRefs {
    assignee_id: Option<i64>,
    sprint_id: Option<i64>,
    parent_id: Option<i64>,
    label_ids: Vec<i64>,
}

async fn resolve_refs<C: ConnectionTrait>(
    db: &C,
    fields: &TaskFields,
) -> Result<ResolvedRefs, DbErr> {
    let assignee_id = match fields.assignee_id {
        Some(id) => Some(
            ids::user_id_by_uuid(db, id)
                .await?
                .ok_or(DbErr::RecordNotFound("User not found".to_string()))?,
        ),
        None => None,
    };
    let sprint_id = match fields.sprint_id {
        Some(id) => Some(
            ids::sprint_id_by_uuid(db, id)
                .await?
                .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?,
        ),
        None => None,
    };
    let parent_id = match fields.parent_id {
        Some(id) => Some(
            ids::task_id_by_uuid(db, id)
                .await?
                .ok_or(DbErr::RecordNotFound("Parent task not found".to_string()))?,
        ),
        None => None,
    };
    let mut label_ids = Vec::with_capacity(fields.label_ids.len());
    for id in &fields.label_ids {
        let row_id = ids::label_id_by_uuid(db, *id)
            .await?
            .ok_or(DbErr::RecordNotFound("Label not found".to_string()))?;
        if !label_ids.contains(&row_id) {
            label_ids.push(row_id);
        }
    }
    Ok(ResolvedRefs {
        assignee_id,
        sprint_id,
        parent_id,
        label_ids,
    })
}

async fn replace_labels<C: ConnectionTrait>(
    db: &C,
    task_row_id: i64,
    label_ids: &[i64],
) -> Result<(), DbErr> {
    task_label::Entity::delete_many()
        .filter(task_label::Column::TaskId.eq(task_row_id))
        .exec(db)
        .await?;
    let now = Utc::now();
    for label_id in label_ids {
        let link = task_label::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            task_id: Set(task_row_id),
            label_id: Set(*label_id),
            created_at: Set(now.into()),
            ..Default::default()
        };
        link.insert(db).await?;
    }
    Ok(())
}

impl Task {
    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let reporter_id = ids::user_uuid_by_id(db, model.reporter_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let sprint_id = match model.sprint_id {
            Some(id) => ids::sprint_uuid_by_id(db, id).await?,
            None => None,
        };
        let parent_id = match model.parent_id {
            Some(id) => ids::task_uuid_by_id(db, id).await?,
            None => None,
        };
        let assignee_id = match model.assignee_id {
            Some(id) => ids::user_uuid_by_id(db, id).await?,
            None => None,
        };

        let label_row_ids: Vec<i64> = task_label::Entity::find()
            .select_only()
            .column(task_label::Column::LabelId)
            .filter(task_label::Column::TaskId.eq(model.id))
            .order_by_asc(task_label::Column::Id)
            .into_tuple()
            .all(db)
            .await?;
        let mut label_ids = Vec::with_capacity(label_row_ids.len());
        for row_id in label_row_ids {
            if let Some(uuid) = ids::label_uuid_by_id(db, row_id).await? {
                label_ids.push(uuid);
            }
        }

        Ok(Self {
            id: model.uuid,
            key: model.key,
            project_id,
            sprint_id,
            parent_id,
            assignee_id,
            reporter_id,
            title: model.title,
            description: model.description,
            status: model.status,
            priority: model.priority,
            task_type: model.task_type,
            story_points: model.story_points,
            due_date: model.due_date.map(Into::into),
            order_index: model.order_index,
            label_ids,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    async fn from_models<C: ConnectionTrait>(
        db: &C,
        models: Vec<task::Model>,
    ) -> Result<Vec<Self>, DbErr> {
        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            tasks.push(Self::from_model(db, model).await?);
        }
        Ok(tasks)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_details<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<TaskDetails>, DbErr> {
        let Some(record) = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };
        let task_row_id = record.id;
        let task = Self::from_model(db, record).await?;
        let labels = Label::find_for_task_row(db, task_row_id, task.project_id).await?;
        let assignee = match task.assignee_id {
            Some(id) => User::find_by_id(db, id).await?,
            None => None,
        };
        let reporter = User::find_by_id(db, task.reporter_id).await?;
        Ok(Some(TaskDetails {
            task,
            labels,
            assignee,
            reporter,
        }))
    }

    pub async fn find_by_project_id<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        filters: &TaskFilters,
    ) -> Result<Vec<Self>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let mut query = task::Entity::find().filter(task::Column::ProjectId.eq(project_row_id));

        if !filters.status.is_empty() {
            query = query.filter(task::Column::Status.is_in(filters.status.clone()));
        }
        if !filters.priority.is_empty() {
            query = query.filter(task::Column::Priority.is_in(filters.priority.clone()));
        }
        if !filters.task_type.is_empty() {
            query = query.filter(task::Column::TaskType.is_in(filters.task_type.clone()));
        }
        if !filters.assignee_ids.is_empty() {
            let mut assignee_rows = Vec::with_capacity(filters.assignee_ids.len());
            for id in &filters.assignee_ids {
                if let Some(row_id) = ids::user_id_by_uuid(db, *id).await? {
                    assignee_rows.push(row_id);
                }
            }
            if assignee_rows.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(task::Column::AssigneeId.is_in(assignee_rows));
        }
        if let Some(sprint_id) = filters.sprint_id {
            let Some(sprint_row_id) = ids::sprint_id_by_uuid(db, sprint_id).await? else {
                return Ok(Vec::new());
            };
            query = query.filter(task::Column::SprintId.eq(sprint_row_id));
        }
        if !filters.label_ids.is_empty() {
            let mut label_rows = Vec::with_capacity(filters.label_ids.len());
            for id in &filters.label_ids {
                if let Some(row_id) = ids::label_id_by_uuid(db, *id).await? {
                    label_rows.push(row_id);
                }
            }
            let labelled: Vec<i64> = task_label::Entity::find()
                .select_only()
                .column(task_label::Column::TaskId)
                .filter(task_label::Column::LabelId.is_in(label_rows))
                .distinct()
                .into_tuple()
                .all(db)
                .await?;
            if labelled.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(task::Column::Id.is_in(labelled));
        }
        if let Some(search) = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            query = query.filter(
                Condition::any()
                    .add(task::Column::Title.contains(search))
                    .add(task::Column::Description.contains(search)),
            );
        }

        let order = match filters.sort_order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };

        // Priority is stored as text, so its rank order is applied after loading.
        if filters.sort_by == TaskSortField::Priority {
            let records = query.order_by_asc(task::Column::OrderIndex).all(db).await?;
            let mut tasks = Self::from_models(db, records).await?;
            tasks.sort_by_key(|task| task.priority.rank());
            if filters.sort_order == SortOrder::Desc {
                tasks.reverse();
            }
            let offset = filters.offset.unwrap_or(0) as usize;
            let limit = filters.limit.map(|l| l as usize).unwrap_or(usize::MAX);
            return Ok(tasks.into_iter().skip(offset).take(limit).collect());
        }

        let column = match filters.sort_by {
            TaskSortField::OrderIndex | TaskSortField::Priority => task::Column::OrderIndex,
            TaskSortField::CreatedAt => task::Column::CreatedAt,
            TaskSortField::UpdatedAt => task::Column::UpdatedAt,
            TaskSortField::DueDate => task::Column::DueDate,
        };
        query = query
            .order_by(column, order)
            .order_by_asc(task::Column::Id);
        if let Some(offset) = filters.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = filters.limit {
            query = query.limit(limit);
        }

        let records = query.all(db).await?;
        Self::from_models(db, records).await
    }

    pub async fn find_by_sprint_id<C: ConnectionTrait>(
        db: &C,
        sprint_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let sprint_row_id = ids::sprint_id_by_uuid(db, sprint_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?;
        let records = task::Entity::find()
            .filter(task::Column::SprintId.eq(sprint_row_id))
            .order_by_asc(task::Column::OrderIndex)
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?;
        Self::from_models(db, records).await
    }

    /// Tasks of the project that are not planned into any sprint.
    pub async fn find_backlog<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let records = task::Entity::find()
            .filter(task::Column::ProjectId.eq(project_row_id))
            .filter(task::Column::SprintId.is_null())
            .order_by_asc(task::Column::OrderIndex)
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?;
        Self::from_models(db, records).await
    }

    pub async fn find_children<C: ConnectionTrait>(
        db: &C,
        parent_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let parent_row_id = ids::task_id_by_uuid(db, parent_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
        let records = task::Entity::find()
            .filter(task::Column::ParentId.eq(parent_row_id))
            .order_by_asc(task::Column::OrderIndex)
            .order_by_asc(task::Column::Id)
            .all(db)
            .await?;
        Self::from_models(db, records).await
    }

    /// Open, assigned tasks with a due date inside `[from, to]`.
    pub async fn find_open_due_between<C: ConnectionTrait>(
        db: &C,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let records = task::Entity::find()
            .filter(task::Column::AssigneeId.is_not_null())
            .filter(task::Column::Status.is_not_in([TaskStatus::Done, TaskStatus::Cancelled]))
            .filter(task::Column::DueDate.gte(from))
            .filter(task::Column::DueDate.lte(to))
            .order_by_asc(task::Column::DueDate)
            .all(db)
            .await?;
        Self::from_models(db, records).await
    }

    /// Open, assigned tasks whose due date is before `now`.
    pub async fn find_open_overdue<C: ConnectionTrait>(
        db: &C,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let records = task::Entity::find()
            .filter(task::Column::AssigneeId.is_not_null())
            .filter(task::Column::Status.is_not_in([TaskStatus::Done, TaskStatus::Cancelled]))
            .filter(task::Column::DueDate.lt(now))
            .order_by_asc(task::Column::DueDate)
            .all(db)
            .await?;
        Self::from_models(db, records).await
    }

    /// Allocates the next key of the project and inserts the task.
    /// The counter bump and the insert must run in one transaction; the bump
    /// is the first statement so the transaction writes before it reads.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        reporter_id: Uuid,
        fields: &TaskFields,
    ) -> Result<Self, DbErr> {
        let (project_row_id, key) = Project::next_task_key(db, project_id).await?;
        let reporter_row_id = ids::user_id_by_uuid(db, reporter_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let refs = resolve_refs(db, fields).await?;

        let now = Utc::now();
        let active = task::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            sprint_id: Set(refs.sprint_id),
            parent_id: Set(refs.parent_id),
            assignee_id: Set(refs.assignee_id),
            reporter_id: Set(reporter_row_id),
            key: Set(key),
            title: Set(fields.title.clone()),
            description: Set(fields.description.clone()),
            status: Set(fields.status),
            priority: Set(fields.priority),
            task_type: Set(fields.task_type),
            story_points: Set(fields.story_points),
            due_date: Set(fields.due_date.map(Into::into)),
            order_index: Set(fields.order_index),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        replace_labels(db, model.id, &refs.label_ids).await?;
        Self::from_model(db, model).await
    }

    /// Writes every field. The key and the reporter never change.
    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        fields: &TaskFields,
    ) -> Result<Self, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
        let refs = resolve_refs(db, fields).await?;
        let task_row_id = record.id;

        let mut active: task::ActiveModel = record.into();
        active.title = Set(fields.title.clone());
        active.description = Set(fields.description.clone());
        active.status = Set(fields.status);
        active.priority = Set(fields.priority);
        active.task_type = Set(fields.task_type);
        active.assignee_id = Set(refs.assignee_id);
        active.sprint_id = Set(refs.sprint_id);
        active.parent_id = Set(refs.parent_id);
        active.story_points = Set(fields.story_points);
        active.due_date = Set(fields.due_date.map(Into::into));
        active.order_index = Set(fields.order_index);
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        replace_labels(db, task_row_id, &refs.label_ids).await?;
        Self::from_model(db, updated).await
    }

    pub async fn update_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Self, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;

        let mut active: task::ActiveModel = record.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    pub async fn update_assignee<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        assignee_id: Option<Uuid>,
    ) -> Result<Self, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
        let assignee_row_id = match assignee_id {
            Some(id) => Some(
                ids::user_id_by_uuid(db, id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("User not found".to_string()))?,
            ),
            None => None,
        };

        let mut active: task::ActiveModel = record.into();
        active.assignee_id = Set(assignee_row_id);
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    /// Sets `order_index` to each task's position in `task_ids`. Only tasks of
    /// `project_id` are touched; returns how many rows changed.
    pub async fn reorder<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        task_ids: &[Uuid],
    ) -> Result<u64, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let now = DateTime::<Utc>::from(Utc::now());
        let mut updated = 0;
        for (position, task_id) in task_ids.iter().enumerate() {
            let result = task::Entity::update_many()
                .col_expr(task::Column::OrderIndex, Expr::value(position as i32))
                .col_expr(task::Column::UpdatedAt, Expr::value(now))
                .filter(task::Column::Uuid.eq(*task_id))
                .filter(task::Column::ProjectId.eq(project_row_id))
                .exec(db)
                .await?;
            updated += result.rows_affected;
        }
        Ok(updated)
    }

    /// Applies one bulk item. Fields left `None` are untouched.
    pub async fn apply_bulk_update<C: ConnectionTrait>(
        db: &C,
        update: &BulkTaskUpdate,
    ) -> Result<Self, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(update.id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
        let sprint_row_id = match update.sprint_id {
            Some(Some(sprint_id)) => Some(Some(
                ids::sprint_id_by_uuid(db, sprint_id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?,
            )),
            Some(None) => Some(None),
            None => None,
        };

        let mut active: task::ActiveModel = record.into();
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(sprint_row_id) = sprint_row_id {
            active.sprint_id = Set(sprint_row_id);
        }
        if let Some(order_index) = update.order_index {
            active.order_index = Set(order_index);
        }
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    /// Deletes the task with its comments and label links. Subtasks are kept
    /// and lose their parent. Run inside a transaction.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(task_row_id) = ids::task_id_by_uuid(db, id).await? else {
            return Ok(0);
        };
        task::Entity::update_many()
            .col_expr(task::Column::ParentId, Expr::value(None::<i64>))
            .filter(task::Column::ParentId.eq(task_row_id))
            .exec(db)
            .await?;
        comment::Entity::delete_many()
            .filter(comment::Column::TaskId.eq(task_row_id))
            .exec(db)
            .await?;
        task_label::Entity::delete_many()
            .filter(task_label::Column::TaskId.eq(task_row_id))
            .exec(db)
            .await?;
        let result = task::Entity::delete_by_id(task_row_id).exec(db).await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{Database, TransactionTrait};
    use sea_orm_migration::MigratorTrait;

    use super::*;
    use crate::{
        models::{
            project::CreateProject,
            space::{CreateSpace, Space},
            user::CreateUser,
            workspace::{CreateWorkspace, Workspace},
        },
        types::UserStatus,
    };

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn seed_project(db: &sea_orm::DatabaseConnection, key: &str) -> (Uuid, Uuid) {
        let user = User::create(
            db,
            &CreateUser {
                email: format!("{}@example.com", Uuid::new_v4()),
                name: "Reporter".to_string(),
                password_hash: "hash".to_string(),
                status: UserStatus::Online,
            },
        )
        .await
        .unwrap();
        let workspace = Workspace::create(
            db,
            &CreateWorkspace {
                name: "W".to_string(),
                description: None,
                icon: None,
                color: None,
            },
            user.id,
        )
        .await
        .unwrap();
        let space = Space::create(
            db,
            workspace.id,
            &CreateSpace {
                name: "S".to_string(),
                description: None,
                icon: None,
                color: None,
            },
        )
        .await
        .unwrap();
        let project = Project::create(
            db,
            space.id,
            &CreateProject {
                name: "P".to_string(),
                key: key.to_string(),
                description: None,
                icon: None,
                color: None,
                lead_id: None,
            },
        )
        .await
        .unwrap();
        (project.id, user.id)
    }

    fn titled(title: &str) -> TaskFields {
        TaskFields::from_create(&CreateTask {
            title: title.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn keys_follow_the_project_counter() {
        let db = setup_db().await;
        let (project_id, reporter_id) = seed_project(&db, "ABC").await;

        let first = Task::create(&db, project_id, reporter_id, &titled("first"))
            .await
            .unwrap();
        let second = Task::create(&db, project_id, reporter_id, &titled("second"))
            .await
            .unwrap();
        assert_eq!(first.key, "ABC-1");
        assert_eq!(second.key, "ABC-2");
        assert_eq!(first.status, TaskStatus::Backlog);
        assert_eq!(first.priority, TaskPriority::Medium);
        assert_eq!(first.task_type, TaskType::Task);
    }

    #[tokio::test]
    async fn deleted_numbers_are_not_reused() {
        let db = setup_db().await;
        let (project_id, reporter_id) = seed_project(&db, "ABC").await;

        let first = Task::create(&db, project_id, reporter_id, &titled("first"))
            .await
            .unwrap();
        let tx = db.begin().await.unwrap();
        Task::delete(&tx, first.id).await.unwrap();
        tx.commit().await.unwrap();

        let next = Task::create(&db, project_id, reporter_id, &titled("next"))
            .await
            .unwrap();
        assert_eq!(next.key, "ABC-2");
    }

    #[tokio::test]
    async fn reorder_uses_list_positions() {
        let db = setup_db().await;
        let (project_id, reporter_id) = seed_project(&db, "ORD").await;
        let t1 = Task::create(&db, project_id, reporter_id, &titled("t1")).await.unwrap();
        let t2 = Task::create(&db, project_id, reporter_id, &titled("t2")).await.unwrap();
        let t3 = Task::create(&db, project_id, reporter_id, &titled("t3")).await.unwrap();

        let updated = Task::reorder(&db, project_id, &[t3.id, t1.id, t2.id])
            .await
            .unwrap();
        assert_eq!(updated, 3);

        let listed = Task::find_by_project_id(&db, project_id, &TaskFilters::default())
            .await
            .unwrap();
        let keys: Vec<_> = listed.iter().map(|t| (t.id, t.order_index)).collect();
        assert_eq!(keys, vec![(t3.id, 0), (t1.id, 1), (t2.id, 2)]);
    }

    #[tokio::test]
    async fn filters_combine() {
        let db = setup_db().await;
        let (project_id, reporter_id) = seed_project(&db, "FLT").await;

        let mut urgent = titled("Fix login crash");
        urgent.priority = TaskPriority::Urgent;
        urgent.status = TaskStatus::Todo;
        Task::create(&db, project_id, reporter_id, &urgent).await.unwrap();

        let mut low = titled("Polish login copy");
        low.priority = TaskPriority::Low;
        Task::create(&db, project_id, reporter_id, &low).await.unwrap();

        Task::create(&db, project_id, reporter_id, &titled("Unrelated"))
            .await
            .unwrap();

        let search = TaskFilters {
            search: Some("login".to_string()),
            ..Default::default()
        };
        assert_eq!(
            Task::find_by_project_id(&db, project_id, &search)
                .await
                .unwrap()
                .len(),
            2
        );

        let todo_urgent = TaskFilters {
            status: vec![TaskStatus::Todo],
            priority: vec![TaskPriority::Urgent],
            ..Default::default()
        };
        let found = Task::find_by_project_id(&db, project_id, &todo_urgent)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Fix login crash");

        let by_priority = TaskFilters {
            sort_by: TaskSortField::Priority,
            limit: Some(2),
            ..Default::default()
        };
        let found = Task::find_by_project_id(&db, project_id, &by_priority)
            .await
            .unwrap();
        let priorities: Vec<_> = found.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![TaskPriority::Urgent, TaskPriority::Medium]);
    }

    #[tokio::test]
    async fn deleting_a_parent_keeps_subtasks() {
        let db = setup_db().await;
        let (project_id, reporter_id) = seed_project(&db, "SUB").await;
        let parent = Task::create(&db, project_id, reporter_id, &titled("parent"))
            .await
            .unwrap();
        let mut child_fields = titled("child");
        child_fields.parent_id = Some(parent.id);
        let child = Task::create(&db, project_id, reporter_id, &child_fields)
            .await
            .unwrap();

        assert_eq!(Task::find_children(&db, parent.id).await.unwrap().len(), 1);

        let tx = db.begin().await.unwrap();
        assert_eq!(Task::delete(&tx, parent.id).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let child = Task::find_by_id(&db, child.id).await.unwrap().unwrap();
        assert_eq!(child.parent_id, None);
    }

    #[test]
    fn update_payload_distinguishes_null_from_missing() {
        let clear: UpdateTask = serde_json::from_str(r#"{"sprint_id": null}"#).unwrap();
        assert_eq!(clear.sprint_id, Some(None));

        let untouched: UpdateTask = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(untouched.sprint_id, None);
    }
}
