use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{sprint, task},
    models::ids,
    types::{SprintStatus, TaskStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub goal: Option<String>,
    pub status: SprintStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSprint {
    pub name: String,
    pub goal: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateSprint {
    pub name: Option<String>,
    pub goal: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl Sprint {
    fn from_model(model: sprint::Model, project_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            project_id,
            name: model.name,
            goal: model.goal,
            status: model.status,
            start_date: model.start_date.map(Into::into),
            end_date: model.end_date.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn from_model_resolved<C: ConnectionTrait>(
        db: &C,
        model: sprint::Model,
    ) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        Ok(Self::from_model(model, project_id))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = sprint::Entity::find()
            .filter(sprint::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model_resolved(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_project_id<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let records = sprint::Entity::find()
            .filter(sprint::Column::ProjectId.eq(project_row_id))
            .order_by_desc(sprint::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, project_id))
            .collect())
    }

    /// ACTIVE sprints with an end date inside `[from, to]`.
    pub async fn find_active_ending_between<C: ConnectionTrait>(
        db: &C,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let records = sprint::Entity::find()
            .filter(sprint::Column::Status.eq(SprintStatus::Active))
            .filter(sprint::Column::EndDate.gte(from))
            .filter(sprint::Column::EndDate.lte(to))
            .order_by_asc(sprint::Column::EndDate)
            .all(db)
            .await?;
        let mut sprints = Vec::with_capacity(records.len());
        for model in records {
            sprints.push(Self::from_model_resolved(db, model).await?);
        }
        Ok(sprints)
    }

    /// ACTIVE sprints whose end date has already passed.
    pub async fn find_active_overdue<C: ConnectionTrait>(
        db: &C,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, DbErr> {
        let records = sprint::Entity::find()
            .filter(sprint::Column::Status.eq(SprintStatus::Active))
            .filter(sprint::Column::EndDate.lt(now))
            .order_by_asc(sprint::Column::EndDate)
            .all(db)
            .await?;
        let mut sprints = Vec::with_capacity(records.len());
        for model in records {
            sprints.push(Self::from_model_resolved(db, model).await?);
        }
        Ok(sprints)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        data: &CreateSprint,
    ) -> Result<Self, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let now = Utc::now();
        let active = sprint::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            name: Set(data.name.clone()),
            goal: Set(data.goal.clone()),
            status: Set(SprintStatus::Planning),
            start_date: Set(data.start_date.map(Into::into)),
            end_date: Set(data.end_date.map(Into::into)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, project_id))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateSprint,
    ) -> Result<Self, DbErr> {
        let record = sprint::Entity::find()
            .filter(sprint::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?;

        let mut active: sprint::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if let Some(goal) = data.goal.clone() {
            active.goal = Set(Some(goal));
        }
        if let Some(start_date) = data.start_date {
            active.start_date = Set(Some(start_date.into()));
        }
        if let Some(end_date) = data.end_date {
            active.end_date = Set(Some(end_date.into()));
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model_resolved(db, updated).await
    }

    /// Writes the new status and stamps the matching date with `at`.
    /// Moving to ACTIVE stamps `start_date`; moving to COMPLETED stamps `end_date`.
    pub async fn set_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status: SprintStatus,
        at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let record = sprint::Entity::find()
            .filter(sprint::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?;

        let mut active: sprint::ActiveModel = record.into();
        active.status = Set(status);
        match status {
            SprintStatus::Active => active.start_date = Set(Some(at.into())),
            SprintStatus::Completed => active.end_date = Set(Some(at.into())),
            SprintStatus::Planning => {}
        }
        active.updated_at = Set(at.into());

        let updated = active.update(db).await?;
        Self::from_model_resolved(db, updated).await
    }

    /// Moves every task of the sprint that is not DONE to `target`, or to the
    /// backlog when `target` is `None`. Returns the number of moved tasks.
    pub async fn move_unfinished_tasks<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        target: Option<Uuid>,
    ) -> Result<u64, DbErr> {
        let sprint_row_id = ids::sprint_id_by_uuid(db, id)
            .await?
            .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?;
        let target_row_id = match target {
            Some(target) => Some(
                ids::sprint_id_by_uuid(db, target)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Sprint not found".to_string()))?,
            ),
            None => None,
        };

        let result = task::Entity::update_many()
            .col_expr(task::Column::SprintId, Expr::value(target_row_id))
            .col_expr(
                task::Column::UpdatedAt,
                Expr::value(DateTime::<Utc>::from(Utc::now())),
            )
            .filter(task::Column::SprintId.eq(sprint_row_id))
            .filter(task::Column::Status.ne(TaskStatus::Done))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes the sprint. Its tasks go back to the backlog.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(sprint_row_id) = ids::sprint_id_by_uuid(db, id).await? else {
            return Ok(0);
        };
        task::Entity::update_many()
            .col_expr(task::Column::SprintId, Expr::value(None::<i64>))
            .filter(task::Column::SprintId.eq(sprint_row_id))
            .exec(db)
            .await?;
        let result = sprint::Entity::delete_by_id(sprint_row_id).exec(db).await?;
        Ok(result.rows_affected)
    }
}
