use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
    sea_query::{Expr, ExprTrait},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{comment, label, project, project_member, sprint, task, task_label},
    models::ids,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub space_id: Uuid,
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub key: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub key: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub lead_id: Option<Uuid>,
}

impl Project {
    async fn from_model<C: ConnectionTrait>(db: &C, model: project::Model) -> Result<Self, DbErr> {
        let space_id = ids::space_uuid_by_id(db, model.space_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Space not found".to_string()))?;
        let lead_id = match model.lead_id {
            Some(id) => ids::user_uuid_by_id(db, id).await?,
            None => None,
        };
        Ok(Self {
            id: model.uuid,
            space_id,
            name: model.name,
            key: model.key,
            description: model.description,
            icon: model.icon,
            color: model.color,
            lead_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_space_id<C: ConnectionTrait>(
        db: &C,
        space_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let space_row_id = ids::space_id_by_uuid(db, space_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Space not found".to_string()))?;
        let records = project::Entity::find()
            .filter(project::Column::SpaceId.eq(space_row_id))
            .order_by_asc(project::Column::Name)
            .all(db)
            .await?;
        let mut projects = Vec::with_capacity(records.len());
        for model in records {
            projects.push(Self::from_model(db, model).await?);
        }
        Ok(projects)
    }

    pub async fn key_exists_in_space<C: ConnectionTrait>(
        db: &C,
        space_id: Uuid,
        key: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, DbErr> {
        let Some(space_row_id) = ids::space_id_by_uuid(db, space_id).await? else {
            return Ok(false);
        };
        let mut query = project::Entity::find()
            .filter(project::Column::SpaceId.eq(space_row_id))
            .filter(project::Column::Key.eq(key));
        if let Some(exclude) = exclude {
            query = query.filter(project::Column::Uuid.ne(exclude));
        }
        Ok(query.one(db).await?.is_some())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        space_id: Uuid,
        data: &CreateProject,
    ) -> Result<Self, DbErr> {
        let space_row_id = ids::space_id_by_uuid(db, space_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Space not found".to_string()))?;
        let lead_row_id = match data.lead_id {
            Some(lead_id) => Some(
                ids::user_id_by_uuid(db, lead_id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("User not found".to_string()))?,
            ),
            None => None,
        };
        let now = Utc::now();
        let active = project::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            space_id: Set(space_row_id),
            name: Set(data.name.clone()),
            key: Set(data.key.clone()),
            description: Set(data.description.clone()),
            icon: Set(data.icon.clone()),
            color: Set(data.color.clone()),
            lead_id: Set(lead_row_id),
            task_seq: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::from_model(db, model).await
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateProject,
    ) -> Result<Self, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let lead_row_id = match data.lead_id {
            Some(lead_id) => Some(
                ids::user_id_by_uuid(db, lead_id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("User not found".to_string()))?,
            ),
            None => None,
        };

        let mut active: project::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if let Some(key) = data.key.clone() {
            active.key = Set(key);
        }
        if let Some(description) = data.description.clone() {
            active.description = Set(Some(description));
        }
        if let Some(icon) = data.icon.clone() {
            active.icon = Set(Some(icon));
        }
        if let Some(color) = data.color.clone() {
            active.color = Set(Some(color));
        }
        if lead_row_id.is_some() {
            active.lead_id = Set(lead_row_id);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    /// Bumps the project's task counter and returns the project's row id with
    /// the key for the new number. One `UPDATE .. RETURNING`, so the write lock
    /// is taken by the first statement of the caller's transaction. The
    /// counter never goes down and numbers are not reused after a delete.
    pub async fn next_task_key<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<(i64, String), DbErr> {
        let updated = project::Entity::update_many()
            .col_expr(
                project::Column::TaskSeq,
                Expr::col(project::Column::TaskSeq).add(1),
            )
            .filter(project::Column::Uuid.eq(project_id))
            .exec_with_returning(db)
            .await?;
        let project = updated
            .into_iter()
            .next()
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        Ok((project.id, format!("{}-{}", project.key, project.task_seq)))
    }

    /// Deletes the project and everything it owns. Run inside a transaction.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, id).await? else {
            return Ok(0);
        };
        Self::delete_rows(db, vec![project_row_id]).await
    }

    pub(crate) async fn delete_rows<C: ConnectionTrait>(
        db: &C,
        project_ids: Vec<i64>,
    ) -> Result<u64, DbErr> {
        if project_ids.is_empty() {
            return Ok(0);
        }

        let task_ids: Vec<i64> = task::Entity::find()
            .select_only()
            .column(task::Column::Id)
            .filter(task::Column::ProjectId.is_in(project_ids.clone()))
            .into_tuple()
            .all(db)
            .await?;
        let label_ids: Vec<i64> = label::Entity::find()
            .select_only()
            .column(label::Column::Id)
            .filter(label::Column::ProjectId.is_in(project_ids.clone()))
            .into_tuple()
            .all(db)
            .await?;

        if !task_ids.is_empty() {
            comment::Entity::delete_many()
                .filter(comment::Column::TaskId.is_in(task_ids.clone()))
                .exec(db)
                .await?;
            task_label::Entity::delete_many()
                .filter(task_label::Column::TaskId.is_in(task_ids.clone()))
                .exec(db)
                .await?;
            task::Entity::update_many()
                .col_expr(task::Column::ParentId, Expr::value(None::<i64>))
                .filter(task::Column::Id.is_in(task_ids.clone()))
                .exec(db)
                .await?;
            task::Entity::delete_many()
                .filter(task::Column::Id.is_in(task_ids))
                .exec(db)
                .await?;
        }
        if !label_ids.is_empty() {
            task_label::Entity::delete_many()
                .filter(task_label::Column::LabelId.is_in(label_ids.clone()))
                .exec(db)
                .await?;
            label::Entity::delete_many()
                .filter(label::Column::Id.is_in(label_ids))
                .exec(db)
                .await?;
        }
        sprint::Entity::delete_many()
            .filter(sprint::Column::ProjectId.is_in(project_ids.clone()))
            .exec(db)
            .await?;
        project_member::Entity::delete_many()
            .filter(project_member::Column::ProjectId.is_in(project_ids.clone()))
            .exec(db)
            .await?;

        let result = project::Entity::delete_many()
            .filter(project::Column::Id.is_in(project_ids))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
