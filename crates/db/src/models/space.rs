use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{project, space},
    models::{ids, project::Project},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSpace {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateSpace {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl Space {
    fn from_model(model: space::Model, workspace_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            workspace_id,
            name: model.name,
            description: model.description,
            icon: model.icon,
            color: model.color,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    async fn from_model_resolved<C: ConnectionTrait>(
        db: &C,
        model: space::Model,
    ) -> Result<Self, DbErr> {
        let workspace_id = ids::workspace_uuid_by_id(db, model.workspace_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;
        Ok(Self::from_model(model, workspace_id))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = space::Entity::find()
            .filter(space::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model_resolved(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_workspace_id<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let workspace_row_id = ids::workspace_id_by_uuid(db, workspace_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;
        let records = space::Entity::find()
            .filter(space::Column::WorkspaceId.eq(workspace_row_id))
            .order_by_asc(space::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, workspace_id))
            .collect())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
        data: &CreateSpace,
    ) -> Result<Self, DbErr> {
        let workspace_row_id = ids::workspace_id_by_uuid(db, workspace_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;
        let now = Utc::now();
        let active = space::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            workspace_id: Set(workspace_row_id),
            name: Set(data.name.clone()),
            description: Set(data.description.clone()),
            icon: Set(data.icon.clone()),
            color: Set(data.color.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, workspace_id))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateSpace,
    ) -> Result<Self, DbErr> {
        let record = space::Entity::find()
            .filter(space::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Space not found".to_string()))?;

        let mut active: space::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
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
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Self::from_model_resolved(db, updated).await
    }

    /// Deletes the space and every project below it. Run inside a transaction.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(space_row_id) = ids::space_id_by_uuid(db, id).await? else {
            return Ok(0);
        };
        Self::delete_rows(db, vec![space_row_id]).await
    }

    pub(crate) async fn delete_rows<C: ConnectionTrait>(
        db: &C,
        space_ids: Vec<i64>,
    ) -> Result<u64, DbErr> {
        if space_ids.is_empty() {
            return Ok(0);
        }
        let project_ids: Vec<i64> = project::Entity::find()
            .select_only()
            .column(project::Column::Id)
            .filter(project::Column::SpaceId.is_in(space_ids.clone()))
            .into_tuple()
            .all(db)
            .await?;
        Project::delete_rows(db, project_ids).await?;

        let result = space::Entity::delete_many()
            .filter(space::Column::Id.is_in(space_ids))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
