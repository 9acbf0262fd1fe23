use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{space, workspace, workspace_member},
    models::{ids, space::Space},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateWorkspace {
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl Workspace {
    async fn from_model<C: ConnectionTrait>(db: &C, model: workspace::Model) -> Result<Self, DbErr> {
        let owner_id = ids::user_uuid_by_id(db, model.owner_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(Self {
            id: model.uuid,
            name: model.name,
            description: model.description,
            icon: model.icon,
            color: model.color,
            owner_id,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = workspace::Entity::find()
            .filter(workspace::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Workspaces `user_id` is a member of, newest first.
    pub async fn find_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(Vec::new());
        };
        let workspace_ids: Vec<i64> = workspace_member::Entity::find()
            .select_only()
            .column(workspace_member::Column::WorkspaceId)
            .filter(workspace_member::Column::UserId.eq(user_row_id))
            .into_tuple()
            .all(db)
            .await?;
        if workspace_ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = workspace::Entity::find()
            .filter(workspace::Column::Id.is_in(workspace_ids))
            .order_by_desc(workspace::Column::CreatedAt)
            .all(db)
            .await?;
        let mut workspaces = Vec::with_capacity(records.len());
        for model in records {
            workspaces.push(Self::from_model(db, model).await?);
        }
        Ok(workspaces)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateWorkspace,
        owner_id: Uuid,
    ) -> Result<Self, DbErr> {
        let owner_row_id = ids::user_id_by_uuid(db, owner_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let now = Utc::now();
        let active = workspace::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            name: Set(data.name.clone()),
            description: Set(data.description.clone()),
            icon: Set(data.icon.clone()),
            color: Set(data.color.clone()),
            owner_id: Set(owner_row_id),
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
        data: &UpdateWorkspace,
    ) -> Result<Self, DbErr> {
        let record = workspace::Entity::find()
            .filter(workspace::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;

        let mut active: workspace::ActiveModel = record.into();
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
        Self::from_model(db, updated).await
    }

    /// Deletes the workspace with its memberships and every space below it.
    /// Run inside a transaction.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(workspace_row_id) = ids::workspace_id_by_uuid(db, id).await? else {
            return Ok(0);
        };

        let space_ids: Vec<i64> = space::Entity::find()
            .select_only()
            .column(space::Column::Id)
            .filter(space::Column::WorkspaceId.eq(workspace_row_id))
            .into_tuple()
            .all(db)
            .await?;
        Space::delete_rows(db, space_ids).await?;

        workspace_member::Entity::delete_many()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_row_id))
            .exec(db)
            .await?;
        let result = workspace::Entity::delete_by_id(workspace_row_id)
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
