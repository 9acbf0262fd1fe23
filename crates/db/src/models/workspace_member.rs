use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::workspace_member,
    models::{ids, user::User},
    types::WorkspaceRole,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMember {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMemberWithUser {
    #[serde(flatten)]
    pub member: WorkspaceMember,
    pub user: User,
}

async fn row_ids<C: ConnectionTrait>(
    db: &C,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<(i64, i64), DbErr> {
    let workspace_row_id = ids::workspace_id_by_uuid(db, workspace_id)
        .await?
        .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;
    let user_row_id = ids::user_id_by_uuid(db, user_id)
        .await?
        .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
    Ok((workspace_row_id, user_row_id))
}

impl WorkspaceMember {
    fn from_model(model: workspace_member::Model, workspace_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            workspace_id,
            user_id,
            role: model.role,
            joined_at: model.joined_at.into(),
        }
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let (workspace_row_id, user_row_id) = row_ids(db, workspace_id, user_id).await?;
        let record = workspace_member::Entity::find()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_row_id))
            .filter(workspace_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;
        Ok(record.map(|model| Self::from_model(model, workspace_id, user_id)))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<Self, DbErr> {
        let (workspace_row_id, user_row_id) = row_ids(db, workspace_id, user_id).await?;
        let active = workspace_member::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            workspace_id: Set(workspace_row_id),
            user_id: Set(user_row_id),
            role: Set(role),
            joined_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, workspace_id, user_id))
    }

    pub async fn update_role<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
        user_id: Uuid,
        role: WorkspaceRole,
    ) -> Result<Option<Self>, DbErr> {
        let (workspace_row_id, user_row_id) = row_ids(db, workspace_id, user_id).await?;
        let Some(record) = workspace_member::Entity::find()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_row_id))
            .filter(workspace_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: workspace_member::ActiveModel = record.into();
        active.role = Set(role);
        let updated = active.update(db).await?;
        Ok(Some(Self::from_model(updated, workspace_id, user_id)))
    }

    pub async fn delete<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let (workspace_row_id, user_row_id) = row_ids(db, workspace_id, user_id).await?;
        let result = workspace_member::Entity::delete_many()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_row_id))
            .filter(workspace_member::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn list_with_users<C: ConnectionTrait>(
        db: &C,
        workspace_id: Uuid,
    ) -> Result<Vec<WorkspaceMemberWithUser>, DbErr> {
        let workspace_row_id = ids::workspace_id_by_uuid(db, workspace_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Workspace not found".to_string()))?;
        let records = workspace_member::Entity::find()
            .filter(workspace_member::Column::WorkspaceId.eq(workspace_row_id))
            .order_by_asc(workspace_member::Column::JoinedAt)
            .all(db)
            .await?;

        let users = User::find_by_row_ids(db, records.iter().map(|m| m.user_id).collect())
            .await?;
        Ok(records
            .into_iter()
            .filter_map(|model| {
                let user = users
                    .iter()
                    .find(|(row_id, _)| *row_id == model.user_id)
                    .map(|(_, user)| user.clone())?;
                Some(WorkspaceMemberWithUser {
                    member: Self::from_model(model, workspace_id, user.id),
                    user,
                })
            })
            .collect())
    }

    /// Row ids of the workspaces `user_id` belongs to.
    pub async fn workspace_row_ids_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<Vec<i64>, DbErr> {
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(Vec::new());
        };
        workspace_member::Entity::find()
            .select_only()
            .column(workspace_member::Column::WorkspaceId)
            .filter(workspace_member::Column::UserId.eq(user_row_id))
            .into_tuple()
            .all(db)
            .await
    }
}
