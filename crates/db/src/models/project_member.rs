use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::project_member,
    models::{ids, user::User},
    types::ProjectRole,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMemberWithUser {
    #[serde(flatten)]
    pub member: ProjectMember,
    pub user: User,
}

async fn row_ids<C: ConnectionTrait>(
    db: &C,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<(i64, i64), DbErr> {
    let project_row_id = ids::project_id_by_uuid(db, project_id)
        .await?
        .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
    let user_row_id = ids::user_id_by_uuid(db, user_id)
        .await?
        .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
    Ok((project_row_id, user_row_id))
}

impl ProjectMember {
    fn from_model(model: project_member::Model, project_id: Uuid, user_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            project_id,
            user_id,
            role: model.role,
            joined_at: model.joined_at.into(),
        }
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let (project_row_id, user_row_id) = row_ids(db, project_id, user_id).await?;
        let record = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;
        Ok(record.map(|model| Self::from_model(model, project_id, user_id)))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<Self, DbErr> {
        let (project_row_id, user_row_id) = row_ids(db, project_id, user_id).await?;
        let active = project_member::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            user_id: Set(user_row_id),
            role: Set(role),
            joined_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, project_id, user_id))
    }

    pub async fn update_role<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<Option<Self>, DbErr> {
        let (project_row_id, user_row_id) = row_ids(db, project_id, user_id).await?;
        let Some(record) = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: project_member::ActiveModel = record.into();
        active.role = Set(role);
        let updated = active.update(db).await?;
        Ok(Some(Self::from_model(updated, project_id, user_id)))
    }

    pub async fn delete<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<u64, DbErr> {
        let (project_row_id, user_row_id) = row_ids(db, project_id, user_id).await?;
        let result = project_member::Entity::delete_many()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn list_with_users<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMemberWithUser>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let records = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .order_by_asc(project_member::Column::JoinedAt)
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
                Some(ProjectMemberWithUser {
                    member: Self::from_model(model, project_id, user.id),
                    user,
                })
            })
            .collect())
    }

    /// Row ids of the projects `user_id` belongs to.
    pub async fn project_row_ids_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<Vec<i64>, DbErr> {
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(Vec::new());
        };
        project_member::Entity::find()
            .select_only()
            .column(project_member::Column::ProjectId)
            .filter(project_member::Column::UserId.eq(user_row_id))
            .into_tuple()
            .all(db)
            .await
    }
}
