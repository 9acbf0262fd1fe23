use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{entities::notification, models::ids, types::NotificationType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCount {
    pub total: u64,
    pub unread: u64,
}

impl Notification {
    fn from_model(model: notification::Model, user_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            user_id,
            notification_type: model.notification_type,
            title: model.title,
            message: model.message,
            is_read: model.is_read,
            data: model.data,
            created_at: model.created_at.into(),
        }
    }

    async fn user_row_id<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<i64, DbErr> {
        ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateNotification,
    ) -> Result<Self, DbErr> {
        let user_row_id = Self::user_row_id(db, data.user_id).await?;
        let active = notification::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            user_id: Set(user_row_id),
            notification_type: Set(data.notification_type),
            title: Set(data.title.clone()),
            message: Set(data.message.clone()),
            is_read: Set(false),
            data: Set(data.data.clone()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, data.user_id))
    }

    /// Newest first.
    pub async fn find_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Self>, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let mut query =
            notification::Entity::find().filter(notification::Column::UserId.eq(user_row_id));
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }
        let records = query
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, user_id))
            .collect())
    }

    pub async fn count_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<NotificationCount, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let total = notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_row_id))
            .count(db)
            .await?;
        let unread = notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_row_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(db)
            .await?;
        Ok(NotificationCount { total, unread })
    }

    /// Marks one of the user's notifications read. `None` when the row does not
    /// exist or belongs to someone else.
    pub async fn mark_read<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let Some(record) = notification::Entity::find()
            .filter(notification::Column::Uuid.eq(id))
            .filter(notification::Column::UserId.eq(user_row_id))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        let mut active: notification::ActiveModel = record.into();
        active.is_read = Set(true);
        let updated = active.update(db).await?;
        Ok(Some(Self::from_model(updated, user_id)))
    }

    pub async fn mark_all_read<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::UserId.eq(user_row_id))
            .filter(notification::Column::IsRead.eq(false))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<u64, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let result = notification::Entity::delete_many()
            .filter(notification::Column::Uuid.eq(id))
            .filter(notification::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_all<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, DbErr> {
        let user_row_id = Self::user_row_id(db, user_id).await?;
        let result = notification::Entity::delete_many()
            .filter(notification::Column::UserId.eq(user_row_id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Deletes read notifications created before `cutoff`.
    pub async fn delete_read_before<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = notification::Entity::delete_many()
            .filter(notification::Column::IsRead.eq(true))
            .filter(notification::Column::CreatedAt.lt(cutoff))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
