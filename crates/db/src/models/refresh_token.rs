use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::{
    entities::refresh_token,
    models::ids,
};

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, DbErr> {
        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let active = refresh_token::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            user_id: Set(user_row_id),
            token_hash: Set(token_hash.to_string()),
            expires_at: Set(expires_at.into()),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self {
            id: model.uuid,
            user_id,
            expires_at: model.expires_at.into(),
        })
    }

    /// Removes the row for `token_hash` and returns it, so a token can be used once.
    pub async fn take<C: ConnectionTrait>(
        db: &C,
        token_hash: &str,
    ) -> Result<Option<Self>, DbErr> {
        let Some(record) = refresh_token::Entity::find()
            .filter(refresh_token::Column::TokenHash.eq(token_hash))
            .one(db)
            .await?
        else {
            return Ok(None);
        };

        refresh_token::Entity::delete_by_id(record.id).exec(db).await?;

        let user_id = ids::user_uuid_by_id(db, record.user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(Some(Self {
            id: record.uuid,
            user_id,
            expires_at: record.expires_at.into(),
        }))
    }

    pub async fn delete_by_hash<C: ConnectionTrait>(
        db: &C,
        token_hash: &str,
    ) -> Result<u64, DbErr> {
        let result = refresh_token::Entity::delete_many()
            .filter(refresh_token::Column::TokenHash.eq(token_hash))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_expired<C: ConnectionTrait>(
        db: &C,
        now: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = refresh_token::Entity::delete_many()
            .filter(refresh_token::Column::ExpiresAt.lt(now))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}
