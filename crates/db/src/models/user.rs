use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, ExprTrait},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{entities::user, types::UserStatus};

/// Public profile. The password hash never leaves this module except through
/// [`User::find_credentials_by_email`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub status: UserStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub status: UserStatus,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub status: Option<UserStatus>,
}

impl User {
    pub(crate) fn from_model(model: user::Model) -> Self {
        Self {
            id: model.uuid,
            email: model.email,
            name: model.name,
            avatar: model.avatar,
            status: model.status,
            last_seen_at: model.last_seen_at.map(Into::into),
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// One page of users ordered by name, optionally narrowed to names or
    /// emails containing `search`. Also returns the total number of matches.
    pub async fn search<C: ConnectionTrait>(
        db: &C,
        search: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Self>, u64), DbErr> {
        let mut query = user::Entity::find();
        if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(user::Column::Name.contains(search))
                    .add(user::Column::Email.contains(search.to_lowercase())),
            );
        }

        let total = query.clone().count(db).await?;
        let records = query
            .order_by_asc(user::Column::Name)
            .order_by_asc(user::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?;
        Ok((records.into_iter().map(Self::from_model).collect(), total))
    }

    pub async fn find_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn find_credentials_by_email<C: ConnectionTrait>(
        db: &C,
        email: &str,
    ) -> Result<Option<(Self, String)>, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(db)
            .await?;
        Ok(record.map(|model| {
            let hash = model.password_hash.clone();
            (Self::from_model(model), hash)
        }))
    }

    pub async fn find_by_row_ids<C: ConnectionTrait>(
        db: &C,
        ids: Vec<i64>,
    ) -> Result<Vec<(i64, Self)>, DbErr> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .order_by_asc(user::Column::Name)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| (model.id, Self::from_model(model)))
            .collect())
    }

    pub async fn create<C: ConnectionTrait>(db: &C, data: &CreateUser) -> Result<Self, DbErr> {
        let now = Utc::now();
        let active = user::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            email: Set(data.email.clone()),
            password_hash: Set(data.password_hash.clone()),
            name: Set(data.name.clone()),
            avatar: Set(None),
            status: Set(data.status),
            last_seen_at: Set(Some(now.into())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateUser,
    ) -> Result<Self, DbErr> {
        let record = user::Entity::find()
            .filter(user::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let mut active: user::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if let Some(avatar) = data.avatar.clone() {
            active.avatar = Set(Some(avatar));
        }
        if let Some(status) = data.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Ok(Self::from_model(updated))
    }

    /// Marks the user online and stamps `last_seen_at`.
    pub async fn mark_seen<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status: UserStatus,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        user::Entity::update_many()
            .col_expr(user::Column::Status, Expr::value(status))
            .col_expr(
                user::Column::LastSeenAt,
                Expr::value(Some(DateTime::<Utc>::from(now))),
            )
            .filter(user::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Stamps `last_seen_at` only if the stored value is older than `stale_before`.
    pub async fn touch_last_seen<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, DbErr> {
        let result = user::Entity::update_many()
            .col_expr(
                user::Column::LastSeenAt,
                Expr::value(Some(DateTime::<Utc>::from(Utc::now()))),
            )
            .filter(user::Column::Uuid.eq(id))
            .filter(
                user::Column::LastSeenAt
                    .is_null()
                    .or(user::Column::LastSeenAt.lt(stale_before)),
            )
            .exec(db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Moves ONLINE users not seen since `cutoff` to AWAY.
    pub async fn mark_inactive_away<C: ConnectionTrait>(
        db: &C,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, DbErr> {
        let result = user::Entity::update_many()
            .col_expr(user::Column::Status, Expr::value(UserStatus::Away))
            .filter(user::Column::Status.eq(UserStatus::Online))
            .filter(user::Column::LastSeenAt.lt(cutoff))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    use super::*;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    fn new_user(email: &str) -> CreateUser {
        CreateUser {
            email: email.to_string(),
            name: "Ada".to_string(),
            password_hash: "hash".to_string(),
            status: UserStatus::Online,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_by_storage() {
        let db = setup_db().await;
        User::create(&db, &new_user("ada@example.com")).await.unwrap();
        assert!(User::create(&db, &new_user("ada@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn search_pages_through_matching_users() {
        let db = setup_db().await;
        for (name, email) in [
            ("Grace", "grace@navy.mil"),
            ("Ada", "ada@example.com"),
            ("Alan", "alan@example.com"),
            ("Edsger", "ew@tue.nl"),
        ] {
            User::create(
                &db,
                &CreateUser {
                    name: name.to_string(),
                    ..new_user(email)
                },
            )
            .await
            .unwrap();
        }

        let (page, total) = User::search(&db, None, 2, 0).await.unwrap();
        assert_eq!(total, 4);
        let names: Vec<_> = page.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Ada", "Alan"]);

        let (page, total) = User::search(&db, None, 2, 2).await.unwrap();
        assert_eq!(total, 4);
        let names: Vec<_> = page.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Edsger", "Grace"]);

        let (page, total) = User::search(&db, Some("EXAMPLE"), 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert!(page.iter().all(|u| u.email.ends_with("@example.com")));

        let (page, total) = User::search(&db, Some("gra"), 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "Grace");

        let (page, total) = User::search(&db, Some("  "), 10, 0).await.unwrap();
        assert_eq!((page.len(), total), (4, 4));
    }

    #[tokio::test]
    async fn update_only_touches_supplied_fields() {
        let db = setup_db().await;
        let user = User::create(&db, &new_user("ada@example.com")).await.unwrap();

        let updated = User::update(
            &db,
            user.id,
            &UpdateUser {
                status: Some(UserStatus::Busy),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.status, UserStatus::Busy);

        let (_, hash) = User::find_credentials_by_email(&db, "ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hash, "hash");
    }

    #[tokio::test]
    async fn inactive_online_users_move_to_away() {
        let db = setup_db().await;
        let stale = User::create(&db, &new_user("stale@example.com")).await.unwrap();
        let fresh = User::create(&db, &new_user("fresh@example.com")).await.unwrap();

        user::Entity::update_many()
            .col_expr(
                user::Column::LastSeenAt,
                Expr::value(Some(Utc::now() - Duration::hours(2))),
            )
            .filter(user::Column::Uuid.eq(stale.id))
            .exec(&db)
            .await
            .unwrap();

        let moved = User::mark_inactive_away(&db, Utc::now() - Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(moved, 1);

        let stale = User::find_by_id(&db, stale.id).await.unwrap().unwrap();
        let fresh = User::find_by_id(&db, fresh.id).await.unwrap().unwrap();
        assert_eq!(stale.status, UserStatus::Away);
        assert_eq!(fresh.status, UserStatus::Online);
    }

    #[tokio::test]
    async fn touch_last_seen_skips_recent_users() {
        let db = setup_db().await;
        let user = User::create(&db, &new_user("ada@example.com")).await.unwrap();

        let touched = User::touch_last_seen(&db, user.id, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert!(!touched);
    }
}
