use db::{
    DbErr,
    models::notification::{Notification, NotificationCount},
};
use thiserror::Error;
use uuid::Uuid;

#[path = "notification/content.rs"]
pub mod content;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Notification not found")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, NotificationError>;

/// Read side of a user's inbox. Rows of other users behave as missing.
#[derive(Clone, Default)]
pub struct NotificationService;

impl NotificationService {
    pub fn new() -> Self {
        Self
    }

    pub async fn list(
        &self,
        pool: &db::DbPool,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        Ok(Notification::find_for_user(pool, user_id, unread_only).await?)
    }

    pub async fn count(&self, pool: &db::DbPool, user_id: Uuid) -> Result<NotificationCount> {
        Ok(Notification::count_for_user(pool, user_id).await?)
    }

    pub async fn mark_read(
        &self,
        pool: &db::DbPool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Notification> {
        Notification::mark_read(pool, user_id, id)
            .await?
            .ok_or(NotificationError::NotFound)
    }

    pub async fn mark_all_read(&self, pool: &db::DbPool, user_id: Uuid) -> Result<u64> {
        Ok(Notification::mark_all_read(pool, user_id).await?)
    }

    pub async fn delete(&self, pool: &db::DbPool, user_id: Uuid, id: Uuid) -> Result<()> {
        if Notification::delete(pool, user_id, id).await? == 0 {
            return Err(NotificationError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_all(&self, pool: &db::DbPool, user_id: Uuid) -> Result<u64> {
        Ok(Notification::delete_all(pool, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::user::{CreateUser, User},
        types::UserStatus,
    };

    use super::*;

    async fn user(db: &DBService, email: &str) -> User {
        User::create(
            &db.pool,
            &CreateUser {
                email: email.to_string(),
                name: email.to_string(),
                password_hash: "x".to_string(),
                status: UserStatus::Online,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn inbox_operations_are_scoped_to_the_owner() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = NotificationService::new();
        let alice = user(&db, "alice@example.com").await;
        let bob = user(&db, "bob@example.com").await;

        let first = Notification::create(
            &db.pool,
            &content::task_assigned(alice.id, Uuid::new_v4(), Uuid::new_v4(), "Ship"),
        )
        .await
        .unwrap();
        Notification::create(
            &db.pool,
            &content::sprint_started(alice.id, Uuid::new_v4(), Uuid::new_v4(), "S1"),
        )
        .await
        .unwrap();

        assert!(matches!(
            service.mark_read(&db.pool, bob.id, first.id).await,
            Err(NotificationError::NotFound)
        ));
        assert!(matches!(
            service.delete(&db.pool, bob.id, first.id).await,
            Err(NotificationError::NotFound)
        ));

        let read = service.mark_read(&db.pool, alice.id, first.id).await.unwrap();
        assert!(read.is_read);
        let count = service.count(&db.pool, alice.id).await.unwrap();
        assert_eq!((count.total, count.unread), (2, 1));
        assert_eq!(
            service.list(&db.pool, alice.id, true).await.unwrap().len(),
            1
        );

        assert_eq!(service.mark_all_read(&db.pool, alice.id).await.unwrap(), 1);
        service.delete(&db.pool, alice.id, first.id).await.unwrap();
        assert_eq!(service.delete_all(&db.pool, alice.id).await.unwrap(), 1);
        assert!(service.list(&db.pool, alice.id, false).await.unwrap().is_empty());
    }
}
