use async_trait::async_trait;
use db::{
    DBService,
    models::notification::{CreateNotification, Notification},
};

use super::EventError;

/// Delivery end of the dispatcher. The default implementation stores an
/// in-app notification row; other channels plug in here.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn create_notification(&self, notification: CreateNotification) -> Result<(), EventError>;
}

#[derive(Clone)]
pub struct StoredNotificationSink {
    db: DBService,
}

impl StoredNotificationSink {
    pub fn new(db: DBService) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationSink for StoredNotificationSink {
    async fn create_notification(&self, notification: CreateNotification) -> Result<(), EventError> {
        Notification::create(&self.db.pool, &notification).await?;
        Ok(())
    }
}
