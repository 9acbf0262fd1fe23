use std::{sync::Arc, time::Duration};

use db::{
    DBService, DbErr,
    entities::event_outbox,
    events::{
        EVENT_PROJECT_MEMBER_ADDED, EVENT_SPRINT_COMPLETED, EVENT_SPRINT_STARTED,
        EVENT_TASK_ASSIGNED, EVENT_TASK_COMMENTED, EVENT_WORKSPACE_MEMBER_ADDED,
        MemberAddedPayload, SprintEventPayload, TaskAssignedPayload, TaskCommentedPayload,
    },
    models::{
        event_outbox::EventOutbox, notification::CreateNotification,
        project_member::ProjectMember,
    },
};
use tokio::{sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use super::notification::content;

#[path = "events/sink.rs"]
mod sink;
#[path = "events/types.rs"]
pub mod types;

pub use sink::{NotificationSink, StoredNotificationSink};
pub use types::EventError;

const OUTBOX_POLL_INTERVAL: Duration = Duration::from_millis(250);
const OUTBOX_BATCH_LIMIT: u64 = 100;
const OUTBOX_MAX_ATTEMPTS: i32 = 5;

/// Turns outbox rows into notifications.
#[derive(Clone)]
pub struct EventService {
    db: DBService,
    sink: Arc<dyn NotificationSink>,
    flush_lock: Arc<Mutex<()>>,
}

/// Who hears about a comment: the assignee and the reporter, never the
/// author, and nobody twice.
fn comment_recipients(payload: &TaskCommentedPayload) -> Vec<Uuid> {
    let mut recipients = Vec::with_capacity(2);
    if let Some(assignee_id) = payload.assignee_id
        && assignee_id != payload.author_id
    {
        recipients.push(assignee_id);
    }
    if payload.reporter_id != payload.author_id && Some(payload.reporter_id) != payload.assignee_id
    {
        recipients.push(payload.reporter_id);
    }
    recipients
}

impl EventService {
    pub fn new(db: DBService, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            db,
            sink,
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn spawn_outbox_worker(&self) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            service.run_outbox_loop().await;
        })
    }

    async fn run_outbox_loop(&self) {
        loop {
            if let Err(err) = self.flush_pending().await {
                tracing::error!(error = %err, "event outbox flush failed");
            }
            tokio::time::sleep(OUTBOX_POLL_INTERVAL).await;
        }
    }

    /// Dispatches every pending row once. Returns how many were published.
    pub async fn flush_pending(&self) -> Result<usize, EventError> {
        let _guard = self.flush_lock.lock().await;
        let entries =
            EventOutbox::fetch_unpublished(&self.db.pool, OUTBOX_BATCH_LIMIT, OUTBOX_MAX_ATTEMPTS)
                .await?;
        if entries.is_empty() {
            return Ok(0);
        }

        let mut published = 0;
        for entry in entries {
            match self.dispatch_entry(&entry).await {
                Ok(()) => {
                    EventOutbox::mark_published(&self.db.pool, entry.id).await?;
                    published += 1;
                }
                Err(err) => {
                    let err_msg = err.to_string();
                    tracing::warn!(event_id = %entry.uuid, event_type = %entry.event_type, error = %err_msg, "event dispatch failed");
                    EventOutbox::mark_failed(&self.db.pool, entry.id, &err_msg).await?;
                }
            }
        }

        Ok(published)
    }

    async fn dispatch_entry(&self, entry: &event_outbox::Model) -> Result<(), EventError> {
        match entry.event_type.as_str() {
            EVENT_TASK_ASSIGNED => {
                let payload: TaskAssignedPayload = serde_json::from_value(entry.payload.clone())?;
                if payload.assignee_id != payload.actor_id {
                    self.deliver(content::task_assigned(
                        payload.assignee_id,
                        payload.task_id,
                        payload.project_id,
                        &payload.title,
                    ))
                    .await;
                }
            }
            EVENT_TASK_COMMENTED => {
                let payload: TaskCommentedPayload =
                    serde_json::from_value(entry.payload.clone())?;
                for recipient in comment_recipients(&payload) {
                    self.deliver(content::task_commented(
                        recipient,
                        payload.task_id,
                        payload.comment_id,
                        &payload.title,
                    ))
                    .await;
                }
            }
            EVENT_SPRINT_STARTED | EVENT_SPRINT_COMPLETED => {
                let payload: SprintEventPayload = serde_json::from_value(entry.payload.clone())?;
                let started = entry.event_type == EVENT_SPRINT_STARTED;
                for user_id in self.project_member_ids(payload.project_id).await? {
                    let notification = if started {
                        content::sprint_started(
                            user_id,
                            payload.sprint_id,
                            payload.project_id,
                            &payload.name,
                        )
                    } else {
                        content::sprint_completed(
                            user_id,
                            payload.sprint_id,
                            payload.project_id,
                            &payload.name,
                        )
                    };
                    self.deliver(notification).await;
                }
            }
            EVENT_WORKSPACE_MEMBER_ADDED => {
                let payload: MemberAddedPayload = serde_json::from_value(entry.payload.clone())?;
                self.deliver(content::workspace_invitation(
                    payload.user_id,
                    payload.scope_id,
                    &payload.scope_name,
                    &payload.role,
                ))
                .await;
            }
            EVENT_PROJECT_MEMBER_ADDED => {
                let payload: MemberAddedPayload = serde_json::from_value(entry.payload.clone())?;
                self.deliver(content::project_invitation(
                    payload.user_id,
                    payload.scope_id,
                    &payload.scope_name,
                    &payload.role,
                ))
                .await;
            }
            _ => {
                tracing::debug!(event_type = entry.event_type.as_str(), "unknown event type");
            }
        }

        Ok(())
    }

    /// Members of a project that has since been deleted get nothing.
    async fn project_member_ids(&self, project_id: Uuid) -> Result<Vec<Uuid>, EventError> {
        match ProjectMember::list_with_users(&self.db.pool, project_id).await {
            Ok(members) => Ok(members.into_iter().map(|m| m.user.id).collect()),
            Err(DbErr::RecordNotFound(_)) => {
                tracing::debug!(project_id = %project_id, "project gone, skipping sprint event");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A failed delivery is logged and does not affect other recipients.
    async fn deliver(&self, notification: CreateNotification) {
        let user_id = notification.user_id;
        let kind = notification.notification_type;
        if let Err(err) = self.sink.create_notification(notification).await {
            tracing::warn!(user_id = %user_id, notification_type = %kind, error = %err, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use db::{
        models::{
            notification::Notification,
            project::{CreateProject, Project},
            space::{CreateSpace, Space},
            user::{CreateUser, User},
            workspace::{CreateWorkspace, Workspace},
        },
        types::{NotificationType, ProjectRole, UserStatus},
    };

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        delivered: std::sync::Mutex<Vec<CreateNotification>>,
        reject: Option<Uuid>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn create_notification(
            &self,
            notification: CreateNotification,
        ) -> Result<(), EventError> {
            if Some(notification.user_id) == self.reject {
                return Err(EventError::Sink("mailbox full".to_string()));
            }
            self.delivered.lock().unwrap().push(notification);
            Ok(())
        }
    }

    impl RecordingSink {
        fn recipients(&self) -> Vec<(Uuid, NotificationType)> {
            self.delivered
                .lock()
                .unwrap()
                .iter()
                .map(|n| (n.user_id, n.notification_type))
                .collect()
        }
    }

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

    fn commented(author: Uuid, assignee: Option<Uuid>, reporter: Uuid) -> TaskCommentedPayload {
        TaskCommentedPayload {
            task_id: Uuid::new_v4(),
            comment_id: Uuid::new_v4(),
            author_id: author,
            assignee_id: assignee,
            reporter_id: reporter,
            title: "Ship".to_string(),
        }
    }

    #[test]
    fn comment_recipients_skip_author_and_duplicates() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(comment_recipients(&commented(a, Some(b), c)), vec![b, c]);
        assert_eq!(comment_recipients(&commented(a, Some(a), c)), vec![c]);
        assert_eq!(comment_recipients(&commented(a, Some(b), a)), vec![b]);
        assert_eq!(comment_recipients(&commented(a, Some(b), b)), vec![b]);
        assert_eq!(comment_recipients(&commented(a, None, a)), Vec::<Uuid>::new());
    }

    #[tokio::test]
    async fn sprint_events_reach_every_project_member() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let lead = user(&db, "lead@example.com").await;
        let dev = user(&db, "dev@example.com").await;
        let workspace = Workspace::create(
            &db.pool,
            &CreateWorkspace {
                name: "Acme".to_string(),
                description: None,
                icon: None,
                color: None,
            },
            lead.id,
        )
        .await
        .unwrap();
        let space = Space::create(
            &db.pool,
            workspace.id,
            &CreateSpace {
                name: "Eng".to_string(),
                description: None,
                icon: None,
                color: None,
            },
        )
        .await
        .unwrap();
        let project = Project::create(
            &db.pool,
            space.id,
            &CreateProject {
                name: "Tracker".to_string(),
                key: "TRK".to_string(),
                description: None,
                icon: None,
                color: None,
                lead_id: None,
            },
        )
        .await
        .unwrap();
        ProjectMember::create(&db.pool, project.id, lead.id, ProjectRole::Lead)
            .await
            .unwrap();
        ProjectMember::create(&db.pool, project.id, dev.id, ProjectRole::Member)
            .await
            .unwrap();

        EventOutbox::enqueue_payload(
            &db.pool,
            EVENT_SPRINT_STARTED,
            "sprint",
            Uuid::new_v4(),
            &SprintEventPayload {
                sprint_id: Uuid::new_v4(),
                project_id: project.id,
                name: "Sprint 1".to_string(),
            },
        )
        .await
        .unwrap();

        let sink = Arc::new(RecordingSink {
            reject: Some(lead.id),
            ..Default::default()
        });
        let service = EventService::new(db.clone(), sink.clone());
        assert_eq!(service.flush_pending().await.unwrap(), 1);

        // The lead's delivery failed, the developer still got theirs.
        assert_eq!(
            sink.recipients(),
            vec![(dev.id, NotificationType::SprintStarted)]
        );
        assert!(
            EventOutbox::fetch_unpublished(&db.pool, 10, OUTBOX_MAX_ATTEMPTS)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn undecodable_payload_is_marked_failed() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        EventOutbox::enqueue(
            &db.pool,
            EVENT_TASK_ASSIGNED,
            "task",
            Uuid::new_v4(),
            serde_json::json!({ "task_id": "not-a-uuid" }),
        )
        .await
        .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let service = EventService::new(db.clone(), sink.clone());
        assert_eq!(service.flush_pending().await.unwrap(), 0);

        let pending = EventOutbox::fetch_unpublished(&db.pool, 10, OUTBOX_MAX_ATTEMPTS)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());
        assert!(sink.recipients().is_empty());
    }

    #[tokio::test]
    async fn stored_sink_writes_inbox_rows() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let actor = user(&db, "actor@example.com").await;
        let assignee = user(&db, "assignee@example.com").await;
        EventOutbox::enqueue_payload(
            &db.pool,
            EVENT_TASK_ASSIGNED,
            "task",
            Uuid::new_v4(),
            &TaskAssignedPayload {
                task_id: Uuid::new_v4(),
                project_id: Uuid::new_v4(),
                assignee_id: assignee.id,
                actor_id: actor.id,
                title: "Ship it".to_string(),
            },
        )
        .await
        .unwrap();
        EventOutbox::enqueue_payload(
            &db.pool,
            EVENT_WORKSPACE_MEMBER_ADDED,
            "workspace",
            Uuid::new_v4(),
            &MemberAddedPayload {
                scope_id: Uuid::new_v4(),
                user_id: assignee.id,
                scope_name: "Acme".to_string(),
                role: "MEMBER".to_string(),
            },
        )
        .await
        .unwrap();

        let service = EventService::new(
            db.clone(),
            Arc::new(StoredNotificationSink::new(db.clone())),
        );
        assert_eq!(service.flush_pending().await.unwrap(), 2);
        assert_eq!(service.flush_pending().await.unwrap(), 0);

        let inbox = Notification::find_for_user(&db.pool, assignee.id, false)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 2);
        let assigned = inbox
            .iter()
            .find(|n| n.notification_type == NotificationType::TaskAssigned)
            .unwrap();
        assert_eq!(assigned.title, "Task Assigned");
        assert_eq!(assigned.message, "You have been assigned to task: Ship it");
        assert!(
            Notification::find_for_user(&db.pool, actor.id, false)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
