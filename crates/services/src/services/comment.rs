use db::{
    DbErr,
    events::{EVENT_TASK_COMMENTED, TaskCommentedPayload},
    models::{
        comment::{Comment, CommentWithAuthor},
        event_outbox::EventOutbox,
        task::Task,
    },
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Only the author can change this comment")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CommentError>;

fn require_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(CommentError::Validation(
            "Comment content is required".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct CommentService;

impl CommentService {
    pub fn new() -> Self {
        Self
    }

    /// Oldest first, each with its author.
    pub async fn list(&self, pool: &db::DbPool, task_id: Uuid) -> Result<Vec<CommentWithAuthor>> {
        if Task::find_by_id(pool, task_id).await?.is_none() {
            return Err(CommentError::NotFound("Task"));
        }
        Ok(Comment::find_by_task_id(pool, task_id).await?)
    }

    pub async fn create(
        &self,
        pool: &db::DbPool,
        task_id: Uuid,
        author_id: Uuid,
        content: &str,
    ) -> Result<CommentWithAuthor> {
        require_content(content)?;
        let task = Task::find_by_id(pool, task_id)
            .await?
            .ok_or(CommentError::NotFound("Task"))?;

        let tx = db::begin_write(pool).await?;
        let comment = Comment::create(&tx, task_id, author_id, content).await?;
        EventOutbox::enqueue_payload(
            &tx,
            EVENT_TASK_COMMENTED,
            "comment",
            comment.id,
            &TaskCommentedPayload {
                task_id,
                comment_id: comment.id,
                author_id,
                assignee_id: task.assignee_id,
                reporter_id: task.reporter_id,
                title: task.title,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(comment.with_author(pool).await?)
    }

    async fn authored(&self, pool: &db::DbPool, id: Uuid, actor_id: Uuid) -> Result<Comment> {
        let comment = Comment::find_by_id(pool, id)
            .await?
            .ok_or(CommentError::NotFound("Comment"))?;
        if comment.author_id != actor_id {
            return Err(CommentError::Unauthorized);
        }
        Ok(comment)
    }

    pub async fn update(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        actor_id: Uuid,
        content: &str,
    ) -> Result<CommentWithAuthor> {
        require_content(content)?;
        self.authored(pool, id, actor_id).await?;
        let comment = Comment::update_content(pool, id, content).await?;
        Ok(comment.with_author(pool).await?)
    }

    pub async fn delete(&self, pool: &db::DbPool, id: Uuid, actor_id: Uuid) -> Result<()> {
        self.authored(pool, id, actor_id).await?;
        Comment::delete(pool, id).await?;
        Ok(())
    }
}
