use db::{
    DbErr,
    models::{
        label::{CreateLabel, Label, UpdateLabel},
        project::{CreateProject, Project, UpdateProject},
        project_member::ProjectMember,
        space::{CreateSpace, Space, UpdateSpace},
        workspace::{CreateWorkspace, UpdateWorkspace, Workspace},
        workspace_member::WorkspaceMember,
    },
    types::{ProjectRole, WorkspaceRole},
};
use thiserror::Error;
use uuid::Uuid;

const MIN_KEY_LEN: usize = 2;
const MAX_KEY_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, HierarchyError>;

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(HierarchyError::Validation(format!("{what} name is required")));
    }
    Ok(())
}

/// Uppercases `key` after checking it is 2-10 ASCII letters or digits.
pub fn normalize_project_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.len() < MIN_KEY_LEN || key.len() > MAX_KEY_LEN {
        return Err(HierarchyError::Validation(format!(
            "Project key must be {MIN_KEY_LEN}-{MAX_KEY_LEN} characters"
        )));
    }
    if !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(HierarchyError::Validation(
            "Project key may only contain letters and digits".to_string(),
        ));
    }
    Ok(key.to_ascii_uppercase())
}

/// Workspaces, spaces, projects and project labels. Every delete removes the
/// owned subtree in one transaction.
#[derive(Clone, Default)]
pub struct HierarchyService;

impl HierarchyService {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_workspace(
        &self,
        pool: &db::DbPool,
        owner_id: Uuid,
        payload: &CreateWorkspace,
    ) -> Result<Workspace> {
        require_name(&payload.name, "Workspace")?;
        let tx = db::begin_write(pool).await?;
        let workspace = Workspace::create(&tx, payload, owner_id).await?;
        WorkspaceMember::create(&tx, workspace.id, owner_id, WorkspaceRole::Owner).await?;
        tx.commit().await?;
        tracing::info!(workspace_id = %workspace.id, owner_id = %owner_id, "workspace created");
        Ok(workspace)
    }

    pub async fn get_workspace(&self, pool: &db::DbPool, id: Uuid) -> Result<Workspace> {
        Workspace::find_by_id(pool, id)
            .await?
            .ok_or(HierarchyError::NotFound("Workspace"))
    }

    pub async fn list_workspaces_for_user(
        &self,
        pool: &db::DbPool,
        user_id: Uuid,
    ) -> Result<Vec<Workspace>> {
        Ok(Workspace::find_for_user(pool, user_id).await?)
    }

    pub async fn update_workspace(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        payload: &UpdateWorkspace,
    ) -> Result<Workspace> {
        if let Some(name) = payload.name.as_deref() {
            require_name(name, "Workspace")?;
        }
        self.get_workspace(pool, id).await?;
        Ok(Workspace::update(pool, id, payload).await?)
    }

    pub async fn delete_workspace(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        let rows = Workspace::delete(&tx, id).await?;
        if rows == 0 {
            return Err(HierarchyError::NotFound("Workspace"));
        }
        tx.commit().await?;
        tracing::info!(workspace_id = %id, "workspace deleted");
        Ok(())
    }

    pub async fn create_space(
        &self,
        pool: &db::DbPool,
        workspace_id: Uuid,
        payload: &CreateSpace,
    ) -> Result<Space> {
        require_name(&payload.name, "Space")?;
        self.get_workspace(pool, workspace_id).await?;
        Ok(Space::create(pool, workspace_id, payload).await?)
    }

    pub async fn get_space(&self, pool: &db::DbPool, id: Uuid) -> Result<Space> {
        Space::find_by_id(pool, id)
            .await?
            .ok_or(HierarchyError::NotFound("Space"))
    }

    pub async fn list_spaces(&self, pool: &db::DbPool, workspace_id: Uuid) -> Result<Vec<Space>> {
        self.get_workspace(pool, workspace_id).await?;
        Ok(Space::find_by_workspace_id(pool, workspace_id).await?)
    }

    pub async fn update_space(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        payload: &UpdateSpace,
    ) -> Result<Space> {
        if let Some(name) = payload.name.as_deref() {
            require_name(name, "Space")?;
        }
        self.get_space(pool, id).await?;
        Ok(Space::update(pool, id, payload).await?)
    }

    pub async fn delete_space(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        if Space::delete(&tx, id).await? == 0 {
            return Err(HierarchyError::NotFound("Space"));
        }
        tx.commit().await?;
        tracing::info!(space_id = %id, "space deleted");
        Ok(())
    }

    /// Creates the project and makes `creator_id` its LEAD member.
    pub async fn create_project(
        &self,
        pool: &db::DbPool,
        space_id: Uuid,
        creator_id: Uuid,
        payload: &CreateProject,
    ) -> Result<Project> {
        require_name(&payload.name, "Project")?;
        let key = normalize_project_key(&payload.key)?;
        self.get_space(pool, space_id).await?;
        if Project::key_exists_in_space(pool, space_id, &key, None).await? {
            return Err(HierarchyError::AlreadyExists(format!(
                "Project key {key} is already used in this space"
            )));
        }

        let payload = CreateProject {
            key,
            ..payload.clone()
        };
        let tx = db::begin_write(pool).await?;
        let project = Project::create(&tx, space_id, &payload).await?;
        ProjectMember::create(&tx, project.id, creator_id, ProjectRole::Lead).await?;
        tx.commit().await?;
        tracing::info!(project_id = %project.id, key = %project.key, "project created");
        Ok(project)
    }

    pub async fn get_project(&self, pool: &db::DbPool, id: Uuid) -> Result<Project> {
        Project::find_by_id(pool, id)
            .await?
            .ok_or(HierarchyError::NotFound("Project"))
    }

    pub async fn list_projects(&self, pool: &db::DbPool, space_id: Uuid) -> Result<Vec<Project>> {
        self.get_space(pool, space_id).await?;
        Ok(Project::find_by_space_id(pool, space_id).await?)
    }

    /// Changing the key leaves existing task keys as they are.
    pub async fn update_project(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        payload: &UpdateProject,
    ) -> Result<Project> {
        if let Some(name) = payload.name.as_deref() {
            require_name(name, "Project")?;
        }
        let existing = self.get_project(pool, id).await?;
        let key = match payload.key.as_deref() {
            Some(key) => {
                let key = normalize_project_key(key)?;
                if Project::key_exists_in_space(pool, existing.space_id, &key, Some(id)).await? {
                    return Err(HierarchyError::AlreadyExists(format!(
                        "Project key {key} is already used in this space"
                    )));
                }
                Some(key)
            }
            None => None,
        };
        let payload = UpdateProject {
            key,
            ..payload.clone()
        };
        match Project::update(pool, id, &payload).await {
            Ok(project) => Ok(project),
            Err(DbErr::RecordNotFound(_)) => Err(HierarchyError::NotFound("User")),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete_project(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        if Project::delete(&tx, id).await? == 0 {
            return Err(HierarchyError::NotFound("Project"));
        }
        tx.commit().await?;
        tracing::info!(project_id = %id, "project deleted");
        Ok(())
    }

    pub async fn create_label(
        &self,
        pool: &db::DbPool,
        project_id: Uuid,
        payload: &CreateLabel,
    ) -> Result<Label> {
        require_name(&payload.name, "Label")?;
        self.get_project(pool, project_id).await?;
        Ok(Label::create(pool, project_id, payload).await?)
    }

    pub async fn list_labels(&self, pool: &db::DbPool, project_id: Uuid) -> Result<Vec<Label>> {
        self.get_project(pool, project_id).await?;
        Ok(Label::find_by_project_id(pool, project_id).await?)
    }

    pub async fn get_label(&self, pool: &db::DbPool, id: Uuid) -> Result<Label> {
        Label::find_by_id(pool, id)
            .await?
            .ok_or(HierarchyError::NotFound("Label"))
    }

    pub async fn update_label(
        &self,
        pool: &db::DbPool,
        id: Uuid,
        payload: &UpdateLabel,
    ) -> Result<Label> {
        if let Some(name) = payload.name.as_deref() {
            require_name(name, "Label")?;
        }
        self.get_label(pool, id).await?;
        Ok(Label::update(pool, id, payload).await?)
    }

    pub async fn delete_label(&self, pool: &db::DbPool, id: Uuid) -> Result<()> {
        let tx = db::begin_write(pool).await?;
        if Label::delete(&tx, id).await? == 0 {
            return Err(HierarchyError::NotFound("Label"));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            task::{CreateTask, Task, TaskFields},
            user::{CreateUser, User},
        },
        types::UserStatus,
    };

    use super::*;

    async fn user(db: &DBService, email: &str) -> User {
        User::create(
            &db.pool,
            &CreateUser {
                email: email.to_string(),
                name: "Owner".to_string(),
                password_hash: "x".to_string(),
                status: UserStatus::Online,
            },
        )
        .await
        .unwrap()
    }

    fn workspace_payload(name: &str) -> CreateWorkspace {
        CreateWorkspace {
            name: name.to_string(),
            description: None,
            icon: None,
            color: None,
        }
    }

    fn space_payload() -> CreateSpace {
        CreateSpace {
            name: "Engineering".to_string(),
            description: None,
            icon: None,
            color: None,
        }
    }

    fn project_payload(key: &str) -> CreateProject {
        CreateProject {
            name: "Tracker".to_string(),
            key: key.to_string(),
            description: None,
            icon: None,
            color: None,
            lead_id: None,
        }
    }

    #[test]
    fn project_keys_are_validated_and_uppercased() {
        assert_eq!(normalize_project_key(" abc ").unwrap(), "ABC");
        assert_eq!(normalize_project_key("Q4PLAN").unwrap(), "Q4PLAN");
        assert!(normalize_project_key("A").is_err());
        assert!(normalize_project_key("ABCDEFGHIJK").is_err());
        assert!(normalize_project_key("AB-C").is_err());
    }

    #[tokio::test]
    async fn creator_becomes_owner_member() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = HierarchyService::new();
        let owner = user(&db, "owner@example.com").await;

        let ws = service
            .create_workspace(&db.pool, owner.id, &workspace_payload("Acme"))
            .await
            .unwrap();
        let member = WorkspaceMember::find(&db.pool, ws.id, owner.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(member.role, WorkspaceRole::Owner);
        assert_eq!(ws.owner_id, owner.id);

        let listed = service
            .list_workspaces_for_user(&db.pool, owner.id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_in_space_is_rejected() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = HierarchyService::new();
        let owner = user(&db, "owner@example.com").await;
        let ws = service
            .create_workspace(&db.pool, owner.id, &workspace_payload("Acme"))
            .await
            .unwrap();
        let space = service
            .create_space(&db.pool, ws.id, &space_payload())
            .await
            .unwrap();

        let project = service
            .create_project(&db.pool, space.id, owner.id, &project_payload("abc"))
            .await
            .unwrap();
        assert_eq!(project.key, "ABC");
        let lead = ProjectMember::find(&db.pool, project.id, owner.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lead.role, ProjectRole::Lead);

        let err = service
            .create_project(&db.pool, space.id, owner.id, &project_payload("ABC"))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn deleting_a_workspace_removes_the_whole_tree() {
        let db = DBService::new("sqlite::memory:").await.unwrap();
        let service = HierarchyService::new();
        let owner = user(&db, "owner@example.com").await;
        let ws = service
            .create_workspace(&db.pool, owner.id, &workspace_payload("Acme"))
            .await
            .unwrap();
        let space = service
            .create_space(&db.pool, ws.id, &space_payload())
            .await
            .unwrap();
        let project = service
            .create_project(&db.pool, space.id, owner.id, &project_payload("ABC"))
            .await
            .unwrap();
        let label = service
            .create_label(
                &db.pool,
                project.id,
                &CreateLabel {
                    name: "bug".to_string(),
                    color: "#ff0000".to_string(),
                },
            )
            .await
            .unwrap();
        let fields = TaskFields::from_create(&CreateTask {
            title: "first".to_string(),
            label_ids: vec![label.id],
            ..Default::default()
        });
        let task = Task::create(&db.pool, project.id, owner.id, &fields)
            .await
            .unwrap();

        service.delete_workspace(&db.pool, ws.id).await.unwrap();

        assert!(matches!(
            service.get_workspace(&db.pool, ws.id).await,
            Err(HierarchyError::NotFound("Workspace"))
        ));
        assert!(Space::find_by_id(&db.pool, space.id).await.unwrap().is_none());
        assert!(Project::find_by_id(&db.pool, project.id).await.unwrap().is_none());
        assert!(Label::find_by_id(&db.pool, label.id).await.unwrap().is_none());
        assert!(Task::find_by_id(&db.pool, task.id).await.unwrap().is_none());
        assert!(
            WorkspaceMember::find(&db.pool, ws.id, owner.id)
                .await
                .is_err()
        );

        let err = service.delete_workspace(&db.pool, ws.id).await.unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound("Workspace")));
    }
}
