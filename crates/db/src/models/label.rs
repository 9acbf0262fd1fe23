use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::{label, task_label},
    models::ids,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLabel {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateLabel {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl Label {
    fn from_model(model: label::Model, project_id: Uuid) -> Self {
        Self {
            id: model.uuid,
            project_id,
            name: model.name,
            color: model.color,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = label::Entity::find()
            .filter(label::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => {
                let project_id = ids::project_uuid_by_id(db, model.project_id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
                Ok(Some(Self::from_model(model, project_id)))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_project_id<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let records = label::Entity::find()
            .filter(label::Column::ProjectId.eq(project_row_id))
            .order_by_asc(label::Column::Name)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, project_id))
            .collect())
    }

    /// Labels attached to a task, by task row id.
    pub async fn find_for_task_row<C: ConnectionTrait>(
        db: &C,
        task_row_id: i64,
        project_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let label_ids: Vec<i64> = task_label::Entity::find()
            .filter(task_label::Column::TaskId.eq(task_row_id))
            .all(db)
            .await?
            .into_iter()
            .map(|link| link.label_id)
            .collect();
        if label_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = label::Entity::find()
            .filter(label::Column::Id.is_in(label_ids))
            .order_by_asc(label::Column::Name)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, project_id))
            .collect())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        data: &CreateLabel,
    ) -> Result<Self, DbErr> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let now = Utc::now();
        let active = label::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            name: Set(data.name.clone()),
            color: Set(data.color.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, project_id))
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        data: &UpdateLabel,
    ) -> Result<Self, DbErr> {
        let record = label::Entity::find()
            .filter(label::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Label not found".to_string()))?;
        let project_id = ids::project_uuid_by_id(db, record.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let mut active: label::ActiveModel = record.into();
        if let Some(name) = data.name.clone() {
            active.name = Set(name);
        }
        if let Some(color) = data.color.clone() {
            active.color = Set(color);
        }
        active.updated_at = Set(Utc::now().into());

        let updated = active.update(db).await?;
        Ok(Self::from_model(updated, project_id))
    }

    /// Detaches the label from every task, then deletes it.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let Some(label_row_id) = ids::label_id_by_uuid(db, id).await? else {
            return Ok(0);
        };
        task_label::Entity::delete_many()
            .filter(task_label::Column::LabelId.eq(label_row_id))
            .exec(db)
            .await?;
        let result = label::Entity::delete_by_id(label_row_id).exec(db).await?;
        Ok(result.rows_affected)
    }
}
