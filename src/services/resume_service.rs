use crate::{
    error::{ApiError, Result},
    models::resume::SectionKind,
};
use anyhow::anyhow;
use entity::resume_sections;
use sea_orm::{entity::*, query::*, sea_query::OnConflict, DatabaseConnection};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Resume section storage, one JSON document per `(user, kind)`
pub struct ResumeService {
    db: DatabaseConnection,
}

impl ResumeService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Every stored section for an account
    #[instrument(skip(self))]
    pub async fn get_sections(&self, user_id: Uuid) -> Result<Vec<resume_sections::Model>> {
        let sections = resume_sections::Entity::find()
            .filter(resume_sections::Column::UserId.eq(user_id))
            .order_by_asc(resume_sections::Column::Kind)
            .all(&self.db)
            .await?;

        Ok(sections)
    }

    #[instrument(skip(self))]
    pub async fn get_section(
        &self,
        user_id: Uuid,
        kind: SectionKind,
    ) -> Result<resume_sections::Model> {
        resume_sections::Entity::find()
            .filter(resume_sections::Column::UserId.eq(user_id))
            .filter(resume_sections::Column::Kind.eq(kind.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("No {} section saved", kind.as_str())))
    }

    /// Create or replace a section document
    #[instrument(skip(self, content))]
    pub async fn upsert_section(
        &self,
        user_id: Uuid,
        kind: SectionKind,
        content: serde_json::Value,
    ) -> Result<resume_sections::Model> {
        let now = OffsetDateTime::now_utc();

        let section = resume_sections::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            kind: Set(kind.as_str().to_string()),
            content: Set(content),
            created_at: Set(now),
            updated_at: Set(now),
        };

        resume_sections::Entity::insert(section)
            .on_conflict(
                OnConflict::columns([
                    resume_sections::Column::UserId,
                    resume_sections::Column::Kind,
                ])
                .update_columns([
                    resume_sections::Column::Content,
                    resume_sections::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;

        resume_sections::Entity::find()
            .filter(resume_sections::Column::UserId.eq(user_id))
            .filter(resume_sections::Column::Kind.eq(kind.as_str()))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow!(
                    "Failed to read section after upsert for user {}",
                    user_id
                ))
            })
    }

    #[instrument(skip(self))]
    pub async fn delete_section(&self, user_id: Uuid, kind: SectionKind) -> Result<()> {
        let result = resume_sections::Entity::delete_many()
            .filter(resume_sections::Column::UserId.eq(user_id))
            .filter(resume_sections::Column::Kind.eq(kind.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ApiError::NotFound(format!(
                "No {} section saved",
                kind.as_str()
            )));
        }

        Ok(())
    }
}
