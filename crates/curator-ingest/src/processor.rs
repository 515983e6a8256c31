//! Per-item unit of work of the add-children batch.

use curator_core::models::{
    ChildCreationRequest, CreatedEntitySet, EntityId, FileRecord, FileStatus, Media, NewMedia,
    NewNode, Node, Term, ViolationReport,
};
use curator_core::AppError;
use curator_db::{load_required, EntityCreator, EntityLoader, Repository, UnitOfWork};
use std::sync::Arc;

use crate::field::FieldResolver;
use crate::validation::ValidationAggregator;

/// What one successful item contributes to the batch.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub created: CreatedEntitySet,
    pub violations: ViolationReport,
}

pub struct BatchItemProcessor {
    repository: Arc<dyn Repository>,
    acting_user: EntityId,
}

impl BatchItemProcessor {
    pub fn new(repository: Arc<dyn Repository>, acting_user: EntityId) -> Self {
        Self {
            repository,
            acting_user,
        }
    }

    pub fn acting_user(&self) -> EntityId {
        self.acting_user
    }

    /// Creates the child node and media for one upload.
    ///
    /// All writes happen in one unit of work. On failure the unit of work is
    /// rolled back before the error is returned; errors without an HTTP
    /// status are wrapped as status 500 with the original kept as source.
    #[tracing::instrument(
        skip(self, item),
        fields(parent_id = item.parent_id, file_id = item.upload.file_reference.target_id)
    )]
    pub async fn process(&self, item: &ChildCreationRequest) -> Result<ItemOutcome, AppError> {
        let mut uow = self.repository.begin().await.map_err(AppError::into_http)?;

        match self.create_entities(&mut *uow, item).await {
            Ok(outcome) => {
                uow.commit().await.map_err(AppError::into_http)?;
                tracing::info!(
                    child_id = outcome.created.child.id,
                    media_id = outcome.created.media.id,
                    "Child record created"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(error = %rollback_err, "Failed to roll back batch item");
                }
                tracing::warn!(error = %e, "Batch item failed");
                Err(e.into_http())
            }
        }
    }

    async fn create_entities(
        &self,
        uow: &mut dyn UnitOfWork,
        item: &ChildCreationRequest,
    ) -> Result<ItemOutcome, AppError> {
        let file_id = item.upload.file_reference.target_id;
        let mut file = load_required::<FileRecord, _>(&mut *uow, file_id).await?;

        if uow.mark_permanent(file.id).await? != 1 {
            return Err(AppError::Persistence(format!(
                "Failed to update file '{}' to be permanent.",
                file.id
            )));
        }
        file.status = FileStatus::Permanent;

        let child = self.create_child(uow, item, &file).await?;
        let media = self.create_media(uow, item, &file, &child).await?;

        let violations = ValidationAggregator::classify(&[&file, &child, &media]);

        Ok(ItemOutcome {
            created: CreatedEntitySet { file, child, media },
            violations,
        })
    }

    async fn create_child(
        &self,
        uow: &mut dyn UnitOfWork,
        item: &ChildCreationRequest,
        file: &FileRecord,
    ) -> Result<Node, AppError> {
        let parent = load_required::<Node, _>(&mut *uow, item.parent_id).await?;
        let node_type = uow.node_type(&item.child_type).await?.ok_or_else(|| {
            AppError::NotFound(format!("Node type '{}' does not exist", item.child_type))
        })?;

        // An unknown model term leaves the field empty.
        let model = match item.model_tag {
            Some(tid) if node_type.has_model_field => EntityLoader::<Term>::load(&mut *uow, tid)
                .await?
                .map(|term| term.id),
            _ => None,
        };

        let saved = EntityCreator::<Node>::create(
            &mut *uow,
            NewNode {
                node_type: node_type.id,
                title: file.filename.clone(),
                member_of: Some(parent.id),
                model,
                owner_id: self.acting_user,
                published: true,
            },
        )
        .await?;

        if !saved.is_new() {
            return Err(AppError::Persistence(format!(
                "Failed to create child node for file '{}'.",
                file.id
            )));
        }
        Ok(saved.entity)
    }

    async fn create_media(
        &self,
        uow: &mut dyn UnitOfWork,
        item: &ChildCreationRequest,
        file: &FileRecord,
        child: &Node,
    ) -> Result<Media, AppError> {
        let media_type = uow.media_type(&item.media_type).await?.ok_or_else(|| {
            AppError::NotFound(format!("Media type '{}' does not exist", item.media_type))
        })?;
        let field = FieldResolver::media_source_field(&mut *uow, &media_type).await?;

        let mut usage = Vec::new();
        if media_type.has_usage_field {
            for tid in &item.media_use_tags {
                if let Some(term) = EntityLoader::<Term>::load(&mut *uow, *tid).await? {
                    usage.push(term.id);
                }
            }
        }

        let saved = EntityCreator::<Media>::create(
            &mut *uow,
            NewMedia {
                media_type: media_type.id,
                name: file.filename.clone(),
                media_of: Some(child.id),
                usage,
                owner_id: self.acting_user,
                published: true,
                source_field: field.name,
                source: item.upload.file_reference.clone(),
            },
        )
        .await?;

        if !saved.is_new() {
            return Err(AppError::Persistence(format!(
                "Failed to create media for file '{}'.",
                file.id
            )));
        }
        Ok(saved.entity)
    }
}
