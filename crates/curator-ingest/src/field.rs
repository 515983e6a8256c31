use curator_core::models::{Cardinality, EntityKind, FieldDefinition, MediaType};
use curator_core::AppError;
use curator_db::UnitOfWork;

/// Resolves the media field an uploaded file is attached at.
pub struct FieldResolver;

impl FieldResolver {
    /// The configured source field of `media_type`, or the field its source
    /// plugin would create. Cardinality is always unlimited so that the same
    /// definition can be reused for every item of a batch.
    pub async fn media_source_field(
        uow: &mut dyn UnitOfWork,
        media_type: &MediaType,
    ) -> Result<FieldDefinition, AppError> {
        let configured = match &media_type.source_field {
            Some(name) => {
                uow.field_definition(EntityKind::Media, &media_type.id, name)
                    .await?
            }
            None => None,
        };

        let field = configured.unwrap_or_else(|| Self::default_source_field(media_type));
        Ok(field.with_cardinality(Cardinality::Unlimited))
    }

    /// Definition a source plugin creates when the bundle has none.
    pub fn default_source_field(media_type: &MediaType) -> FieldDefinition {
        let field_type = match media_type.source_plugin.as_str() {
            "image" => "image",
            _ => "file",
        };
        FieldDefinition {
            entity_kind: EntityKind::Media,
            bundle: media_type.id.clone(),
            name: media_type
                .source_field
                .clone()
                .unwrap_or_else(|| format!("field_media_{}", media_type.source_plugin)),
            field_type: field_type.to_string(),
            cardinality: Cardinality::Limited(1),
        }
    }
}
