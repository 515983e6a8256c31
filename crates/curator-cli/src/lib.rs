use anyhow::Context;
use curator_core::models::{EntityId, FileReference, MediaType, UploadDescriptor};
use curator_core::{StatusLevel, StatusMessage, StatusMessenger};
use curator_db::{Repository, UnitOfWork};
use curator_ingest::FieldResolver;
use serde::Serialize;

/// Prints status messages as they arrive; errors go to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMessenger;

impl StatusMessenger for ConsoleMessenger {
    fn add(&self, message: StatusMessage) {
        let line = format_message(&message);
        match message.level {
            StatusLevel::Error => eprintln!("{}", line),
            _ => println!("{}", line),
        }
    }
}

pub fn format_message(message: &StatusMessage) -> String {
    let prefix = match message.level {
        StatusLevel::Status => "status",
        StatusLevel::Warning => "warning",
        StatusLevel::Error => "error",
    };
    match &message.link {
        Some(link) => format!("[{}] {} ({})", prefix, message.text, link),
        None => format!("[{}] {}", prefix, message.text),
    }
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Builds one upload descriptor per file, all targeting the source field of
/// `media_type`.
pub async fn upload_descriptors(
    repository: &dyn Repository,
    media_type: &str,
    file_ids: &[EntityId],
) -> anyhow::Result<Vec<UploadDescriptor>> {
    let mut uow = repository.begin().await?;
    let bundle: Option<MediaType> = uow.media_type(media_type).await?;
    let field = match bundle {
        Some(bundle) => FieldResolver::media_source_field(&mut *uow, &bundle).await,
        None => Err(curator_core::AppError::NotFound(format!(
            "Media type {} does not exist",
            media_type
        ))),
    };
    uow.rollback().await?;
    let field = field?;

    Ok(file_ids
        .iter()
        .map(|id| UploadDescriptor {
            file_reference: FileReference::new(*id),
            target_field_metadata: field.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::models::Cardinality;
    use curator_db::MemoryRepository;

    #[test]
    fn test_format_message() {
        let warning = StatusMessage {
            level: StatusLevel::Warning,
            text: "1 validation error present".to_string(),
            link: Some("http://localhost:8000/node/5".to_string()),
        };
        assert_eq!(
            format_message(&warning),
            "[warning] 1 validation error present (http://localhost:8000/node/5)"
        );

        let status = StatusMessage {
            level: StatusLevel::Status,
            text: "Added 2 child records.".to_string(),
            link: None,
        };
        assert_eq!(format_message(&status), "[status] Added 2 child records.");
    }

    #[tokio::test]
    async fn test_upload_descriptors_share_source_field() {
        let repo = MemoryRepository::new();
        repo.add_media_type(MediaType {
            id: "image".to_string(),
            label: "Image".to_string(),
            source_plugin: "image".to_string(),
            source_field: None,
            has_usage_field: true,
        });

        let uploads = upload_descriptors(&repo, "image", &[3, 4]).await.unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[1].file_reference.target_id, 4);
        assert_eq!(uploads[0].target_field_metadata.name, "field_media_image");
        assert_eq!(
            uploads[0].target_field_metadata.cardinality,
            Cardinality::Unlimited
        );
    }

    #[tokio::test]
    async fn test_upload_descriptors_unknown_media_type() {
        let repo = MemoryRepository::new();
        let err = upload_descriptors(&repo, "missing", &[1]).await.unwrap_err();
        assert!(err.to_string().contains("Media type missing does not exist"));
    }
}
