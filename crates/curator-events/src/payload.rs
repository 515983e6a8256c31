//! Payload builders for emitted events.
//!
//! A builder receives the changed entity, the acting user and the action
//! configuration, and returns the flat dictionary that becomes the message
//! body. The plain builder copies the configuration; the derivative builder
//! resolves the source file and the callback URLs.

use async_trait::async_trait;
use curator_core::models::{
    ActionConfig, EventPayload, EventSubject, GenerateDerivativeConfig, User, CONFIG_ONLY_KEYS,
};
use curator_core::AppError;
use curator_db::ContentLookup;
use std::sync::Arc;

use crate::token::{expand_tokens, Clock, TokenContext};
use crate::url::UrlGenerator;

#[async_trait]
pub trait EventPayloadBuilder: Send + Sync {
    async fn build(
        &self,
        subject: &EventSubject,
        user: &User,
        config: &ActionConfig,
    ) -> Result<EventPayload, AppError>;
}

/// Payload equal to the action configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmitEventPayload;

#[async_trait]
impl EventPayloadBuilder for EmitEventPayload {
    async fn build(
        &self,
        _subject: &EventSubject,
        _user: &User,
        config: &ActionConfig,
    ) -> Result<EventPayload, AppError> {
        Ok(EventPayload::new(config.to_map()?))
    }
}

pub struct GenerateDerivativePayload {
    lookup: Arc<dyn ContentLookup>,
    urls: UrlGenerator,
    clock: Arc<dyn Clock>,
}

impl GenerateDerivativePayload {
    pub fn new(lookup: Arc<dyn ContentLookup>, urls: UrlGenerator, clock: Arc<dyn Clock>) -> Self {
        Self {
            lookup,
            urls,
            clock,
        }
    }

    fn derivative_config(config: &ActionConfig) -> Result<GenerateDerivativeConfig, AppError> {
        match config {
            ActionConfig::GenerateDerivative(c) => Ok(c.clone().normalized()),
            ActionConfig::Emit(_) => Err(AppError::Configuration(
                "Derivative payloads need a derivative action configuration".to_string(),
            )),
        }
    }
}

#[async_trait]
impl EventPayloadBuilder for GenerateDerivativePayload {
    #[tracing::instrument(skip_all, fields(subject.id = subject.id()))]
    async fn build(
        &self,
        subject: &EventSubject,
        user: &User,
        config: &ActionConfig,
    ) -> Result<EventPayload, AppError> {
        let derivative = Self::derivative_config(config)?;
        let node = subject.as_node().ok_or_else(|| {
            AppError::Configuration(format!(
                "Derivatives can only be generated for nodes, got {} {}",
                subject.kind(),
                subject.id()
            ))
        })?;

        let mut payload = EmitEventPayload.build(subject, user, config).await?;

        let source_term = self
            .lookup
            .term_for_uri(&derivative.source_term_uri)
            .await?
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "Could not locate source term with uri {}",
                    derivative.source_term_uri
                ))
            })?;

        let source_media = self
            .lookup
            .media_with_term(node.id, source_term.id)
            .await?
            .ok_or_else(|| AppError::Configuration("Could not locate source media".to_string()))?;

        let source_file = self
            .lookup
            .source_file(&source_media)
            .await?
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "Could not locate source file for media {}",
                    source_media.id
                ))
            })?;
        payload.set("source_uri", self.urls.download_url(&source_file)?);

        let derivative_term = self
            .lookup
            .term_for_uri(&derivative.derivative_term_uri)
            .await?
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "Could not locate derivative term with uri {}",
                    derivative.derivative_term_uri
                ))
            })?;

        payload.set(
            "destination_uri",
            self.urls.destination_uri(
                node.id,
                &derivative.destination_media_type,
                derivative_term.id,
            ),
        );

        let context = TokenContext::new(self.clock.now())
            .with_node(node)
            .with_media(&source_media)
            .with_term(&derivative_term);
        payload.set(
            "file_upload_uri",
            format!(
                "{}://{}",
                derivative.scheme,
                expand_tokens(&derivative.path, &context)
            ),
        );

        for key in CONFIG_ONLY_KEYS {
            payload.remove(key);
        }

        tracing::debug!(
            node.id = node.id,
            media.id = source_media.id,
            file.id = source_file.id,
            "Built derivative payload"
        );
        Ok(payload)
    }
}

/// Picks the builder matching an action configuration.
pub fn builder_for(
    config: &ActionConfig,
    lookup: Arc<dyn ContentLookup>,
    urls: UrlGenerator,
    clock: Arc<dyn Clock>,
) -> Arc<dyn EventPayloadBuilder> {
    match config {
        ActionConfig::Emit(_) => Arc::new(EmitEventPayload),
        ActionConfig::GenerateDerivative(_) => {
            Arc::new(GenerateDerivativePayload::new(lookup, urls, clock))
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::{TimeZone, Utc};
    use curator_core::models::{FileRecord, FileReference, FileStatus, Media, Node, Term};
    use curator_db::MemoryRepository;

    use crate::token::FixedClock;

    pub const NODE: i64 = 42;
    pub const ORIGINAL_FILE_URI: &str = "http://pcdm.org/use#OriginalFile";
    pub const SERVICE_FILE_URI: &str = "http://pcdm.org/use#ServiceFile";

    pub fn user() -> User {
        User {
            id: 1,
            name: "admin".to_string(),
            roles: vec!["administrator".to_string()],
        }
    }

    pub fn node() -> Node {
        Node {
            id: NODE,
            node_type: "islandora_object".to_string(),
            title: "Letter".to_string(),
            member_of: None,
            model: None,
            owner_id: 1,
            published: true,
        }
    }

    pub fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap(),
        ))
    }

    pub fn urls() -> UrlGenerator {
        UrlGenerator::new("http://localhost:8000").unwrap()
    }

    /// A node with one original-file media, plus both usage terms.
    pub fn repository() -> MemoryRepository {
        let repo = MemoryRepository::new();
        repo.add_node(node());
        repo.add_term(Term {
            id: 10,
            vocabulary: "islandora_media_use".to_string(),
            name: "Original File".to_string(),
            external_uri: Some(ORIGINAL_FILE_URI.to_string()),
        });
        repo.add_term(Term {
            id: 11,
            vocabulary: "islandora_media_use".to_string(),
            name: "Service File".to_string(),
            external_uri: Some(SERVICE_FILE_URI.to_string()),
        });
        repo.add_file(FileRecord {
            id: 5,
            filename: "letter.tiff".to_string(),
            uri: "fedora://2024-03/letter.tiff".to_string(),
            mime_type: "image/tiff".to_string(),
            filesize: 2048,
            status: FileStatus::Permanent,
            owner_id: 1,
        });
        repo.add_media(Media {
            id: 7,
            media_type: "file".to_string(),
            name: "letter.tiff".to_string(),
            media_of: Some(NODE),
            usage: vec![10],
            owner_id: 1,
            published: true,
            source_field: "field_media_file".to_string(),
            source: FileReference::new(5),
        });
        repo
    }

    pub fn derivative_config() -> GenerateDerivativeConfig {
        let mut config = GenerateDerivativeConfig::with_defaults("public");
        config.source_term_uri = ORIGINAL_FILE_URI.to_string();
        config.derivative_term_uri = SERVICE_FILE_URI.to_string();
        config.mimetype = "image/jpeg".to_string();
        config.args = "-quality 80".to_string();
        config.destination_media_type = "image".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use curator_core::models::{EmitEventConfig, EventKind};

    fn builder(repo: &curator_db::MemoryRepository) -> GenerateDerivativePayload {
        GenerateDerivativePayload::new(Arc::new(repo.clone()), urls(), clock())
    }

    #[tokio::test]
    async fn test_emit_payload_copies_configuration() {
        let config = ActionConfig::Emit(EmitEventConfig {
            queue: "islandora-indexing-fcrepo".to_string(),
            event: EventKind::Update,
        });
        let payload = EmitEventPayload
            .build(&EventSubject::Node(node()), &user(), &config)
            .await
            .unwrap();
        assert_eq!(payload.get_str("queue"), Some("islandora-indexing-fcrepo"));
        assert_eq!(payload.event_kind(), Some("Update"));
    }

    #[tokio::test]
    async fn test_derivative_payload_fields() {
        let repo = repository();
        let config = ActionConfig::GenerateDerivative(derivative_config());
        let payload = builder(&repo)
            .build(&EventSubject::Node(node()), &user(), &config)
            .await
            .unwrap();

        assert_eq!(
            payload.source_uri(),
            Some("http://localhost:8000/files/fedora/2024-03/letter.tiff")
        );
        assert_eq!(
            payload.destination_uri(),
            Some("http://localhost:8000/node/42/media/image/term/11")
        );
        assert_eq!(payload.file_upload_uri(), Some("public://2024-03/42.bin"));
        assert_eq!(payload.get_str("mimetype"), Some("image/jpeg"));
        assert_eq!(payload.get_str("args"), Some("-quality 80"));
        assert_eq!(payload.event_kind(), Some("Generate Derivative"));
        for key in CONFIG_ONLY_KEYS {
            assert!(!payload.contains_key(key), "{key} should be stripped");
        }
    }

    #[tokio::test]
    async fn test_derivative_payload_is_byte_stable() {
        let repo = repository();
        let config = ActionConfig::GenerateDerivative(derivative_config());
        let subject = EventSubject::Node(node());
        let builder = builder(&repo);

        let first = builder.build(&subject, &user(), &config).await.unwrap();
        let second = builder.build(&subject, &user(), &config).await.unwrap();
        assert_eq!(first.to_bytes().unwrap(), second.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn test_custom_path_contains_node_id() {
        let repo = repository();
        let mut config = derivative_config();
        config.path = "/[date:custom:Y]/[node:nid].bin".to_string();
        let payload = builder(&repo)
            .build(
                &EventSubject::Node(node()),
                &user(),
                &ActionConfig::GenerateDerivative(config),
            )
            .await
            .unwrap();
        let upload = payload.file_upload_uri().unwrap();
        assert_eq!(upload, "public://2024/42.bin");
        assert!(upload.contains("42"));
    }

    #[tokio::test]
    async fn test_missing_source_term() {
        let repo = repository();
        let mut config = derivative_config();
        config.source_term_uri = "http://example.org/missing".to_string();
        let err = builder(&repo)
            .build(
                &EventSubject::Node(node()),
                &user(),
                &ActionConfig::GenerateDerivative(config),
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Configuration error: Could not locate source term with uri http://example.org/missing"
        );
    }

    #[tokio::test]
    async fn test_missing_source_media() {
        let repo = repository();
        let mut other = node();
        other.id = 43;
        repo.add_node(other.clone());
        let err = builder(&repo)
            .build(
                &EventSubject::Node(other),
                &user(),
                &ActionConfig::GenerateDerivative(derivative_config()),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Could not locate source media"
        );
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let repo = repository();
        let mut media = repo.media(7).unwrap();
        media.source = curator_core::models::FileReference::new(999);
        repo.add_media(media);
        let err = builder(&repo)
            .build(
                &EventSubject::Node(node()),
                &user(),
                &ActionConfig::GenerateDerivative(derivative_config()),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Could not locate source file for media 7"
        );
    }

    #[tokio::test]
    async fn test_missing_derivative_term() {
        let repo = repository();
        let mut config = derivative_config();
        config.derivative_term_uri = "http://example.org/none".to_string();
        let err = builder(&repo)
            .build(
                &EventSubject::Node(node()),
                &user(),
                &ActionConfig::GenerateDerivative(config),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Could not locate derivative term with uri http://example.org/none"
        );
    }

    #[tokio::test]
    async fn test_non_node_subject_is_rejected() {
        let repo = repository();
        let media = repo.media(7).unwrap();
        let err = builder(&repo)
            .build(
                &EventSubject::Media(media),
                &user(),
                &ActionConfig::GenerateDerivative(derivative_config()),
            )
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
