//! Drives the add-children batch and reports its outcome.

use curator_core::models::{
    BatchResult, ChildBatchParameters, CreatedEntitySet, UploadDescriptor,
};
use curator_core::{AppError, StatusMessenger};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::processor::BatchItemProcessor;

/// Result of a single [`BatchRun::step`].
#[derive(Debug)]
pub enum StepOutcome {
    Processed(Box<CreatedEntitySet>),
    Finished,
}

/// Resumable batch state.
///
/// Serializable so a step-at-a-time scheduler can persist progress between
/// calls. Items are processed in submission order; after the first failure
/// no further item is attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    parameters: ChildBatchParameters,
    uploads: Vec<UploadDescriptor>,
    cursor: usize,
    result: BatchResult,
    failed: bool,
}

impl BatchRun {
    pub fn new(parameters: ChildBatchParameters, uploads: Vec<UploadDescriptor>) -> Self {
        Self {
            parameters,
            uploads,
            cursor: 0,
            result: BatchResult::default(),
            failed: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.failed || self.cursor >= self.uploads.len()
    }

    pub fn succeeded(&self) -> bool {
        !self.failed
    }

    /// `(attempted, total)`
    pub fn progress(&self) -> (usize, usize) {
        (self.cursor, self.uploads.len())
    }

    pub fn result(&self) -> &BatchResult {
        &self.result
    }

    pub fn into_result(self) -> BatchResult {
        self.result
    }

    /// Processes exactly one item.
    pub async fn step(&mut self, processor: &BatchItemProcessor) -> Result<StepOutcome, AppError> {
        if self.is_finished() {
            return Ok(StepOutcome::Finished);
        }

        let upload = self.uploads[self.cursor].clone();
        self.cursor += 1;
        let request = self.parameters.request_for(upload);

        match processor.process(&request).await {
            Ok(outcome) => {
                self.result.record_item(&outcome.violations);
                Ok(StepOutcome::Processed(Box::new(outcome.created)))
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

/// Final state of a batch driven to completion.
#[derive(Debug)]
pub struct BatchReport {
    pub result: BatchResult,
    pub error: Option<AppError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<BatchResult, AppError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result),
        }
    }
}

pub struct BatchCoordinator {
    processor: BatchItemProcessor,
    messenger: Arc<dyn StatusMessenger>,
    base_url: String,
}

impl BatchCoordinator {
    pub fn new(
        processor: BatchItemProcessor,
        messenger: Arc<dyn StatusMessenger>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            messenger,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn processor(&self) -> &BatchItemProcessor {
        &self.processor
    }

    /// Steps a fresh run to completion, then reports it.
    #[tracing::instrument(skip(self, parameters, uploads), fields(parent_id = parameters.parent_id, items = uploads.len()))]
    pub async fn run(
        &self,
        parameters: ChildBatchParameters,
        uploads: Vec<UploadDescriptor>,
    ) -> BatchReport {
        let mut run = BatchRun::new(parameters, uploads);
        self.resume(&mut run).await
    }

    /// Steps an existing run to completion, then reports it.
    pub async fn resume(&self, run: &mut BatchRun) -> BatchReport {
        let mut error = None;
        while !run.is_finished() {
            if let Err(e) = run.step(&self.processor).await {
                let (attempted, total) = run.progress();
                tracing::error!(error = %e, attempted, total, "Add children batch failed");
                error = Some(e);
                break;
            }
        }

        self.finish(run.succeeded(), run.result());
        BatchReport {
            result: run.result().clone(),
            error,
        }
    }

    /// Emits the consolidated status messages of a finished batch.
    pub fn finish(&self, success: bool, result: &BatchResult) {
        if !success {
            self.messenger
                .add_error("Encountered an error when adding children.".to_string());
            return;
        }

        let count = result.processed_count;
        self.messenger.add_status(if count == 1 {
            "Added 1 child record.".to_string()
        } else {
            format!("Added {} child records.", count)
        });

        for (kind, id, violations) in result.violations.iter() {
            let text = if violations == 1 {
                format!(
                    "1 validation error present in bulk created entity of type {}, with ID {}.",
                    kind, id
                )
            } else {
                format!(
                    "{} validation errors present in bulk created entity of type {}, with ID {}.",
                    violations, kind, id
                )
            };
            let link = format!("{}{}", self.base_url, kind.canonical_path(id));
            self.messenger.add_warning(text, Some(link));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::tests::{seeded_repository, upload, MODEL_TERM, PARENT, USE_TERM};
    use curator_core::models::{EntityId, EntityKind, FileRecord, FileStatus, ViolationReport};
    use curator_core::{CollectingMessenger, ErrorMetadata, StatusLevel};
    use curator_db::MemoryRepository;

    fn params() -> ChildBatchParameters {
        ChildBatchParameters {
            parent_id: PARENT,
            child_type: "page".to_string(),
            model_tag: Some(MODEL_TERM),
            media_type: "image".to_string(),
            media_use_tags: vec![USE_TERM],
        }
    }

    fn coordinator(repo: &MemoryRepository) -> (BatchCoordinator, Arc<CollectingMessenger>) {
        let messenger = Arc::new(CollectingMessenger::new());
        let processor = BatchItemProcessor::new(Arc::new(repo.clone()), 1);
        (
            BatchCoordinator::new(processor, messenger.clone(), "http://localhost:8000/"),
            messenger,
        )
    }

    fn uploads(ids: &[EntityId]) -> Vec<UploadDescriptor> {
        ids.iter().map(|id| upload(*id)).collect()
    }

    #[tokio::test]
    async fn test_all_items_succeed() {
        let repo = seeded_repository(&[1, 2, 3]);
        let (coordinator, messenger) = coordinator(&repo);

        let report = coordinator.run(params(), uploads(&[1, 2, 3])).await;
        assert!(report.is_success());
        assert_eq!(report.result.processed_count, 3);
        assert!(report.result.violations.is_empty());

        let titles: Vec<String> = repo
            .children_of(PARENT)
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["page-1.tiff", "page-2.tiff", "page-3.tiff"]);

        let messages = messenger.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "Added 3 child records.");
    }

    #[tokio::test]
    async fn test_stops_at_first_missing_file() {
        let repo = seeded_repository(&[1, 3]);
        let (coordinator, messenger) = coordinator(&repo);

        let report = coordinator.run(params(), uploads(&[1, 2, 3])).await;
        assert_eq!(report.result.processed_count, 1);

        let err = report.error.unwrap();
        assert_eq!(err.http_status_code(), 500);
        assert!(matches!(err.root_cause(), AppError::NotFound(_)));

        assert!(repo.file(1).unwrap().is_permanent());
        assert!(!repo.file(3).unwrap().is_permanent());
        assert_eq!(repo.children_of(PARENT).len(), 1);

        let messages = messenger.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, StatusLevel::Error);
        assert_eq!(messages[0].text, "Encountered an error when adding children.");
    }

    #[tokio::test]
    async fn test_media_failure_keeps_earlier_items() {
        let repo = seeded_repository(&[1, 2, 3]);
        repo.fail_media_creation_for(2);
        let (coordinator, _messenger) = coordinator(&repo);

        let report = coordinator.run(params(), uploads(&[1, 2, 3])).await;
        assert!(!report.is_success());
        assert_eq!(report.result.processed_count, 1);

        assert!(repo.file(1).unwrap().is_permanent());
        assert!(!repo.file(2).unwrap().is_permanent());
        let children = repo.children_of(PARENT);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].title, "page-1.tiff");
        assert_eq!(repo.media_of(children[0].id).len(), 1);
    }

    #[tokio::test]
    async fn test_run_can_be_persisted_between_steps() {
        let repo = seeded_repository(&[1, 2]);
        let (coordinator, _messenger) = coordinator(&repo);

        let mut run = BatchRun::new(params(), uploads(&[1, 2]));
        let outcome = run.step(coordinator.processor()).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Processed(_)));

        let saved = serde_json::to_string(&run).unwrap();
        let mut restored: BatchRun = serde_json::from_str(&saved).unwrap();
        assert_eq!(restored.progress(), (1, 2));

        restored.step(coordinator.processor()).await.unwrap();
        assert!(restored.is_finished());
        assert!(matches!(
            restored.step(coordinator.processor()).await.unwrap(),
            StepOutcome::Finished
        ));
        assert_eq!(restored.into_result().processed_count, 2);
    }

    #[tokio::test]
    async fn test_run_reports_item_violations_as_linked_warnings() {
        let repo = seeded_repository(&[1]);
        repo.add_file(FileRecord {
            id: 1,
            filename: format!("{}.tiff", "x".repeat(295)),
            uri: "public://long.tiff".to_string(),
            mime_type: "image/tiff".to_string(),
            filesize: 1024,
            status: FileStatus::Temporary,
            owner_id: 1,
        });
        let (coordinator, messenger) = coordinator(&repo);

        let report = coordinator.run(params(), uploads(&[1])).await;
        assert!(report.is_success());
        assert_eq!(report.result.processed_count, 1);

        let child = repo.children_of(PARENT).remove(0);
        let media = repo.media_of(child.id).remove(0);
        let counts: Vec<(EntityKind, EntityId, u32)> = report.result.violations.iter().collect();
        assert_eq!(
            counts,
            vec![
                (EntityKind::File, 1, 1),
                (EntityKind::Node, child.id, 1),
                (EntityKind::Media, media.id, 1),
            ]
        );

        let messages = messenger.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].text, "Added 1 child record.");
        let warnings = messenger.with_level(StatusLevel::Warning);
        assert_eq!(warnings.len(), 3);
        assert_eq!(
            warnings[0].text,
            "1 validation error present in bulk created entity of type file, with ID 1."
        );
        assert_eq!(warnings[0].link.as_deref(), Some("http://localhost:8000/file/1"));
        assert_eq!(
            warnings[1].link,
            Some(format!("http://localhost:8000/node/{}", child.id))
        );
        assert_eq!(
            warnings[2].text,
            format!(
                "1 validation error present in bulk created entity of type media, with ID {}.",
                media.id
            )
        );
    }

    #[test]
    fn test_finish_reports_warnings_with_links() {
        let repo = MemoryRepository::new();
        let (coordinator, messenger) = coordinator(&repo);

        let mut violations = ViolationReport::new();
        violations.record(EntityKind::Node, 7, 1);
        violations.record(EntityKind::Media, 8, 3);
        let result = BatchResult {
            processed_count: 1,
            violations,
        };
        coordinator.finish(true, &result);

        let messages = messenger.messages();
        assert_eq!(messages[0].text, "Added 1 child record.");
        assert_eq!(
            messages[1].text,
            "1 validation error present in bulk created entity of type node, with ID 7."
        );
        assert_eq!(messages[1].link.as_deref(), Some("http://localhost:8000/node/7"));
        assert_eq!(
            messages[2].text,
            "3 validation errors present in bulk created entity of type media, with ID 8."
        );
        assert_eq!(messages[2].level, StatusLevel::Warning);
    }
}
