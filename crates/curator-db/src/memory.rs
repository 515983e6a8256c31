//! In-memory repository used by tests and dry runs.
//!
//! A unit of work reads from a private copy of the store and records what it
//! changed. Commit applies only those changes to the shared store, so
//! overlapping units of work keep each other's writes and uncommitted work is
//! never observable. Id sequences are shared and are not rewound by a
//! rollback, matching database sequences.

use async_trait::async_trait;
use curator_core::models::{
    EntityId, EntityKind, FieldDefinition, FileRecord, FileStatus, Media, MediaType, NewMedia,
    NewNode, Node, NodeType, SaveOutcome, Saved, Term, User,
};
use curator_core::AppError;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::repository::{ContentLookup, EntityCreator, EntityLoader, Repository, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Store {
    files: BTreeMap<EntityId, FileRecord>,
    nodes: BTreeMap<EntityId, Node>,
    media: BTreeMap<EntityId, Media>,
    terms: BTreeMap<EntityId, Term>,
    users: BTreeMap<EntityId, User>,
    node_types: BTreeMap<String, NodeType>,
    media_types: BTreeMap<String, MediaType>,
    fields: BTreeMap<(EntityKind, String, String), FieldDefinition>,
}

/// Failures to inject into units of work started after it is set.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// File ids whose permanence update reports zero changed rows.
    pub skip_permanent_update: HashSet<EntityId>,
    /// File ids whose media creation fails.
    pub fail_media_creation: HashSet<EntityId>,
    /// Report node saves as updates instead of inserts.
    pub node_saves_as_update: bool,
    pub fail_commit: bool,
}

#[derive(Clone)]
pub struct MemoryRepository {
    store: Arc<Mutex<Store>>,
    faults: Arc<Mutex<FaultPlan>>,
    next_id: Arc<AtomicI64>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            faults: Arc::new(Mutex::new(FaultPlan::default())),
            next_id: Arc::new(AtomicI64::new(1000)),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults.lock().unwrap_or_else(|e| e.into_inner()) = plan;
    }

    pub fn fail_media_creation_for(&self, file_id: EntityId) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_media_creation
            .insert(file_id);
    }

    pub fn add_file(&self, file: FileRecord) {
        self.store().files.insert(file.id, file);
    }

    pub fn add_node(&self, node: Node) {
        self.store().nodes.insert(node.id, node);
    }

    pub fn add_media(&self, media: Media) {
        self.store().media.insert(media.id, media);
    }

    pub fn add_term(&self, term: Term) {
        self.store().terms.insert(term.id, term);
    }

    pub fn add_user(&self, user: User) {
        self.store().users.insert(user.id, user);
    }

    pub fn add_node_type(&self, node_type: NodeType) {
        self.store().node_types.insert(node_type.id.clone(), node_type);
    }

    pub fn add_media_type(&self, media_type: MediaType) {
        self.store()
            .media_types
            .insert(media_type.id.clone(), media_type);
    }

    pub fn add_field(&self, field: FieldDefinition) {
        let key = (field.entity_kind, field.bundle.clone(), field.name.clone());
        self.store().fields.insert(key, field);
    }

    pub fn file(&self, id: EntityId) -> Option<FileRecord> {
        self.store().files.get(&id).cloned()
    }

    pub fn node(&self, id: EntityId) -> Option<Node> {
        self.store().nodes.get(&id).cloned()
    }

    pub fn media(&self, id: EntityId) -> Option<Media> {
        self.store().media.get(&id).cloned()
    }

    /// Nodes whose `member_of` is `parent_id`, ordered by id.
    pub fn children_of(&self, parent_id: EntityId) -> Vec<Node> {
        self.store()
            .nodes
            .values()
            .filter(|n| n.member_of == Some(parent_id))
            .cloned()
            .collect()
    }

    /// Media attached to `node_id`, ordered by id.
    pub fn media_of(&self, node_id: EntityId) -> Vec<Media> {
        self.store()
            .media
            .values()
            .filter(|m| m.media_of == Some(node_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let working = self.store().clone();
        let faults = self
            .faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        Ok(Box::new(MemoryUnitOfWork {
            working,
            changes: ChangeSet::default(),
            shared: Arc::clone(&self.store),
            next_id: Arc::clone(&self.next_id),
            faults,
        }))
    }
}

#[async_trait]
impl ContentLookup for MemoryRepository {
    async fn term_for_uri(&self, uri: &str) -> Result<Option<Term>, AppError> {
        Ok(self
            .store()
            .terms
            .values()
            .find(|t| t.external_uri.as_deref() == Some(uri))
            .cloned())
    }

    async fn media_with_term(
        &self,
        node_id: EntityId,
        term_id: EntityId,
    ) -> Result<Option<Media>, AppError> {
        Ok(self
            .store()
            .media
            .values()
            .find(|m| m.media_of == Some(node_id) && m.has_usage(term_id))
            .cloned())
    }

    async fn source_file(&self, media: &Media) -> Result<Option<FileRecord>, AppError> {
        Ok(self.store().files.get(&media.source.target_id).cloned())
    }

    async fn load_node(&self, id: EntityId) -> Result<Option<Node>, AppError> {
        Ok(self.node(id))
    }

    async fn load_user(&self, id: EntityId) -> Result<Option<User>, AppError> {
        Ok(self.store().users.get(&id).cloned())
    }
}

/// Ids written by one unit of work.
#[derive(Debug, Default)]
struct ChangeSet {
    files: BTreeSet<EntityId>,
    nodes: BTreeSet<EntityId>,
    media: BTreeSet<EntityId>,
}

struct MemoryUnitOfWork {
    working: Store,
    changes: ChangeSet,
    shared: Arc<Mutex<Store>>,
    next_id: Arc<AtomicI64>,
    faults: FaultPlan,
}

impl MemoryUnitOfWork {
    fn allocate_id(&self) -> EntityId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityLoader<FileRecord> for MemoryUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<FileRecord>, AppError> {
        Ok(self.working.files.get(&id).cloned())
    }
}

#[async_trait]
impl EntityLoader<Node> for MemoryUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Node>, AppError> {
        Ok(self.working.nodes.get(&id).cloned())
    }
}

#[async_trait]
impl EntityLoader<Media> for MemoryUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Media>, AppError> {
        Ok(self.working.media.get(&id).cloned())
    }
}

#[async_trait]
impl EntityLoader<Term> for MemoryUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Term>, AppError> {
        Ok(self.working.terms.get(&id).cloned())
    }
}

#[async_trait]
impl EntityLoader<User> for MemoryUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<User>, AppError> {
        Ok(self.working.users.get(&id).cloned())
    }
}

#[async_trait]
impl EntityCreator<Node> for MemoryUnitOfWork {
    async fn create(&mut self, draft: NewNode) -> Result<Saved<Node>, AppError> {
        let node = Node {
            id: self.allocate_id(),
            node_type: draft.node_type,
            title: draft.title,
            member_of: draft.member_of,
            model: draft.model,
            owner_id: draft.owner_id,
            published: draft.published,
        };
        self.working.nodes.insert(node.id, node.clone());
        self.changes.nodes.insert(node.id);
        let outcome = if self.faults.node_saves_as_update {
            SaveOutcome::Updated
        } else {
            SaveOutcome::New
        };
        Ok(Saved {
            entity: node,
            outcome,
        })
    }
}

#[async_trait]
impl EntityCreator<Media> for MemoryUnitOfWork {
    async fn create(&mut self, draft: NewMedia) -> Result<Saved<Media>, AppError> {
        let file_id = draft.source.target_id;
        if self.faults.fail_media_creation.contains(&file_id) {
            return Err(AppError::Persistence(format!(
                "Unable to save media for file {}",
                file_id
            )));
        }
        let media = Media {
            id: self.allocate_id(),
            media_type: draft.media_type,
            name: draft.name,
            media_of: draft.media_of,
            usage: draft.usage,
            owner_id: draft.owner_id,
            published: draft.published,
            source_field: draft.source_field,
            source: draft.source,
        };
        self.working.media.insert(media.id, media.clone());
        self.changes.media.insert(media.id);
        Ok(Saved::new(media))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn mark_permanent(&mut self, file_id: EntityId) -> Result<u64, AppError> {
        if self.faults.skip_permanent_update.contains(&file_id) {
            return Ok(0);
        }
        match self.working.files.get_mut(&file_id) {
            Some(file) => {
                file.status = FileStatus::Permanent;
                self.changes.files.insert(file_id);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn node_type(&mut self, id: &str) -> Result<Option<NodeType>, AppError> {
        Ok(self.working.node_types.get(id).cloned())
    }

    async fn media_type(&mut self, id: &str) -> Result<Option<MediaType>, AppError> {
        Ok(self.working.media_types.get(id).cloned())
    }

    async fn field_definition(
        &mut self,
        kind: EntityKind,
        bundle: &str,
        name: &str,
    ) -> Result<Option<FieldDefinition>, AppError> {
        Ok(self
            .working
            .fields
            .get(&(kind, bundle.to_string(), name.to_string()))
            .cloned())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        if self.faults.fail_commit {
            return Err(AppError::Persistence(
                "Unable to commit in-memory transaction".to_string(),
            ));
        }
        let MemoryUnitOfWork {
            mut working,
            changes,
            shared,
            ..
        } = *self;
        let mut store = shared.lock().unwrap_or_else(|e| e.into_inner());
        for id in changes.files {
            if let Some(file) = working.files.remove(&id) {
                store.files.insert(id, file);
            }
        }
        for id in changes.nodes {
            if let Some(node) = working.nodes.remove(&id) {
                store.nodes.insert(id, node);
            }
        }
        for id in changes.media {
            if let Some(media) = working.media.remove(&id) {
                store.media.insert(id, media);
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        tracing::debug!("Discarding in-memory unit of work");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::load_required;
    use curator_core::models::FileReference;

    fn file(id: EntityId) -> FileRecord {
        FileRecord {
            id,
            filename: format!("file-{id}.tiff"),
            uri: format!("public://file-{id}.tiff"),
            mime_type: "image/tiff".to_string(),
            filesize: 42,
            status: FileStatus::Temporary,
            owner_id: 1,
        }
    }

    fn draft_node() -> NewNode {
        NewNode {
            node_type: "page".to_string(),
            title: "Page".to_string(),
            member_of: Some(1),
            model: None,
            owner_id: 1,
            published: true,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_changes() {
        let repo = MemoryRepository::new();
        repo.add_file(file(5));

        let mut uow = repo.begin().await.unwrap();
        assert_eq!(uow.mark_permanent(5).await.unwrap(), 1);
        let saved = EntityCreator::<Node>::create(&mut *uow, draft_node())
            .await
            .unwrap();
        assert!(saved.is_new());
        assert!(repo.node(saved.entity.id).is_none());

        uow.commit().await.unwrap();
        assert!(repo.file(5).unwrap().is_permanent());
        assert_eq!(repo.children_of(1).len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_commits_keep_both_writes() {
        let repo = MemoryRepository::new();
        repo.add_file(file(5));
        repo.add_file(file(6));

        let mut first = repo.begin().await.unwrap();
        let mut second = repo.begin().await.unwrap();
        first.mark_permanent(5).await.unwrap();
        let a = EntityCreator::<Node>::create(&mut *first, draft_node())
            .await
            .unwrap();
        second.mark_permanent(6).await.unwrap();
        let b = EntityCreator::<Node>::create(&mut *second, draft_node())
            .await
            .unwrap();

        first.commit().await.unwrap();
        second.commit().await.unwrap();

        assert!(repo.file(5).unwrap().is_permanent());
        assert!(repo.file(6).unwrap().is_permanent());
        assert!(repo.node(a.entity.id).is_some());
        assert!(repo.node(b.entity.id).is_some());
    }

    #[tokio::test]
    async fn test_commit_keeps_records_added_after_begin() {
        let repo = MemoryRepository::new();
        repo.add_file(file(5));

        let mut uow = repo.begin().await.unwrap();
        uow.mark_permanent(5).await.unwrap();
        repo.add_file(file(8));
        uow.commit().await.unwrap();

        assert!(repo.file(5).unwrap().is_permanent());
        assert!(repo.file(8).is_some());
    }

    #[tokio::test]
    async fn test_rollback_discards_changes_but_not_ids() {
        let repo = MemoryRepository::new();
        repo.add_file(file(5));

        let mut uow = repo.begin().await.unwrap();
        uow.mark_permanent(5).await.unwrap();
        let first = EntityCreator::<Node>::create(&mut *uow, draft_node())
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        assert!(!repo.file(5).unwrap().is_permanent());
        assert!(repo.node(first.entity.id).is_none());

        let mut uow = repo.begin().await.unwrap();
        let second = EntityCreator::<Node>::create(&mut *uow, draft_node())
            .await
            .unwrap();
        assert!(second.entity.id > first.entity.id);
    }

    #[tokio::test]
    async fn test_injected_media_failure() {
        let repo = MemoryRepository::new();
        repo.fail_media_creation_for(7);

        let mut uow = repo.begin().await.unwrap();
        let draft = NewMedia {
            media_type: "image".to_string(),
            name: "x".to_string(),
            media_of: Some(1),
            usage: vec![],
            owner_id: 1,
            published: true,
            source_field: "field_media_image".to_string(),
            source: FileReference::new(7),
        };
        let err = EntityCreator::<Media>::create(&mut *uow, draft)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_load_required_reports_kind_and_id() {
        let repo = MemoryRepository::new();
        let mut uow = repo.begin().await.unwrap();
        let err = load_required::<FileRecord, _>(&mut *uow, 99)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Not found: file 99 does not exist");
    }

    #[tokio::test]
    async fn test_media_with_term_lookup() {
        let repo = MemoryRepository::new();
        repo.add_media(Media {
            id: 3,
            media_type: "image".to_string(),
            name: "orig".to_string(),
            media_of: Some(42),
            usage: vec![10],
            owner_id: 1,
            published: true,
            source_field: "field_media_image".to_string(),
            source: FileReference::new(5),
        });
        repo.add_file(file(5));

        let media = repo.media_with_term(42, 10).await.unwrap().unwrap();
        assert_eq!(media.id, 3);
        assert!(repo.media_with_term(42, 11).await.unwrap().is_none());
        assert_eq!(repo.source_file(&media).await.unwrap().unwrap().id, 5);
    }
}
