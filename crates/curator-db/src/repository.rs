use async_trait::async_trait;
use curator_core::models::{
    Entity, EntityId, EntityKind, FieldDefinition, FileRecord, Media, MediaType, NewMedia,
    NewNode, Node, NodeType, Saved, Term, User,
};
use curator_core::AppError;

/// Entities that can be created from a draft.
pub trait Creatable: Entity {
    type Draft: Send + Sync + 'static;
}

impl Creatable for Node {
    type Draft = NewNode;
}

impl Creatable for Media {
    type Draft = NewMedia;
}

/// Loads one entity type by id.
#[async_trait]
pub trait EntityLoader<E: Entity>: Send {
    async fn load(&mut self, id: EntityId) -> Result<Option<E>, AppError>;
}

/// Persists new entities of one type.
#[async_trait]
pub trait EntityCreator<E: Creatable>: Send {
    async fn create(&mut self, draft: E::Draft) -> Result<Saved<E>, AppError>;
}

/// Loads an entity and turns absence into `NotFound`.
pub async fn load_required<E, L>(loader: &mut L, id: EntityId) -> Result<E, AppError>
where
    E: Entity,
    L: EntityLoader<E> + ?Sized,
{
    EntityLoader::<E>::load(loader, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {} does not exist", E::KIND, id)))
}

/// Transactional scope for one batch item.
///
/// Nothing written through a unit of work is visible to other readers until
/// [`UnitOfWork::commit`]. Dropping it without committing discards the work.
#[async_trait]
pub trait UnitOfWork:
    EntityLoader<FileRecord>
    + EntityLoader<Node>
    + EntityLoader<Media>
    + EntityLoader<Term>
    + EntityLoader<User>
    + EntityCreator<Node>
    + EntityCreator<Media>
    + Send
{
    /// Flags a file as permanent. Returns the number of rows changed.
    async fn mark_permanent(&mut self, file_id: EntityId) -> Result<u64, AppError>;

    async fn node_type(&mut self, id: &str) -> Result<Option<NodeType>, AppError>;

    async fn media_type(&mut self, id: &str) -> Result<Option<MediaType>, AppError>;

    async fn field_definition(
        &mut self,
        kind: EntityKind,
        bundle: &str,
        name: &str,
    ) -> Result<Option<FieldDefinition>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}

/// Source of units of work.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// Read-only queries used while building event payloads.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn term_for_uri(&self, uri: &str) -> Result<Option<Term>, AppError>;

    /// First media of `node_id` tagged with `term_id` through its usage field.
    async fn media_with_term(
        &self,
        node_id: EntityId,
        term_id: EntityId,
    ) -> Result<Option<Media>, AppError>;

    async fn source_file(&self, media: &Media) -> Result<Option<FileRecord>, AppError>;

    async fn load_node(&self, id: EntityId) -> Result<Option<Node>, AppError>;

    async fn load_user(&self, id: EntityId) -> Result<Option<User>, AppError>;
}
