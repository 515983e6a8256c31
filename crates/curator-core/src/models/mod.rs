pub mod action;
pub mod batch;
pub mod entity;
pub mod event;
pub mod field;

pub use action::{
    ActionConfig, EmitEventConfig, EventKind, GenerateDerivativeConfig, CONFIG_ONLY_KEYS,
    DEFAULT_DERIVATIVE_PATH, DEFAULT_DERIVATIVE_QUEUE,
};
pub use batch::{
    BatchResult, ChildBatchParameters, ChildCreationRequest, ConstraintViolation,
    CreatedEntitySet, UploadDescriptor, ViolationReport,
};
pub use entity::{
    Entity, EntityId, EntityKind, FileRecord, FileReference, FileStatus, Media, MediaType,
    NewMedia, NewNode, Node, NodeType, SaveOutcome, Saved, Term, User,
};
pub use event::{EventPayload, EventSubject, QueueMessage};
pub use field::{Cardinality, FieldDefinition};
