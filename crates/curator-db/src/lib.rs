//! Persistence layer for curator.
//!
//! Entity access is split into narrow capabilities ([`EntityLoader`],
//! [`EntityCreator`]) selected by entity type at the call site. A
//! [`UnitOfWork`] bundles the capabilities the ingest engine needs inside one
//! transaction; [`ContentLookup`] serves the read-only queries of the event
//! pipeline.

pub mod memory;
pub mod postgres;
pub mod repository;

pub use memory::{FaultPlan, MemoryRepository};
pub use postgres::PgRepository;
pub use repository::{
    load_required, ContentLookup, Creatable, EntityCreator, EntityLoader, Repository, UnitOfWork,
};
