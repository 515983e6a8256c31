//! Postgres repository
//!
//! A unit of work wraps a `sqlx` transaction; beginning a transaction on a
//! connection that already has one open yields a savepoint, so nesting is
//! handled by the store.

mod rows;

use anyhow::Context;
use async_trait::async_trait;
use curator_core::models::{
    EntityId, EntityKind, FieldDefinition, FileRecord, Media, MediaType, NewMedia, NewNode, Node,
    NodeType, Saved, Term, User,
};
use curator_core::{AppError, CuratorConfig};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use crate::repository::{ContentLookup, EntityCreator, EntityLoader, Repository, UnitOfWork};

/// Repository backed by a Postgres pool
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using the database settings of `config`.
    pub async fn connect(config: &CuratorConfig) -> anyhow::Result<Self> {
        let url = config
            .database_url()
            .context("DATABASE_URL must be set to use the Postgres repository")?;

        tracing::info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(config.base.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.base.db_timeout_seconds))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await
            .context("Failed to connect to database")?;

        tracing::info!(
            max_connections = config.base.db_max_connections,
            "Database connected successfully"
        );
        Ok(Self::new(pool))
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    #[tracing::instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

#[async_trait]
impl ContentLookup for PgRepository {
    #[tracing::instrument(skip(self), fields(db.table = "taxonomy_terms", db.operation = "select"))]
    async fn term_for_uri(&self, uri: &str) -> Result<Option<Term>, AppError> {
        let mut conn = self.pool.acquire().await?;
        rows::term_for_uri(&mut conn, uri).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "media", db.operation = "select"))]
    async fn media_with_term(
        &self,
        node_id: EntityId,
        term_id: EntityId,
    ) -> Result<Option<Media>, AppError> {
        let mut conn = self.pool.acquire().await?;
        rows::media_with_term(&mut conn, node_id, term_id).await
    }

    #[tracing::instrument(skip(self, media), fields(db.table = "files", db.operation = "select", media.id = media.id))]
    async fn source_file(&self, media: &Media) -> Result<Option<FileRecord>, AppError> {
        let mut conn = self.pool.acquire().await?;
        rows::fetch_file(&mut conn, media.source.target_id).await
    }

    async fn load_node(&self, id: EntityId) -> Result<Option<Node>, AppError> {
        let mut conn = self.pool.acquire().await?;
        rows::fetch_node(&mut conn, id).await
    }

    async fn load_user(&self, id: EntityId) -> Result<Option<User>, AppError> {
        let mut conn = self.pool.acquire().await?;
        rows::fetch_user(&mut conn, id).await
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl EntityLoader<FileRecord> for PgUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<FileRecord>, AppError> {
        rows::fetch_file(&mut self.tx, id).await
    }
}

#[async_trait]
impl EntityLoader<Node> for PgUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Node>, AppError> {
        rows::fetch_node(&mut self.tx, id).await
    }
}

#[async_trait]
impl EntityLoader<Media> for PgUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Media>, AppError> {
        rows::fetch_media(&mut self.tx, id).await
    }
}

#[async_trait]
impl EntityLoader<Term> for PgUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<Term>, AppError> {
        rows::fetch_term(&mut self.tx, id).await
    }
}

#[async_trait]
impl EntityLoader<User> for PgUnitOfWork {
    async fn load(&mut self, id: EntityId) -> Result<Option<User>, AppError> {
        rows::fetch_user(&mut self.tx, id).await
    }
}

#[async_trait]
impl EntityCreator<Node> for PgUnitOfWork {
    #[tracing::instrument(skip(self, draft), fields(db.table = "nodes", db.operation = "insert"))]
    async fn create(&mut self, draft: NewNode) -> Result<Saved<Node>, AppError> {
        let node = rows::insert_node(&mut self.tx, draft).await?;
        Ok(Saved::new(node))
    }
}

#[async_trait]
impl EntityCreator<Media> for PgUnitOfWork {
    #[tracing::instrument(skip(self, draft), fields(db.table = "media", db.operation = "insert"))]
    async fn create(&mut self, draft: NewMedia) -> Result<Saved<Media>, AppError> {
        let media = rows::insert_media(&mut self.tx, draft).await?;
        Ok(Saved::new(media))
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[tracing::instrument(skip(self), fields(db.table = "files", db.operation = "update"))]
    async fn mark_permanent(&mut self, file_id: EntityId) -> Result<u64, AppError> {
        rows::mark_permanent(&mut self.tx, file_id).await
    }

    async fn node_type(&mut self, id: &str) -> Result<Option<NodeType>, AppError> {
        rows::fetch_node_type(&mut self.tx, id).await
    }

    async fn media_type(&mut self, id: &str) -> Result<Option<MediaType>, AppError> {
        rows::fetch_media_type(&mut self.tx, id).await
    }

    async fn field_definition(
        &mut self,
        kind: EntityKind,
        bundle: &str,
        name: &str,
    ) -> Result<Option<FieldDefinition>, AppError> {
        rows::fetch_field(&mut self.tx, kind, bundle, name).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
