//! Row mappings and queries shared by the pooled and transactional paths.

use curator_core::models::{
    Cardinality, EntityId, EntityKind, FieldDefinition, FileRecord, FileReference, FileStatus,
    Media, MediaType, NewMedia, NewNode, Node, NodeType, Term, User,
};
use curator_core::AppError;
use sqlx::{FromRow, PgConnection, Postgres};

const FILE_COLUMNS: &str = "id, filename, uri, mime_type, filesize, status, owner_id";
const NODE_COLUMNS: &str = "id, node_type, title, member_of, model, owner_id, published";
const MEDIA_COLUMNS: &str = "id, media_type, name, media_of, owner_id, published, source_field, source_file_id, source_description, source_alt";
const TERM_COLUMNS: &str = "id, vocabulary, name, external_uri";

#[derive(FromRow)]
struct FileRow {
    id: i64,
    filename: String,
    uri: String,
    mime_type: String,
    filesize: i64,
    status: i16,
    owner_id: i64,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            id: row.id,
            filename: row.filename,
            uri: row.uri,
            mime_type: row.mime_type,
            filesize: row.filesize,
            status: FileStatus::from_i16(row.status),
            owner_id: row.owner_id,
        }
    }
}

#[derive(FromRow)]
struct NodeRow {
    id: i64,
    node_type: String,
    title: String,
    member_of: Option<i64>,
    model: Option<i64>,
    owner_id: i64,
    published: bool,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node {
            id: row.id,
            node_type: row.node_type,
            title: row.title,
            member_of: row.member_of,
            model: row.model,
            owner_id: row.owner_id,
            published: row.published,
        }
    }
}

#[derive(FromRow)]
struct MediaRow {
    id: i64,
    media_type: String,
    name: String,
    media_of: Option<i64>,
    owner_id: i64,
    published: bool,
    source_field: String,
    source_file_id: i64,
    source_description: Option<String>,
    source_alt: Option<String>,
}

impl MediaRow {
    fn into_media(self, usage: Vec<EntityId>) -> Media {
        Media {
            id: self.id,
            media_type: self.media_type,
            name: self.name,
            media_of: self.media_of,
            usage,
            owner_id: self.owner_id,
            published: self.published,
            source_field: self.source_field,
            source: FileReference {
                target_id: self.source_file_id,
                description: self.source_description,
                alt: self.source_alt,
            },
        }
    }
}

#[derive(FromRow)]
struct TermRow {
    id: i64,
    vocabulary: String,
    name: String,
    external_uri: Option<String>,
}

impl From<TermRow> for Term {
    fn from(row: TermRow) -> Self {
        Term {
            id: row.id,
            vocabulary: row.vocabulary,
            name: row.name,
            external_uri: row.external_uri,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    roles: Vec<String>,
}

#[derive(FromRow)]
struct NodeTypeRow {
    id: String,
    label: String,
    has_model_field: bool,
    has_member_of_field: bool,
}

#[derive(FromRow)]
struct MediaTypeRow {
    id: String,
    label: String,
    source_plugin: String,
    source_field: Option<String>,
    has_usage_field: bool,
}

#[derive(FromRow)]
struct FieldRow {
    entity_kind: String,
    bundle: String,
    name: String,
    field_type: String,
    cardinality: i32,
}

impl TryFrom<FieldRow> for FieldDefinition {
    type Error = AppError;

    fn try_from(row: FieldRow) -> Result<Self, Self::Error> {
        Ok(FieldDefinition {
            entity_kind: row.entity_kind.parse::<EntityKind>()?,
            bundle: row.bundle,
            name: row.name,
            field_type: row.field_type,
            cardinality: Cardinality::from_i32(row.cardinality),
        })
    }
}

pub(crate) async fn fetch_file(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<FileRecord>, AppError> {
    let row = sqlx::query_as::<Postgres, FileRow>(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Into::into))
}

pub(crate) async fn mark_permanent(conn: &mut PgConnection, id: EntityId) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE files SET status = $1 WHERE id = $2")
        .bind(FileStatus::Permanent.as_i16())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn fetch_node(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<Node>, AppError> {
    let row = sqlx::query_as::<Postgres, NodeRow>(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Into::into))
}

pub(crate) async fn insert_node(conn: &mut PgConnection, draft: NewNode) -> Result<Node, AppError> {
    let row = sqlx::query_as::<Postgres, NodeRow>(&format!(
        r#"
        INSERT INTO nodes (node_type, title, member_of, model, owner_id, published)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {NODE_COLUMNS}
        "#
    ))
    .bind(&draft.node_type)
    .bind(&draft.title)
    .bind(draft.member_of)
    .bind(draft.model)
    .bind(draft.owner_id)
    .bind(draft.published)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.into())
}

async fn fetch_usage(conn: &mut PgConnection, media_id: EntityId) -> Result<Vec<EntityId>, AppError> {
    let usage = sqlx::query_scalar::<Postgres, i64>(
        "SELECT term_id FROM media_usage WHERE media_id = $1 ORDER BY term_id",
    )
    .bind(media_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(usage)
}

pub(crate) async fn fetch_media(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<Media>, AppError> {
    let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
        "SELECT {MEDIA_COLUMNS} FROM media WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let usage = fetch_usage(conn, row.id).await?;
            Ok(Some(row.into_media(usage)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn media_with_term(
    conn: &mut PgConnection,
    node_id: EntityId,
    term_id: EntityId,
) -> Result<Option<Media>, AppError> {
    let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
        r#"
        SELECT {MEDIA_COLUMNS} FROM media
        WHERE media_of = $1
          AND EXISTS (SELECT 1 FROM media_usage u WHERE u.media_id = media.id AND u.term_id = $2)
        ORDER BY id ASC
        LIMIT 1
        "#
    ))
    .bind(node_id)
    .bind(term_id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let usage = fetch_usage(conn, row.id).await?;
            Ok(Some(row.into_media(usage)))
        }
        None => Ok(None),
    }
}

pub(crate) async fn insert_media(
    conn: &mut PgConnection,
    draft: NewMedia,
) -> Result<Media, AppError> {
    let row = sqlx::query_as::<Postgres, MediaRow>(&format!(
        r#"
        INSERT INTO media (media_type, name, media_of, owner_id, published, source_field,
                           source_file_id, source_description, source_alt)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {MEDIA_COLUMNS}
        "#
    ))
    .bind(&draft.media_type)
    .bind(&draft.name)
    .bind(draft.media_of)
    .bind(draft.owner_id)
    .bind(draft.published)
    .bind(&draft.source_field)
    .bind(draft.source.target_id)
    .bind(&draft.source.description)
    .bind(&draft.source.alt)
    .fetch_one(&mut *conn)
    .await?;

    for term_id in &draft.usage {
        sqlx::query("INSERT INTO media_usage (media_id, term_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(row.id)
            .bind(*term_id)
            .execute(&mut *conn)
            .await?;
    }

    let mut usage = draft.usage;
    usage.sort_unstable();
    usage.dedup();
    Ok(row.into_media(usage))
}

pub(crate) async fn fetch_term(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<Term>, AppError> {
    let row = sqlx::query_as::<Postgres, TermRow>(&format!(
        "SELECT {TERM_COLUMNS} FROM taxonomy_terms WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Into::into))
}

pub(crate) async fn term_for_uri(
    conn: &mut PgConnection,
    uri: &str,
) -> Result<Option<Term>, AppError> {
    let row = sqlx::query_as::<Postgres, TermRow>(&format!(
        "SELECT {TERM_COLUMNS} FROM taxonomy_terms WHERE external_uri = $1"
    ))
    .bind(uri)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(Into::into))
}

pub(crate) async fn fetch_user(
    conn: &mut PgConnection,
    id: EntityId,
) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<Postgres, UserRow>("SELECT id, name, roles FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|r| User {
        id: r.id,
        name: r.name,
        roles: r.roles,
    }))
}

pub(crate) async fn fetch_node_type(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<NodeType>, AppError> {
    let row = sqlx::query_as::<Postgres, NodeTypeRow>(
        "SELECT id, label, has_model_field, has_member_of_field FROM node_types WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| NodeType {
        id: r.id,
        label: r.label,
        has_model_field: r.has_model_field,
        has_member_of_field: r.has_member_of_field,
    }))
}

pub(crate) async fn fetch_media_type(
    conn: &mut PgConnection,
    id: &str,
) -> Result<Option<MediaType>, AppError> {
    let row = sqlx::query_as::<Postgres, MediaTypeRow>(
        "SELECT id, label, source_plugin, source_field, has_usage_field FROM media_types WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| MediaType {
        id: r.id,
        label: r.label,
        source_plugin: r.source_plugin,
        source_field: r.source_field,
        has_usage_field: r.has_usage_field,
    }))
}

pub(crate) async fn fetch_field(
    conn: &mut PgConnection,
    kind: EntityKind,
    bundle: &str,
    name: &str,
) -> Result<Option<FieldDefinition>, AppError> {
    let row = sqlx::query_as::<Postgres, FieldRow>(
        r#"
        SELECT entity_kind, bundle, name, field_type, cardinality
        FROM field_definitions
        WHERE entity_kind = $1 AND bundle = $2 AND name = $3
        "#,
    )
    .bind(kind.as_str())
    .bind(bundle)
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(FieldDefinition::try_from).transpose()
}
