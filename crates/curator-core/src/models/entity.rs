use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

pub type EntityId = i64;

/// Explicit tag for the entity types the core reads and writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Node,
    Media,
    TaxonomyTerm,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::File => "file",
            EntityKind::Node => "node",
            EntityKind::Media => "media",
            EntityKind::TaxonomyTerm => "taxonomy_term",
            EntityKind::User => "user",
        }
    }

    /// Site-relative canonical path of an entity, e.g. `/node/12`.
    pub fn canonical_path(&self, id: EntityId) -> String {
        format!("/{}/{}", self.as_str(), id)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntityKind::File),
            "node" => Ok(EntityKind::Node),
            "media" => Ok(EntityKind::Media),
            "taxonomy_term" => Ok(EntityKind::TaxonomyTerm),
            "user" => Ok(EntityKind::User),
            _ => Err(anyhow::anyhow!("Invalid entity kind: {}", s)),
        }
    }
}

/// Common surface of every persisted record.
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    /// Human readable label (title, name or filename).
    fn label(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Temporary = 0,
    Permanent = 1,
}

impl FileStatus {
    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            FileStatus::Permanent
        } else {
            FileStatus::Temporary
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: EntityId,
    pub filename: String,
    /// Stream wrapper URI, e.g. `public://2024-03/page.tiff`.
    pub uri: String,
    pub mime_type: String,
    pub filesize: i64,
    pub status: FileStatus,
    pub owner_id: EntityId,
}

impl FileRecord {
    pub fn is_permanent(&self) -> bool {
        self.status == FileStatus::Permanent
    }

    /// Splits the URI into `(scheme, target)`.
    pub fn scheme_and_target(&self) -> Option<(&str, &str)> {
        self.uri.split_once("://")
    }
}

impl Entity for FileRecord {
    const KIND: EntityKind = EntityKind::File;

    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> &str {
        &self.filename
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: EntityId,
    pub node_type: String,
    pub title: String,
    pub member_of: Option<EntityId>,
    pub model: Option<EntityId>,
    pub owner_id: EntityId,
    pub published: bool,
}

impl Entity for Node {
    const KIND: EntityKind = EntityKind::Node;

    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> &str {
        &self.title
    }
}

/// Values for a node that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub node_type: String,
    pub title: String,
    pub member_of: Option<EntityId>,
    pub model: Option<EntityId>,
    pub owner_id: EntityId,
    pub published: bool,
}

/// The widget item for an uploaded file, as attached to a media field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileReference {
    pub target_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl FileReference {
    pub fn new(target_id: EntityId) -> Self {
        Self {
            target_id,
            description: None,
            alt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    pub id: EntityId,
    pub media_type: String,
    pub name: String,
    pub media_of: Option<EntityId>,
    pub usage: Vec<EntityId>,
    pub owner_id: EntityId,
    pub published: bool,
    /// Name of the field the source file is attached at.
    pub source_field: String,
    pub source: FileReference,
}

impl Media {
    pub fn has_usage(&self, term_id: EntityId) -> bool {
        self.usage.contains(&term_id)
    }
}

impl Entity for Media {
    const KIND: EntityKind = EntityKind::Media;

    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMedia {
    pub media_type: String,
    pub name: String,
    pub media_of: Option<EntityId>,
    pub usage: Vec<EntityId>,
    pub owner_id: EntityId,
    pub published: bool,
    pub source_field: String,
    pub source: FileReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Term {
    pub id: EntityId,
    pub vocabulary: String,
    pub name: String,
    /// External authority URI identifying the term across sites.
    pub external_uri: Option<String>,
}

impl Entity for Term {
    const KIND: EntityKind = EntityKind::TaxonomyTerm;

    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub roles: Vec<String>,
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> &str {
        &self.name
    }
}

/// Node bundle definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeType {
    pub id: String,
    pub label: String,
    pub has_model_field: bool,
    pub has_member_of_field: bool,
}

/// Media bundle definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaType {
    pub id: String,
    pub label: String,
    /// Source plugin id (`file`, `image`, `audio_file`, `video_file`, ...).
    pub source_plugin: String,
    /// Configured source field name, if the bundle has one.
    pub source_field: Option<String>,
    pub has_usage_field: bool,
}

/// Result of a save against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    New,
    Updated,
}

#[derive(Debug, Clone)]
pub struct Saved<E> {
    pub entity: E,
    pub outcome: SaveOutcome,
}

impl<E> Saved<E> {
    pub fn new(entity: E) -> Self {
        Self {
            entity,
            outcome: SaveOutcome::New,
        }
    }

    pub fn is_new(&self) -> bool {
        self.outcome == SaveOutcome::New
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_round_trip() {
        for kind in [
            EntityKind::File,
            EntityKind::Node,
            EntityKind::Media,
            EntityKind::TaxonomyTerm,
            EntityKind::User,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("comment".parse::<EntityKind>().is_err());
        assert_eq!(EntityKind::TaxonomyTerm.canonical_path(3), "/taxonomy_term/3");
    }

    #[test]
    fn test_file_scheme_and_target() {
        let file = FileRecord {
            id: 1,
            filename: "page.tiff".to_string(),
            uri: "fedora://2024-03/page.tiff".to_string(),
            mime_type: "image/tiff".to_string(),
            filesize: 10,
            status: FileStatus::Temporary,
            owner_id: 1,
        };
        assert_eq!(
            file.scheme_and_target(),
            Some(("fedora", "2024-03/page.tiff"))
        );
        assert!(!file.is_permanent());
        assert_eq!(FileStatus::from_i16(1), FileStatus::Permanent);
    }
}
