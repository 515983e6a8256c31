use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::{EntityId, EntityKind, FileRecord, FileReference, Media, Node};
use super::field::FieldDefinition;

/// One uploaded file and the media field slot it is meant for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadDescriptor {
    pub file_reference: FileReference,
    pub target_field_metadata: FieldDefinition,
}

/// Parameters shared by every item of an add-children batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChildBatchParameters {
    pub parent_id: EntityId,
    pub child_type: String,
    #[serde(default)]
    pub model_tag: Option<EntityId>,
    pub media_type: String,
    #[serde(default)]
    pub media_use_tags: Vec<EntityId>,
}

impl ChildBatchParameters {
    pub fn request_for(&self, upload: UploadDescriptor) -> ChildCreationRequest {
        ChildCreationRequest {
            parent_id: self.parent_id,
            child_type: self.child_type.clone(),
            model_tag: self.model_tag,
            media_type: self.media_type.clone(),
            media_use_tags: self.media_use_tags.clone(),
            upload,
        }
    }
}

/// One row of work submitted to the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChildCreationRequest {
    pub parent_id: EntityId,
    pub child_type: String,
    pub model_tag: Option<EntityId>,
    pub media_type: String,
    pub media_use_tags: Vec<EntityId>,
    pub upload: UploadDescriptor,
}

/// The records persisted for one successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEntitySet {
    pub file: FileRecord,
    pub child: Node,
    pub media: Media,
}

/// A single failed validation constraint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub property_path: String,
    pub message: String,
}

impl ConstraintViolation {
    pub fn new(property_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property_path: property_path.into(),
            message: message.into(),
        }
    }
}

/// Sparse per-entity violation counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViolationReport {
    entries: BTreeMap<EntityKind, BTreeMap<EntityId, u32>>,
}

impl ViolationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` violations for an entity. Zero counts are ignored.
    pub fn record(&mut self, kind: EntityKind, id: EntityId, count: u32) {
        if count == 0 {
            return;
        }
        *self.entries.entry(kind).or_default().entry(id).or_insert(0) += count;
    }

    /// Additive union: counts for the same key are summed.
    pub fn merge(&mut self, other: &ViolationReport) {
        for (kind, ids) in &other.entries {
            for (id, count) in ids {
                self.record(*kind, *id, *count);
            }
        }
    }

    pub fn get(&self, kind: EntityKind, id: EntityId) -> Option<u32> {
        self.entries.get(&kind).and_then(|ids| ids.get(&id)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn total(&self) -> u64 {
        self.entries
            .values()
            .flat_map(|ids| ids.values())
            .map(|c| *c as u64)
            .sum()
    }

    /// Entries ordered by entity kind, then id.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, EntityId, u32)> + '_ {
        self.entries
            .iter()
            .flat_map(|(kind, ids)| ids.iter().map(move |(id, count)| (*kind, *id, *count)))
    }
}

/// Running totals of an add-children batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    pub processed_count: u64,
    pub violations: ViolationReport,
}

impl BatchResult {
    pub fn record_item(&mut self, violations: &ViolationReport) {
        self.violations.merge(violations);
        self.processed_count += 1;
    }
}
