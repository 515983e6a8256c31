//! Entity-level validation rules and their aggregation into violation counts.

use curator_core::models::{
    ConstraintViolation, Entity, EntityId, EntityKind, FileRecord, Media, Node, ViolationReport,
};

const MAX_LABEL_LENGTH: usize = 255;

/// An entity with a rule set.
pub trait Validate: Send + Sync {
    fn entity_kind(&self) -> EntityKind;

    fn entity_id(&self) -> EntityId;

    fn validate(&self) -> Vec<ConstraintViolation>;
}

fn check_label(path: &str, value: &str, violations: &mut Vec<ConstraintViolation>) {
    if value.trim().is_empty() {
        violations.push(ConstraintViolation::new(path, "This value should not be blank."));
    } else if value.chars().count() > MAX_LABEL_LENGTH {
        violations.push(ConstraintViolation::new(
            path,
            format!("This value is too long. It should have {MAX_LABEL_LENGTH} characters or less."),
        ));
    }
}

impl Validate for FileRecord {
    fn entity_kind(&self) -> EntityKind {
        Self::KIND
    }

    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn validate(&self) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        check_label("filename", &self.filename, &mut violations);
        match self.scheme_and_target() {
            Some((scheme, _)) if !scheme.is_empty() => {}
            _ => violations.push(ConstraintViolation::new(
                "uri",
                format!("The URI '{}' has no stream wrapper scheme.", self.uri),
            )),
        }
        if self.filesize < 0 {
            violations.push(ConstraintViolation::new(
                "filesize",
                "This value should be 0 or more.",
            ));
        }
        violations
    }
}

impl Validate for Node {
    fn entity_kind(&self) -> EntityKind {
        Self::KIND
    }

    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn validate(&self) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        check_label("title", &self.title, &mut violations);
        if self.node_type.trim().is_empty() {
            violations.push(ConstraintViolation::new("type", "This value should not be blank."));
        }
        violations
    }
}

impl Validate for Media {
    fn entity_kind(&self) -> EntityKind {
        Self::KIND
    }

    fn entity_id(&self) -> EntityId {
        self.id()
    }

    fn validate(&self) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        check_label("name", &self.name, &mut violations);
        if self.media_of.is_none() {
            violations.push(ConstraintViolation::new(
                "field_media_of",
                "This value should not be null.",
            ));
        }
        if self.source.target_id <= 0 {
            violations.push(ConstraintViolation::new(
                self.source_field.clone(),
                "A source file must be attached.",
            ));
        }
        violations
    }
}

/// Reduces validation results to sparse per-entity counts.
pub struct ValidationAggregator;

impl ValidationAggregator {
    pub fn classify(entities: &[&dyn Validate]) -> ViolationReport {
        let mut report = ViolationReport::new();
        for entity in entities {
            let violations = entity.validate();
            if !violations.is_empty() {
                tracing::debug!(
                    entity_kind = %entity.entity_kind(),
                    entity_id = entity.entity_id(),
                    count = violations.len(),
                    "Validation violations found"
                );
                report.record(
                    entity.entity_kind(),
                    entity.entity_id(),
                    violations.len() as u32,
                );
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_core::models::{FileReference, FileStatus};

    fn file() -> FileRecord {
        FileRecord {
            id: 1,
            filename: "scan.tiff".to_string(),
            uri: "public://scan.tiff".to_string(),
            mime_type: "image/tiff".to_string(),
            filesize: 100,
            status: FileStatus::Permanent,
            owner_id: 1,
        }
    }

    fn node(title: &str) -> Node {
        Node {
            id: 2,
            node_type: "page".to_string(),
            title: title.to_string(),
            member_of: Some(9),
            model: None,
            owner_id: 1,
            published: true,
        }
    }

    fn media() -> Media {
        Media {
            id: 3,
            media_type: "image".to_string(),
            name: "scan.tiff".to_string(),
            media_of: None,
            usage: vec![],
            owner_id: 1,
            published: true,
            source_field: "field_media_image".to_string(),
            source: FileReference::new(0),
        }
    }

    #[test]
    fn test_valid_entities_are_omitted() {
        let file = file();
        let node = node("scan.tiff");
        let report = ValidationAggregator::classify(&[&file, &node]);
        assert!(report.is_empty());
    }

    #[test]
    fn test_counts_violations_per_entity() {
        let file = file();
        let node = node(&"x".repeat(256));
        let media = media();
        let report = ValidationAggregator::classify(&[&file, &node, &media]);
        assert_eq!(report.get(EntityKind::File, 1), None);
        assert_eq!(report.get(EntityKind::Node, 2), Some(1));
        assert_eq!(report.get(EntityKind::Media, 3), Some(2));
    }

    #[test]
    fn test_file_without_scheme_is_flagged() {
        let mut file = file();
        file.uri = "scan.tiff".to_string();
        file.filesize = -1;
        assert_eq!(file.validate().len(), 2);
    }
}
