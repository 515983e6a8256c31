use serde::{Deserialize, Serialize};

use super::entity::EntityKind;

/// How many values a field accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Limited(u32),
    Unlimited,
}

impl Cardinality {
    /// Storage encoding, where `-1` means unlimited.
    pub fn as_i32(&self) -> i32 {
        match self {
            Cardinality::Limited(n) => *n as i32,
            Cardinality::Unlimited => -1,
        }
    }

    pub fn from_i32(value: i32) -> Self {
        if value < 0 {
            Cardinality::Unlimited
        } else {
            Cardinality::Limited(value as u32)
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Cardinality::Limited(n) => count <= *n as usize,
            Cardinality::Unlimited => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDefinition {
    pub entity_kind: EntityKind,
    pub bundle: String,
    pub name: String,
    /// Field storage type, e.g. `file` or `image`.
    pub field_type: String,
    pub cardinality: Cardinality,
}

impl FieldDefinition {
    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }
}
