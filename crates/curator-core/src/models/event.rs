use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::entity::{Entity, EntityId, EntityKind, FileRecord, Media, Node};
use crate::error::AppError;

/// The entity whose change triggers an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSubject {
    Node(Node),
    Media(Media),
    File(FileRecord),
}

impl EventSubject {
    pub fn kind(&self) -> EntityKind {
        match self {
            EventSubject::Node(_) => EntityKind::Node,
            EventSubject::Media(_) => EntityKind::Media,
            EventSubject::File(_) => EntityKind::File,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            EventSubject::Node(n) => n.id(),
            EventSubject::Media(m) => m.id(),
            EventSubject::File(f) => f.id(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EventSubject::Node(n) => n.label(),
            EventSubject::Media(m) => m.label(),
            EventSubject::File(f) => f.label(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            EventSubject::Node(n) => Some(n),
            _ => None,
        }
    }
}

/// Flat JSON body of a queue message. Serialized with sorted keys so the
/// bytes are stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EventPayload(Map<String, Value>);

impl EventPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn event_kind(&self) -> Option<&str> {
        self.get_str("event")
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.get_str("source_uri")
    }

    pub fn destination_uri(&self) -> Option<&str> {
        self.get_str("destination_uri")
    }

    pub fn file_upload_uri(&self) -> Option<&str> {
        self.get_str("file_upload_uri")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_bytes(&self) -> Result<Bytes, AppError> {
        let sorted: BTreeMap<&String, &Value> = self.0.iter().collect();
        Ok(Bytes::from(serde_json::to_vec(&sorted)?))
    }
}

/// Headers plus body, built once per dispatch and sent once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

impl QueueMessage {
    pub fn new(headers: IndexMap<String, String>, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serializes_with_sorted_keys() {
        let mut payload = EventPayload::default();
        payload.set("queue", "q");
        payload.set("event", "Create");
        payload.set("args", "");
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"args":"","event":"Create","queue":"q"}"#
        );
        assert_eq!(payload.event_kind(), Some("Create"));
    }
}
