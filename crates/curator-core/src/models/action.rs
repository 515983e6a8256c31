use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::AppError;
use crate::validation::{normalize_path_template, validate_mimetype};

pub const DEFAULT_DERIVATIVE_QUEUE: &str = "islandora-connector-houdini";
pub const DEFAULT_DERIVATIVE_PATH: &str = "[date:custom:Y]-[date:custom:m]/[node:nid].bin";

/// Keys only meaningful to the action itself; stripped before a payload is sent.
pub const CONFIG_ONLY_KEYS: [&str; 5] = [
    "source_term_uri",
    "derivative_term_uri",
    "path",
    "scheme",
    "destination_media_type",
];

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[default]
    Create,
    Update,
    Delete,
    #[serde(rename = "Generate Derivative", alias = "GenerateDerivative")]
    GenerateDerivative,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "Create",
            EventKind::Update => "Update",
            EventKind::Delete => "Delete",
            EventKind::GenerateDerivative => "Generate Derivative",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Create" => Ok(EventKind::Create),
            "Update" => Ok(EventKind::Update),
            "Delete" => Ok(EventKind::Delete),
            "Generate Derivative" | "GenerateDerivative" => Ok(EventKind::GenerateDerivative),
            _ => Err(anyhow::anyhow!("Invalid event kind: {}", s)),
        }
    }
}

/// Configuration of an action that publishes an event to a queue.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmitEventConfig {
    pub queue: String,
    pub event: EventKind,
}

/// Configuration of a "generate derivative" action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateDerivativeConfig {
    #[serde(flatten)]
    pub emit: EmitEventConfig,
    pub source_term_uri: String,
    pub derivative_term_uri: String,
    pub mimetype: String,
    #[serde(default)]
    pub args: String,
    pub destination_media_type: String,
    pub scheme: String,
    pub path: String,
}

impl GenerateDerivativeConfig {
    /// Defaults for a new action, using `default_scheme` as the file system.
    pub fn with_defaults(default_scheme: impl Into<String>) -> Self {
        Self {
            emit: EmitEventConfig {
                queue: DEFAULT_DERIVATIVE_QUEUE.to_string(),
                event: EventKind::GenerateDerivative,
            },
            source_term_uri: String::new(),
            derivative_term_uri: String::new(),
            mimetype: String::new(),
            args: String::new(),
            destination_media_type: String::new(),
            scheme: default_scheme.into(),
            path: DEFAULT_DERIVATIVE_PATH.to_string(),
        }
    }

    /// Parses a JSON object, taking omitted keys from [`Self::with_defaults`].
    pub fn from_json_with_defaults(raw: &str, default_scheme: &str) -> Result<Self, AppError> {
        let overrides: Map<String, Value> = serde_json::from_str(raw)?;
        let mut merged = match serde_json::to_value(Self::with_defaults(default_scheme))? {
            Value::Object(map) => map,
            _ => {
                return Err(AppError::Internal(
                    "Derivative defaults did not serialize to an object".to_string(),
                ))
            }
        };
        merged.extend(overrides);
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_mimetype(&self.mimetype)?;
        if self.emit.queue.trim().is_empty() {
            return Err(AppError::Configuration("Queue name is required".to_string()));
        }
        if self.scheme.trim().is_empty() {
            return Err(AppError::Configuration("File system scheme is required".to_string()));
        }
        Ok(())
    }

    /// Copy with the path template trimmed of leading and trailing slashes.
    pub fn normalized(mut self) -> Self {
        self.path = normalize_path_template(&self.path);
        self
    }
}

/// Configuration of one action instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionConfig {
    Emit(EmitEventConfig),
    GenerateDerivative(GenerateDerivativeConfig),
}

impl ActionConfig {
    pub fn queue(&self) -> &str {
        match self {
            ActionConfig::Emit(c) => &c.queue,
            ActionConfig::GenerateDerivative(c) => &c.emit.queue,
        }
    }

    pub fn event(&self) -> EventKind {
        match self {
            ActionConfig::Emit(c) => c.event,
            ActionConfig::GenerateDerivative(c) => c.emit.event,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            ActionConfig::Emit(c) if c.queue.trim().is_empty() => {
                Err(AppError::Configuration("Queue name is required".to_string()))
            }
            ActionConfig::Emit(_) => Ok(()),
            ActionConfig::GenerateDerivative(c) => c.validate(),
        }
    }

    /// The configuration as a flat dictionary, the starting point of every payload.
    pub fn to_map(&self) -> Result<Map<String, Value>, AppError> {
        let value = match self {
            ActionConfig::Emit(c) => serde_json::to_value(c)?,
            ActionConfig::GenerateDerivative(c) => serde_json::to_value(c)?,
        };
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(AppError::Internal(
                "Action configuration did not serialize to an object".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_wire_values() {
        assert_eq!(
            serde_json::to_value(EventKind::GenerateDerivative).unwrap(),
            Value::String("Generate Derivative".to_string())
        );
        let parsed: EventKind = serde_json::from_str("\"GenerateDerivative\"").unwrap();
        assert_eq!(parsed, EventKind::GenerateDerivative);
        assert_eq!("Delete".parse::<EventKind>().unwrap(), EventKind::Delete);
    }

    #[test]
    fn test_derivative_defaults() {
        let config = GenerateDerivativeConfig::with_defaults("fedora");
        assert_eq!(config.emit.queue, DEFAULT_DERIVATIVE_QUEUE);
        assert_eq!(config.emit.event, EventKind::GenerateDerivative);
        assert_eq!(config.scheme, "fedora");
        assert_eq!(config.path, DEFAULT_DERIVATIVE_PATH);
    }

    #[test]
    fn test_to_map_is_flat() {
        let mut config = GenerateDerivativeConfig::with_defaults("public");
        config.mimetype = "image/jpeg".to_string();
        let map = ActionConfig::GenerateDerivative(config).to_map().unwrap();
        assert_eq!(map["queue"], "islandora-connector-houdini");
        assert_eq!(map["event"], "Generate Derivative");
        assert_eq!(map["mimetype"], "image/jpeg");
        for key in CONFIG_ONLY_KEYS {
            assert!(map.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_json_without_scheme_or_path_takes_defaults() {
        let raw = r#"{
            "source_term_uri": "http://pcdm.org/use#OriginalFile",
            "derivative_term_uri": "http://pcdm.org/use#ServiceFile",
            "mimetype": "image/jpeg",
            "destination_media_type": "image"
        }"#;
        let config = GenerateDerivativeConfig::from_json_with_defaults(raw, "fedora").unwrap();
        assert_eq!(config.scheme, "fedora");
        assert_eq!(config.path, DEFAULT_DERIVATIVE_PATH);
        assert_eq!(config.emit.queue, DEFAULT_DERIVATIVE_QUEUE);
        assert_eq!(config.emit.event, EventKind::GenerateDerivative);
        assert_eq!(config.mimetype, "image/jpeg");
        assert_eq!(config.args, "");
    }

    #[test]
    fn test_json_overrides_defaults() {
        let raw = r#"{
            "queue": "custom-queue",
            "source_term_uri": "a",
            "derivative_term_uri": "b",
            "mimetype": "audio/mpeg",
            "destination_media_type": "audio",
            "scheme": "private",
            "path": "[node:nid].mp3"
        }"#;
        let config = GenerateDerivativeConfig::from_json_with_defaults(raw, "public").unwrap();
        assert_eq!(config.emit.queue, "custom-queue");
        assert_eq!(config.scheme, "private");
        assert_eq!(config.path, "[node:nid].mp3");
    }

    #[test]
    fn test_json_must_be_an_object() {
        assert!(GenerateDerivativeConfig::from_json_with_defaults("[]", "public").is_err());
    }

    #[test]
    fn test_normalized_trims_path() {
        let mut config = GenerateDerivativeConfig::with_defaults("public");
        config.path = "/derivatives/[node:nid].jpg/".to_string();
        assert_eq!(config.normalized().path, "derivatives/[node:nid].jpg");
    }

    #[test]
    fn test_validate_rejects_empty_queue() {
        let config = ActionConfig::Emit(EmitEventConfig::default());
        assert!(config.validate().unwrap_err().is_configuration());
    }
}
