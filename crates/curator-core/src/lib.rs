//! Curator Core Library
//!
//! Domain models, error types, configuration and validation shared by the
//! ingest engine, the event pipeline and the CLI.

pub mod config;
pub mod error;
pub mod messenger;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{BrokerConfig, CuratorConfig, LogFormat};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use messenger::{CollectingMessenger, StatusLevel, StatusMessage, StatusMessenger};
