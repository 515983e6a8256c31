//! Status messages reported back to whoever invoked an operation.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Status,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Sink for user-facing status messages.
pub trait StatusMessenger: Send + Sync {
    fn add(&self, message: StatusMessage);

    fn add_status(&self, text: String) {
        self.add(StatusMessage {
            level: StatusLevel::Status,
            text,
            link: None,
        });
    }

    fn add_warning(&self, text: String, link: Option<String>) {
        self.add(StatusMessage {
            level: StatusLevel::Warning,
            text,
            link,
        });
    }

    fn add_error(&self, text: String) {
        self.add(StatusMessage {
            level: StatusLevel::Error,
            text,
            link: None,
        });
    }
}

/// Keeps every message in memory until taken.
#[derive(Debug, Default)]
pub struct CollectingMessenger {
    messages: Mutex<Vec<StatusMessage>>,
}

impl CollectingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StatusMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn messages(&self) -> Vec<StatusMessage> {
        self.lock().clone()
    }

    pub fn take(&self) -> Vec<StatusMessage> {
        std::mem::take(&mut *self.lock())
    }

    pub fn with_level(&self, level: StatusLevel) -> Vec<StatusMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.level == level)
            .collect()
    }
}

impl StatusMessenger for CollectingMessenger {
    fn add(&self, message: StatusMessage) {
        self.lock().push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_messenger_keeps_order() {
        let messenger = CollectingMessenger::new();
        messenger.add_status("Added 2 child records.".to_string());
        messenger.add_warning("1 validation error".to_string(), Some("/node/4".to_string()));
        messenger.add_error("boom".to_string());

        let levels: Vec<StatusLevel> = messenger.messages().iter().map(|m| m.level).collect();
        assert_eq!(
            levels,
            vec![StatusLevel::Status, StatusLevel::Warning, StatusLevel::Error]
        );
        assert_eq!(messenger.with_level(StatusLevel::Warning)[0].link.as_deref(), Some("/node/4"));
        assert_eq!(messenger.take().len(), 3);
        assert!(messenger.messages().is_empty());
    }

    #[test]
    fn test_poisoned_lock_keeps_messages() {
        let messenger = std::sync::Arc::new(CollectingMessenger::new());
        messenger.add_status("Added 1 child record.".to_string());

        let poisoner = messenger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.messages.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(messenger.messages.is_poisoned());
        messenger.add_error("boom".to_string());
        assert_eq!(messenger.messages().len(), 2);
        assert_eq!(messenger.take().len(), 2);
        assert!(messenger.messages().is_empty());
    }
}
