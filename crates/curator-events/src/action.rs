use curator_core::models::{ActionConfig, EventSubject, QueueMessage, User};
use curator_core::{AppError, StatusMessenger};
use std::sync::Arc;

use crate::dispatcher::QueueDispatcher;
use crate::headers::{HeaderContext, HeaderSubscriberRegistry};
use crate::payload::EventPayloadBuilder;

/// An action that publishes an event about an entity to a queue.
///
/// Configuration and header errors stop the action before any broker I/O.
/// Every failure is logged, reported to the messenger and returned.
pub struct EmitEventAction {
    config: ActionConfig,
    builder: Arc<dyn EventPayloadBuilder>,
    headers: HeaderSubscriberRegistry,
    dispatcher: QueueDispatcher,
}

impl EmitEventAction {
    pub fn new(
        config: ActionConfig,
        builder: Arc<dyn EventPayloadBuilder>,
        headers: HeaderSubscriberRegistry,
        dispatcher: QueueDispatcher,
    ) -> Self {
        Self {
            config,
            builder,
            headers,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    /// Emitting events is open to every user.
    pub fn access(&self, _user: &User) -> bool {
        true
    }

    #[tracing::instrument(
        skip_all,
        fields(
            entity.kind = %subject.kind(),
            entity.id = subject.id(),
            queue = %self.config.queue(),
            event = %self.config.event(),
        )
    )]
    pub async fn execute(
        &self,
        subject: &EventSubject,
        user: &User,
        messenger: &dyn StatusMessenger,
    ) -> Result<QueueMessage, AppError> {
        match self.prepare_and_send(subject, user).await {
            Ok(message) => Ok(message),
            Err(e) => {
                let text = match &e {
                    AppError::HeaderBuild(m) => m.clone(),
                    AppError::Dispatch(m) => format!("Error publishing message: {}", m),
                    AppError::Configuration(m) => format!("Error generating event: {}", m),
                    other => format!("Error generating event: {}", other),
                };
                tracing::error!(error = %e, "{}", text);
                messenger.add_error(text);
                Err(e)
            }
        }
    }

    async fn prepare_and_send(
        &self,
        subject: &EventSubject,
        user: &User,
    ) -> Result<QueueMessage, AppError> {
        self.config.validate()?;
        let payload = self.builder.build(subject, user, &self.config).await?;

        let ctx = HeaderContext {
            subject,
            user,
            payload: &payload,
            config: &self.config,
        };
        let headers = self.headers.collect(&ctx).await?;
        let message = QueueMessage::new(headers, payload.to_bytes()?);

        self.dispatcher.send(self.config.queue(), &message).await?;
        Ok(message)
    }
}
