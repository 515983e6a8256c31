use anyhow::Context;
use curator_core::models::QueueMessage;
use curator_core::AppError;
use curator_infra::{BrokerConnector, BrokerSession};
use std::sync::Arc;
use uuid::Uuid;

/// Publishes one message per broker transaction, on a fresh session.
#[derive(Clone)]
pub struct QueueDispatcher {
    connector: Arc<dyn BrokerConnector>,
}

impl QueueDispatcher {
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self { connector }
    }

    #[tracing::instrument(skip(self, message), fields(destination = %destination))]
    pub async fn send(&self, destination: &str, message: &QueueMessage) -> Result<(), AppError> {
        let mut session = self
            .connector
            .connect()
            .await
            .context("Failed to connect to broker")
            .map_err(|e| AppError::Dispatch(format!("{e:#}")))?;

        let transaction = Uuid::new_v4().to_string();
        match Self::publish(session.as_mut(), &transaction, destination, message).await {
            Ok(()) => {
                if let Err(e) = session.close().await {
                    tracing::warn!(error = %e, "Broker session did not close cleanly");
                }
                tracing::info!(
                    transaction = %transaction,
                    bytes = message.body.len(),
                    "Message published"
                );
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort(&transaction).await {
                    tracing::warn!(
                        error = %abort_err,
                        transaction = %transaction,
                        "Failed to abort broker transaction"
                    );
                }
                if let Err(close_err) = session.close().await {
                    tracing::warn!(error = %close_err, "Broker session did not close cleanly");
                }
                tracing::error!(error = %e, transaction = %transaction, "Message publish failed");
                Err(AppError::Dispatch(format!("{e:#}")))
            }
        }
    }

    async fn publish(
        session: &mut dyn BrokerSession,
        transaction: &str,
        destination: &str,
        message: &QueueMessage,
    ) -> anyhow::Result<()> {
        session
            .begin(transaction)
            .await
            .context("Failed to begin transaction")?;
        session
            .send(
                transaction,
                destination,
                &message.headers,
                message.body.clone(),
            )
            .await
            .context("Failed to send message")?;
        session
            .commit(transaction)
            .await
            .context("Failed to commit transaction")?;
        Ok(())
    }
}
