//! STOMP 1.2 client over TCP

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use curator_core::BrokerConfig;
use futures::{SinkExt, StreamExt};
use indexmap::IndexMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use super::frame::{StompCodec, StompCommand, StompFrame};
use super::{BrokerConnector, BrokerSession};

/// Opens one TCP connection per session.
#[derive(Debug, Clone)]
pub struct StompConnector {
    config: BrokerConfig,
}

impl StompConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl BrokerConnector for StompConnector {
    #[tracing::instrument(skip(self), fields(broker.host = %self.config.host, broker.port = self.config.port))]
    async fn connect(&self) -> anyhow::Result<Box<dyn BrokerSession>> {
        let limit = self.timeout();
        let stream = timeout(
            limit,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .context("Timed out connecting to broker")?
        .context("Failed to connect to broker")?;

        let mut framed = Framed::new(stream, StompCodec);

        let host = self
            .config
            .vhost
            .clone()
            .unwrap_or_else(|| self.config.host.clone());
        let mut connect = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(login) = &self.config.login {
            connect = connect.header("login", login.clone());
        }
        if let Some(passcode) = &self.config.passcode {
            connect = connect.header("passcode", passcode.clone());
        }
        framed
            .send(connect)
            .await
            .context("Failed to send CONNECT frame")?;

        let reply = timeout(limit, framed.next())
            .await
            .context("Timed out waiting for CONNECTED frame")?
            .context("Broker closed the connection during handshake")?
            .context("Failed to read CONNECTED frame")?;

        match reply.command {
            StompCommand::Connected => {
                tracing::debug!(
                    version = reply.get_header("version").unwrap_or("1.0"),
                    "Connected to broker"
                );
            }
            StompCommand::Error => bail!("Broker refused connection: {}", describe_error(&reply)),
            other => bail!("Unexpected {} frame during handshake", other),
        }

        Ok(Box::new(StompSession {
            framed,
            timeout: limit,
            receipts: 0,
        }))
    }
}

fn describe_error(frame: &StompFrame) -> String {
    let message = frame.get_header("message").unwrap_or("unknown error");
    if frame.body.is_empty() {
        message.to_string()
    } else {
        format!("{} ({})", message, String::from_utf8_lossy(&frame.body).trim())
    }
}

struct StompSession {
    framed: Framed<TcpStream, StompCodec>,
    timeout: Duration,
    receipts: u64,
}

impl StompSession {
    async fn write(&mut self, frame: StompFrame) -> anyhow::Result<()> {
        let command = frame.command;
        self.framed
            .send(frame)
            .await
            .with_context(|| format!("Failed to send {} frame", command))
    }

    /// Sends `frame` with a receipt header and waits for the matching RECEIPT.
    async fn write_with_receipt(&mut self, frame: StompFrame) -> anyhow::Result<()> {
        self.receipts += 1;
        let receipt = format!("{}-{}", frame.command.as_str().to_lowercase(), self.receipts);
        self.write(frame.header("receipt", receipt.clone())).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.framed.next())
                .await
                .with_context(|| format!("Timed out waiting for receipt {}", receipt))?
                .context("Broker closed the connection")?
                .context("Failed to read frame from broker")?;

            match frame.command {
                StompCommand::Receipt if frame.get_header("receipt-id") == Some(receipt.as_str()) => {
                    return Ok(());
                }
                StompCommand::Error => bail!("Broker error: {}", describe_error(&frame)),
                other => {
                    tracing::debug!(command = %other, "Ignoring frame while awaiting receipt");
                }
            }
        }
    }
}

#[async_trait]
impl BrokerSession for StompSession {
    async fn begin(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.write(StompFrame::new(StompCommand::Begin).header("transaction", transaction))
            .await
    }

    async fn send(
        &mut self,
        transaction: &str,
        destination: &str,
        headers: &IndexMap<String, String>,
        body: Bytes,
    ) -> anyhow::Result<()> {
        let mut frame = StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("transaction", transaction)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string());
        for (name, value) in headers {
            frame = frame.header(name.clone(), value.clone());
        }
        self.write(frame.body(body)).await
    }

    async fn commit(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.write_with_receipt(
            StompFrame::new(StompCommand::Commit).header("transaction", transaction),
        )
        .await
    }

    async fn abort(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.write(StompFrame::new(StompCommand::Abort).header("transaction", transaction))
            .await
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let mut session = self;
        session
            .write_with_receipt(StompFrame::new(StompCommand::Disconnect))
            .await
    }
}
