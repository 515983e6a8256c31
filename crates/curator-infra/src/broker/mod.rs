//! Message broker transport
//!
//! A [`BrokerConnector`] opens a [`BrokerSession`]; a session groups sends
//! into broker transactions so that nothing reaches consumers before commit.

mod frame;
mod memory;
mod stomp;

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;

pub use frame::{StompCodec, StompCommand, StompFrame};
pub use memory::{DeliveredMessage, FailurePoint, InMemoryBroker};
pub use stomp::StompConnector;

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn BrokerSession>>;
}

/// A connected session able to run broker transactions.
#[async_trait]
pub trait BrokerSession: Send {
    async fn begin(&mut self, transaction: &str) -> anyhow::Result<()>;

    async fn send(
        &mut self,
        transaction: &str,
        destination: &str,
        headers: &IndexMap<String, String>,
        body: Bytes,
    ) -> anyhow::Result<()>;

    async fn commit(&mut self, transaction: &str) -> anyhow::Result<()>;

    async fn abort(&mut self, transaction: &str) -> anyhow::Result<()>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}
