//! In-process broker with transactional staging.

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{BrokerConnector, BrokerSession};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub destination: String,
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    Connect,
    Begin,
    Send,
    Commit,
}

#[derive(Debug, Default)]
struct BrokerState {
    delivered: Vec<DeliveredMessage>,
    failures: HashSet<FailurePoint>,
    sessions_opened: usize,
    aborted: Vec<String>,
}

/// Messages become visible only when their transaction commits.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_at(&self, point: FailurePoint) {
        self.state().failures.insert(point);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn delivered(&self) -> Vec<DeliveredMessage> {
        self.state().delivered.clone()
    }

    pub fn messages_for(&self, destination: &str) -> Vec<DeliveredMessage> {
        self.state()
            .delivered
            .iter()
            .filter(|m| m.destination == destination)
            .cloned()
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.state().sessions_opened
    }

    pub fn aborted_transactions(&self) -> Vec<String> {
        self.state().aborted.clone()
    }
}

#[async_trait]
impl BrokerConnector for InMemoryBroker {
    async fn connect(&self) -> anyhow::Result<Box<dyn BrokerSession>> {
        let mut state = self.state();
        if state.failures.contains(&FailurePoint::Connect) {
            bail!("Connection refused");
        }
        state.sessions_opened += 1;
        Ok(Box::new(InMemorySession {
            broker: self.clone(),
            staged: HashMap::new(),
        }))
    }
}

struct InMemorySession {
    broker: InMemoryBroker,
    staged: HashMap<String, Vec<DeliveredMessage>>,
}

impl InMemorySession {
    fn check(&self, point: FailurePoint) -> anyhow::Result<()> {
        if self.broker.state().failures.contains(&point) {
            bail!("Injected broker failure at {:?}", point);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerSession for InMemorySession {
    async fn begin(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.check(FailurePoint::Begin)?;
        if self.staged.contains_key(transaction) {
            bail!("Transaction {} already started", transaction);
        }
        self.staged.insert(transaction.to_string(), Vec::new());
        Ok(())
    }

    async fn send(
        &mut self,
        transaction: &str,
        destination: &str,
        headers: &IndexMap<String, String>,
        body: Bytes,
    ) -> anyhow::Result<()> {
        self.check(FailurePoint::Send)?;
        let Some(staged) = self.staged.get_mut(transaction) else {
            bail!("Unknown transaction {}", transaction);
        };
        staged.push(DeliveredMessage {
            destination: destination.to_string(),
            headers: headers.clone(),
            body,
        });
        Ok(())
    }

    async fn commit(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.check(FailurePoint::Commit)?;
        let Some(staged) = self.staged.remove(transaction) else {
            bail!("Unknown transaction {}", transaction);
        };
        self.broker.state().delivered.extend(staged);
        Ok(())
    }

    async fn abort(&mut self, transaction: &str) -> anyhow::Result<()> {
        self.staged.remove(transaction);
        self.broker.state().aborted.push(transaction.to_string());
        Ok(())
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
