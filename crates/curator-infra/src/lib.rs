//! Curator Infrastructure Library
//!
//! Shared infrastructure for curator services:
//! - Telemetry initialization
//! - Message broker transport (STOMP over TCP and an in-memory broker)

pub mod broker;
pub mod telemetry;

// Re-export commonly used types
pub use broker::{
    BrokerConnector, BrokerSession, DeliveredMessage, FailurePoint, InMemoryBroker,
    StompConnector,
};
