//! Header extension point for outgoing queue messages.
//!
//! Subscribers run in registration order over one [`HeaderBag`]. A header
//! set twice keeps the value written last.

use chrono::Duration;
use curator_core::models::{ActionConfig, Entity, EventPayload, EventSubject, User};
use curator_core::AppError;
use indexmap::IndexMap;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::token::Clock;

/// Everything a subscriber may look at while contributing headers.
#[derive(Debug, Clone, Copy)]
pub struct HeaderContext<'a> {
    pub subject: &'a EventSubject,
    pub user: &'a User,
    pub payload: &'a EventPayload,
    pub config: &'a ActionConfig,
}

/// Add/overwrite-only header map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag(IndexMap<String, String>);

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, String> {
        self.0
    }
}

pub trait HeaderSubscriber: Send + Sync {
    fn name(&self) -> &str;

    /// Adds headers for one message. An error aborts the dispatch.
    fn contribute(&self, ctx: &HeaderContext<'_>, headers: &mut HeaderBag) -> Result<(), AppError>;
}

/// Ordered list of header subscribers.
///
/// Cloning shares the underlying list, so subscribers registered through one
/// handle are seen by every action holding another.
#[derive(Clone, Default)]
pub struct HeaderSubscriberRegistry {
    subscribers: Arc<RwLock<Vec<Arc<dyn HeaderSubscriber>>>>,
}

impl HeaderSubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, subscriber: Arc<dyn HeaderSubscriber>) {
        tracing::debug!(subscriber = subscriber.name(), "Registering header subscriber");
        self.subscribers.write().await.push(subscriber);
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    pub async fn collect(
        &self,
        ctx: &HeaderContext<'_>,
    ) -> Result<IndexMap<String, String>, AppError> {
        let subscribers = self.subscribers.read().await;
        let mut bag = HeaderBag::new();
        for subscriber in subscribers.iter() {
            subscriber.contribute(ctx, &mut bag).map_err(|e| match e {
                AppError::HeaderBuild(_) => e,
                other => AppError::HeaderBuild(format!(
                    "Header subscriber '{}' failed: {}",
                    subscriber.name(),
                    other
                )),
            })?;
        }
        Ok(bag.into_inner())
    }
}

/// Identifies the entity and event a message is about.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntityContextHeaders;

impl HeaderSubscriber for EntityContextHeaders {
    fn name(&self) -> &str {
        "entity_context"
    }

    fn contribute(&self, ctx: &HeaderContext<'_>, headers: &mut HeaderBag) -> Result<(), AppError> {
        headers.set("X-Entity-Type", ctx.subject.kind().as_str());
        headers.set("X-Entity-Id", ctx.subject.id().to_string());
        headers.set("X-Event-Kind", ctx.config.event().as_str());
        headers.set("X-User-Id", ctx.user.id().to_string());
        Ok(())
    }
}

/// JWT claims identifying the acting user to queue consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub uid: i64,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Signs an HS256 bearer token for the acting user.
pub struct JwtAuthorizationHeader {
    key: EncodingKey,
    expiry: Duration,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl JwtAuthorizationHeader {
    pub fn new(
        secret: &str,
        expiry_hours: i64,
        issuer: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::hours(expiry_hours),
            issuer: issuer.into(),
            clock,
        }
    }

    fn claims_for(&self, user: &User) -> Claims {
        let now = self.clock.now();
        Claims {
            sub: user.name.clone(),
            uid: user.id,
            roles: user.roles.clone(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
            iss: self.issuer.clone(),
        }
    }
}

impl HeaderSubscriber for JwtAuthorizationHeader {
    fn name(&self) -> &str {
        "jwt_authorization"
    }

    fn contribute(&self, ctx: &HeaderContext<'_>, headers: &mut HeaderBag) -> Result<(), AppError> {
        let token = encode(&Header::default(), &self.claims_for(ctx.user), &self.key)
            .map_err(|e| AppError::HeaderBuild(format!("Could not sign token: {}", e)))?;
        headers.set("Authorization", format!("Bearer {}", token));
        Ok(())
    }
}
