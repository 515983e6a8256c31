//! Event generation and queue dispatch.
//!
//! An [`EmitEventAction`] builds a payload for an entity change, lets the
//! registered header subscribers add message headers, and publishes the
//! message inside one broker transaction.

pub mod action;
pub mod dispatcher;
pub mod headers;
pub mod payload;
pub mod token;
pub mod url;

pub use action::EmitEventAction;
pub use dispatcher::QueueDispatcher;
pub use headers::{
    EntityContextHeaders, HeaderBag, HeaderContext, HeaderSubscriber, HeaderSubscriberRegistry,
    JwtAuthorizationHeader,
};
pub use payload::{builder_for, EmitEventPayload, EventPayloadBuilder, GenerateDerivativePayload};
pub use token::{expand_tokens, Clock, FixedClock, SystemClock, TokenContext};
pub use self::url::{DestinationParts, UrlGenerator};
