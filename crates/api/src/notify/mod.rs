//! Real-time ticket change notifications
//!
//! Mutation handlers report committed changes through a [`ChangeEmitter`];
//! the hub-backed emitter fans each change out to every open
//! `GET /api/events` stream.
//!
//! # Architecture
//!
//! - **Subscriber**: one open event stream and its delivery channel
//! - **Hub**: registry of subscribers, publishes events to all of them
//! - **Emitter**: narrow interface the ticket routes call after a write
//! - **Handler**: the Server-Sent Events endpoint
//! - **Events**: payloads and their SSE framing

pub mod emitter;
pub mod events;
pub mod handler;
pub mod hub;
pub mod subscriber;

pub use emitter::{ChangeEmitter, HubEmitter};
pub use events::ServerEvent;
pub use handler::events_handler;
pub use hub::{BroadcastHub, DeliveryReport, HubStats};
pub use subscriber::{Subscriber, SubscriberStream};
