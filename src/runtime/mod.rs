//! MQTT Session Runtime
//!
//! Everything between the application's subsystems and the transport driver.
//!
//! # Overview
//!
//! - [`Session`]: the object the application creates once and shares by
//!   reference. Subsystems allocate subscriptions and publish through it;
//!   the transport driver reports events to it.
//! - [`SessionWorker`]: the single task that owns the subscription registry
//!   and the transport driver. It connects, resubscribes after every
//!   reconnect, fans events out to subscribers, and submits publishes.
//! - [`PublishGate`]: the permit that keeps exactly one acknowledged publish
//!   in flight, so callers get backpressure bounded by their own timeout.
//!
//! # Single writer
//!
//! Callers and the transport never touch the registry or the lifecycle
//! state. They queue messages: commands from callers, events from the
//! transport. Registry requests are answered on a reply channel. The worker
//! applies everything in arrival order, so an allocation is either part of
//! a reconnect fan-out or strictly after it.

pub(crate) mod event_loop;
pub(crate) mod mailbox;
pub(crate) mod publisher;
pub(crate) mod registry;
pub(crate) mod session;
pub(crate) mod state;
pub(crate) mod traits;

pub use event_loop::SessionWorker;
pub use mailbox::{EVENT_DEPTH, MAILBOX_DEPTH};
pub use publisher::PublishGate;
pub use registry::{Entry, SubscriptionHandle, SubscriptionRecord, SubscriptionRegistry};
pub use session::Session;
pub use state::{ConnectAction, SessionState, Transition};
pub use traits::{NoopHandler, SubscriptionHandler};

// Re-export for handler implementations
pub use crate::packet::InboundMessage;
