//! # Transport Driver Abstraction
//!
//! This module defines the `TransportDriver` trait, the boundary between the
//! session manager and whatever owns the physical broker connection (an
//! ESP-IDF client, a TCP stack, a modem). The driver encodes packets and keeps
//! the socket alive; the session only tells it what to do and reacts to the
//! events it reports.
//!
//! With the Rust 2024 Edition, this trait uses native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use crate::config::SessionConfig;
use crate::packet::{MessageId, Payload, QoS, Topic};

/// A trait representing the driver of the single broker connection.
///
/// Only the session worker calls these methods, so implementations never
/// see concurrent calls.
#[allow(async_fn_in_trait)]
pub trait TransportDriver {
    /// The error type returned by the driver.
    type Error: core::fmt::Debug;

    /// Begins connecting to the broker described by `config`.
    ///
    /// Completion is reported later with `TransportEvent::Connected`.
    async fn start(&mut self, config: &SessionConfig) -> Result<(), Self::Error>;

    /// Tears the connection down.
    async fn stop(&mut self) -> Result<(), Self::Error>;

    /// Submits a subscription and returns its message id.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<MessageId, Self::Error>;

    /// Submits an unsubscription and returns its message id.
    async fn unsubscribe(&mut self, topic: &str) -> Result<MessageId, Self::Error>;

    /// Submits a publish and returns its message id.
    ///
    /// For QoS 0 the id carries no meaning and no `Published` event follows.
    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Self::Error>;
}

/// Events reported by the transport driver.
///
/// Drivers push these through [`Session::notify`](crate::runtime::Session::notify)
/// from their own context; the worker consumes them in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Subscribed(MessageId),
    Unsubscribed(MessageId),
    Published(MessageId),
    Data { topic: Topic, payload: Payload },
    Error,
}

impl TransportEvent {
    /// Build a `Data` event. Returns `None` if the topic or payload does not
    /// fit the bounded buffers; nothing is truncated.
    pub fn data(topic: &str, payload: &[u8]) -> Option<Self> {
        let mut owned = Topic::new();
        owned.push_str(topic).ok()?;
        let payload = Payload::from_slice(payload).ok()?;
        Some(TransportEvent::Data {
            topic: owned,
            payload,
        })
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::Disconnected => "disconnected",
            TransportEvent::Subscribed(_) => "subscribed",
            TransportEvent::Unsubscribed(_) => "unsubscribed",
            TransportEvent::Published(_) => "published",
            TransportEvent::Data { .. } => "data",
            TransportEvent::Error => "error",
        }
    }
}
