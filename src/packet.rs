//! # Message Types
//!
//! Owned and borrowed representations of the messages that travel between
//! caller subsystems, the session worker and the transport driver. The wire
//! encoding itself belongs to the transport; these types only carry bounded
//! topic and payload buffers.

use heapless::{String, Vec};

use crate::error::{RejectReason, SessionError};

/// Maximum length of a topic, in bytes.
pub const MAX_TOPIC_LEN: usize = 256;

/// Maximum length of a publish or data payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 256;

/// Bounded topic storage.
pub type Topic = String<MAX_TOPIC_LEN>;

/// Bounded payload storage.
pub type Payload = Vec<u8, MAX_PAYLOAD_LEN>;

/// Identifier the transport assigns to a submitted subscribe, unsubscribe or publish.
pub type MessageId = u16;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Whether the transport reports completion with a `Published` event.
    ///
    /// Anything above QoS 0 is acknowledged; the exactly-once handshake is
    /// left to the transport and treated like QoS 1 here.
    pub fn requires_ack(self) -> bool {
        self != QoS::AtMostOnce
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}

/// A message a caller wants published, borrowing its topic and payload.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

impl<'a> Message<'a> {
    /// Create a non-retained QoS 0 message.
    pub fn new(topic: &'a str, payload: &'a [u8]) -> Self {
        Self {
            topic,
            payload,
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// An owned publish request, copied out of the caller's buffers so it can
/// be handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: Topic,
    pub payload: Payload,
    pub qos: QoS,
    pub retain: bool,
    /// Assigned by the transport once the request has been submitted.
    pub message_id: Option<MessageId>,
}

impl PublishRequest {
    /// Copy a borrowed message into bounded storage.
    ///
    /// Fails with `PublishRejected(Oversize)` when the topic or payload does
    /// not fit; nothing else is touched in that case.
    pub fn from_message(message: &Message<'_>) -> Result<Self, SessionError> {
        let oversize = SessionError::PublishRejected(RejectReason::Oversize);
        if message.topic.len() > MAX_TOPIC_LEN || message.payload.len() > MAX_PAYLOAD_LEN {
            return Err(oversize);
        }

        let mut topic = Topic::new();
        topic.push_str(message.topic).map_err(|_| oversize)?;
        let payload = Payload::from_slice(message.payload).map_err(|_| oversize)?;

        Ok(Self {
            topic,
            payload,
            qos: message.qos,
            retain: message.retain,
            message_id: None,
        })
    }
}

/// A message received from the broker, as handed to data callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundMessage<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
}

/// Bounded topic comparison used for data dispatch.
///
/// A stored topic accepts a received topic when its first `received.len()`
/// bytes equal the received topic. There is no wildcard handling.
pub fn topic_matches(stored: &str, received: &str) -> bool {
    stored.as_bytes().get(..received.len()) == Some(received.as_bytes())
}
