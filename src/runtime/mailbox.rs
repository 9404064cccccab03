//! Messages consumed by the session worker.
//!
//! Callers talk to the worker with `Command`s; the transport driver talks to
//! it with `TransportEvent`s on a separate queue so a burst of caller
//! commands can never crowd out connection events. Registry requests are
//! answered on the reply channel, tagged with the ticket of the request they
//! answer.

use embassy_sync::channel::Channel;

use super::registry::{SubscriptionHandle, SubscriptionRecord};
use crate::error::SessionError;
use crate::packet::PublishRequest;
use crate::transport::TransportEvent;

/// Depth of the caller command mailbox.
pub const MAILBOX_DEPTH: usize = 8;

/// Depth of the transport event queue.
pub const EVENT_DEPTH: usize = 8;

/// A request from a caller context.
pub enum Command<'a> {
    /// Connect to the broker.
    Start,
    /// Disconnect from the broker.
    Stop,
    /// Submit the enclosed request; the caller holds (or already released) the permit.
    Publish(PublishRequest),
    Allocate {
        ticket: u32,
        record: SubscriptionRecord<'a>,
    },
    Deallocate {
        ticket: u32,
        handle: SubscriptionHandle,
    },
    Subscribe {
        ticket: u32,
        handle: SubscriptionHandle,
    },
    Unsubscribe {
        ticket: u32,
        handle: SubscriptionHandle,
    },
    /// Release a subscription whose caller stopped waiting for the handle.
    /// Not answered.
    Reclaim { handle: SubscriptionHandle },
}

impl Command<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Publish(_) => "publish",
            Command::Allocate { .. } => "allocate",
            Command::Deallocate { .. } => "deallocate",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::Reclaim { .. } => "reclaim",
        }
    }
}

/// The worker's answer to a registry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub ticket: u32,
    pub result: Result<Option<SubscriptionHandle>, SessionError>,
}

pub type CommandChannel<'a, M> = Channel<M, Command<'a>, MAILBOX_DEPTH>;

pub type EventChannel<M> = Channel<M, TransportEvent, EVENT_DEPTH>;

pub type ReplyChannel<M> = Channel<M, Reply, 1>;
