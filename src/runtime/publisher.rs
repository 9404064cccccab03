//! The publish gate.
//!
//! One binary permit guards the single in-flight publish. Callers acquire it
//! (bounded by their timeout), hand the copied request to the worker through
//! the mailbox, and return. Who releases it depends on the QoS:
//!
//! - QoS 0: the caller, right after the handoff. Nothing will acknowledge it.
//! - QoS 1 and 2: the worker, on the matching `Published` event, on a
//!   transport `Error`, on a failed submit, or when the connection goes
//!   down with the message still unacknowledged.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, with_timeout};

use crate::error::{RejectReason, SessionError};

/// Single-slot permit.
///
/// Implemented as a one-element channel: the permit is held while the
/// channel holds a token, so acquiring is a send that waits for room and
/// releasing is a receive that never waits.
pub struct PublishGate<M: RawMutex> {
    permit: Channel<M, (), 1>,
}

impl<M: RawMutex> PublishGate<M> {
    pub const fn new() -> Self {
        Self {
            permit: Channel::new(),
        }
    }

    /// Wait up to `timeout` for the permit.
    pub async fn acquire(&self, timeout: Duration) -> Result<(), SessionError> {
        with_timeout(timeout, self.permit.send(()))
            .await
            .map_err(|_| SessionError::PublishRejected(RejectReason::Timeout))
    }

    /// Take the permit only if it is free right now.
    pub fn try_acquire(&self) -> Result<(), SessionError> {
        self.permit
            .try_send(())
            .map_err(|_| SessionError::PublishRejected(RejectReason::Timeout))
    }

    /// Give the permit back. Returns `false` if it was not held.
    pub fn release(&self) -> bool {
        self.permit.try_receive().is_ok()
    }

    pub fn is_available(&self) -> bool {
        self.permit.is_empty()
    }
}

impl<M: RawMutex> Default for PublishGate<M> {
    fn default() -> Self {
        Self::new()
    }
}
