//! # Error Types
//!
//! Errors returned synchronously by the session API. Asynchronous transport
//! failures never surface here directly; they show up through subscription
//! callbacks, the logs, and the forced release of the publish permit.

use core::fmt;

/// Why a publish was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RejectReason {
    /// The topic or payload exceeds its maximum length.
    Oversize,
    /// The publish permit could not be acquired within the caller's timeout.
    Timeout,
    /// The worker mailbox had no room for the request.
    MailboxFull,
    /// The transport refused to accept the message.
    SubmitFailed,
}

/// The primary error enum of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// The broker configuration is missing a value or a value is out of bounds.
    ConfigInvalid,
    /// The subscription registry has no free slot.
    AllocationFailed,
    /// The operation needs an initialized (or connected) session.
    NotConnected,
    /// A publish request was refused; the permit is free again.
    PublishRejected(RejectReason),
    /// The transport driver reported a failure.
    TransportError,
    /// The subscription handle does not refer to a live record.
    UnknownSubscription,
    /// A subscription topic exceeds the maximum topic length.
    TopicTooLong,
    /// The worker mailbox is full; the signal was not queued.
    Busy,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ConfigInvalid => f.write_str("invalid broker configuration"),
            SessionError::AllocationFailed => f.write_str("subscription registry is full"),
            SessionError::NotConnected => f.write_str("session is not connected"),
            SessionError::PublishRejected(reason) => write!(f, "publish rejected: {:?}", reason),
            SessionError::TransportError => f.write_str("transport error"),
            SessionError::UnknownSubscription => f.write_str("unknown subscription handle"),
            SessionError::TopicTooLong => f.write_str("topic too long"),
            SessionError::Busy => f.write_str("session worker is busy"),
        }
    }
}
