//! Subscriber callbacks.
//!
//! Every subscription record carries a `SubscriptionHandler`: the connect,
//! disconnect and data callbacks of the subsystem that owns the topic
//! (a device manager, a sensor module, a console command).
//!
//! # Object Safety
//!
//! The trait is dyn-compatible, so records store `&dyn SubscriptionHandler`
//! without generic parameters. This keeps the registry a plain array of
//! records in `no_std` environments without heap allocation.
//!
//! # Publishing from callbacks
//!
//! Callbacks run on the session worker and are synchronous. They must not
//! wait on the session; use [`Session::try_publish`](super::Session::try_publish)
//! to answer a command, or flag the work and let the owning task publish it.

use crate::packet::InboundMessage;

/// Callbacks of a subscribed subsystem.
///
/// All methods default to doing nothing. Handlers are shared between the
/// owning subsystem and the worker, so they take `&self` and keep mutable
/// state behind atomics or a blocking mutex.
///
/// # Example
///
/// ```ignore
/// struct LightCommands {
///     toggles: AtomicU32,
/// }
///
/// impl SubscriptionHandler for LightCommands {
///     fn on_data(&self, msg: &InboundMessage<'_>) {
///         if msg.payload == b"toggle" {
///             self.toggles.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait SubscriptionHandler: Sync {
    /// The broker connection is up and this record has been (re)subscribed.
    fn on_connect(&self) {}

    /// The broker connection was lost.
    fn on_disconnect(&self) {}

    /// A message arrived on a topic this record matches.
    fn on_data(&self, _msg: &InboundMessage<'_>) {}
}

/// A handler that ignores every callback.
///
/// Blank subscription templates use it until the caller installs its own.
pub struct NoopHandler;

impl SubscriptionHandler for NoopHandler {}

/// Blanket implementation for references, so `&H` can be stored wherever a
/// handler is expected.
impl<H: SubscriptionHandler + ?Sized> SubscriptionHandler for &H {
    fn on_connect(&self) {
        (**self).on_connect()
    }

    fn on_disconnect(&self) {
        (**self).on_disconnect()
    }

    fn on_data(&self, msg: &InboundMessage<'_>) {
        (**self).on_data(msg)
    }
}
