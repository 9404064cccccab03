//! # MQTT Session Manager for Embedded Gateways
//!
//! `gateway-mqtt` sits between the subsystems of an embedded gateway (device
//! managers, sensor modules, console commands) and the one broker connection
//! they all share. It is `no_std`, allocation-free, and built on the
//! [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Core Features
//!
//! - **One connection, many users:** any number of tasks subscribe and
//!   publish through a shared [`Session`](runtime::Session); a single
//!   [`SessionWorker`](runtime::SessionWorker) is the only code that talks to
//!   the transport.
//! - **Subscriptions survive reconnects:** every allocated subscription is
//!   re-issued, in allocation order, each time the broker connection comes
//!   back, and its owner's connect callback runs.
//! - **Serialized publishing:** one acknowledged publish is in flight at a
//!   time; callers wait at most their own timeout for their turn.
//! - **Transport Agnostic:** the [`TransportDriver`](transport::TransportDriver)
//!   trait covers start/stop/subscribe/unsubscribe/publish; the driver pushes
//!   its events back with [`Session::notify`](runtime::Session::notify).
//! - **Explicit reconnect policy:** stay offline until told otherwise, or
//!   retry after a fixed delay ([`ReconnectPolicy`](config::ReconnectPolicy)).
//!
//! ## Usage
//!
//! ```ignore
//! static SESSION: Session<'static, CriticalSectionRawMutex> = Session::new();
//!
//! // transport task
//! let worker = SessionWorker::<_, _, 16>::new(&SESSION, EspTransport::new());
//! spawner.spawn(mqtt_worker(worker))?;
//!
//! // application
//! SESSION.initialize(SessionConfig::new("192.168.1.10", 1883)?)?;
//! SESSION.start_session()?;
//! let handle = SESSION
//!     .allocate_subscription(SubscriptionRecord::new("dev1/cmd", QoS::AtMostOnce, &LIGHT)?)
//!     .await?;
//! SESSION
//!     .publish(&Message::new("dev1/temp", b"21.5"), Duration::from_millis(1000))
//!     .await?;
//! ```
//!
//! ## Logging
//!
//! Enable one of the `log`, `defmt` or `esp32-log` features to get the
//! session's log output; without them logging compiles away.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod packet;
pub mod runtime;
pub mod transport;

// Re-export key types for easier access at the crate root.
pub use config::{ReconnectPolicy, SessionConfig};
pub use error::{RejectReason, SessionError};
pub use packet::{Message, QoS};
pub use runtime::{Session, SessionState, SessionWorker, SubscriptionHandle, SubscriptionRecord};
pub use transport::{TransportDriver, TransportEvent};
