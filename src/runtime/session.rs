//! The application-facing session object.
//!
//! A `Session` is created once by the application and shared by reference
//! with every subsystem that publishes or subscribes, and with the transport
//! driver for event delivery. It owns no registry and performs no I/O: each
//! call either answers from the observable mirrors, takes the publish permit,
//! or queues a message for the [`SessionWorker`](super::SessionWorker).

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant, with_deadline};

use super::mailbox::{Command, CommandChannel, EventChannel, ReplyChannel};
use super::publisher::PublishGate;
use super::registry::{SubscriptionHandle, SubscriptionRecord};
use super::state::{ConnectAction, SessionState, Transition};
use crate::config::SessionConfig;
use crate::error::{RejectReason, SessionError};
use crate::packet::{Message, PublishRequest};
use crate::transport::TransportEvent;

/// Shared state of the broker session.
///
/// `M` selects the raw mutex guarding the queues; use
/// `CriticalSectionRawMutex` when callers run on several executors or in
/// interrupt context, `NoopRawMutex` when everything shares one executor.
///
/// ```ignore
/// static SESSION: Session<'static, CriticalSectionRawMutex> = Session::new();
///
/// let mut config = Session::<CriticalSectionRawMutex>::initialize_parameter();
/// config.host.push_str("192.168.1.10").ok();
/// config.port = 1883;
/// SESSION.initialize(config)?;
/// SESSION.start_session()?;
///
/// let cmd = SESSION
///     .allocate_subscription(SubscriptionRecord::new("dev1/cmd", QoS::AtMostOnce, &LIGHT)?)
///     .await?;
/// SESSION
///     .publish(&Message::new("dev1/temp", b"21.5"), Duration::from_millis(1000))
///     .await?;
/// ```
pub struct Session<'a, M: RawMutex> {
    config: BlockingMutex<M, RefCell<Option<SessionConfig>>>,
    state: BlockingMutex<M, Cell<SessionState>>,
    subscriptions: BlockingMutex<M, Cell<usize>>,
    pub(crate) commands: CommandChannel<'a, M>,
    pub(crate) events: EventChannel<M>,
    pub(crate) replies: ReplyChannel<M>,
    /// Serializes registry requests; holds the next request ticket.
    requests: Mutex<M, u32>,
    pub(crate) gate: PublishGate<M>,
}

impl<'a, M: RawMutex> Session<'a, M> {
    pub const fn new() -> Self {
        Self {
            config: BlockingMutex::new(RefCell::new(None)),
            state: BlockingMutex::new(Cell::new(SessionState::Uninitialized)),
            subscriptions: BlockingMutex::new(Cell::new(0)),
            commands: CommandChannel::new(),
            events: EventChannel::new(),
            replies: ReplyChannel::new(),
            requests: Mutex::new(0),
            gate: PublishGate::new(),
        }
    }

    /// A blank configuration for the caller to fill in before `initialize`.
    pub fn initialize_parameter() -> SessionConfig {
        debug!("mqtt: blank session parameters prepared");
        SessionConfig::default()
    }

    /// Validate and store the broker configuration, moving the session to `Ready`.
    ///
    /// Accepted while no connection is active or pending. Connecting or
    /// connected sessions, a missing host, and port 0 fail with `ConfigInvalid`.
    ///
    /// The state check, the configuration store and the move to `Ready`
    /// happen under one lock, so the worker never sees a half-applied
    /// configuration.
    pub fn initialize(&self, config: SessionConfig) -> Result<(), SessionError> {
        config.validate()?;

        let host = config.host.clone();
        let port = config.port;
        let committed = self.state.lock(|state| {
            let current = state.get();
            if !current.can_initialize() {
                return Err(current);
            }
            self.config.lock(|slot| *slot.borrow_mut() = Some(config));
            state.set(SessionState::Ready);
            Ok(current)
        });

        match committed {
            Ok(previous) => {
                info!("mqtt: initialized for {}:{}", host.as_str(), port);
                if previous != SessionState::Ready {
                    debug!("mqtt: state {:?} -> {:?}", previous, SessionState::Ready);
                }
                Ok(())
            }
            Err(state) => {
                warn!("mqtt: refusing to initialize while {:?}", state);
                Err(SessionError::ConfigInvalid)
            }
        }
    }

    /// Ask the worker to connect. Succeeds without effect if already
    /// connecting or connected.
    pub fn start_session(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Uninitialized {
            return Err(SessionError::NotConnected);
        }
        self.signal(Command::Start)
    }

    /// Ask the worker to disconnect and cancel any scheduled reconnect.
    pub fn stop_session(&self) -> Result<(), SessionError> {
        self.signal(Command::Stop)
    }

    /// Register a subscription record.
    ///
    /// The record joins the next `Connected` fan-out; call
    /// [`subscribe`](Self::subscribe) to activate it on a live connection.
    ///
    /// If the returned future is dropped after the request was queued, the
    /// record is still allocated by the worker; it is released again as soon
    /// as its unclaimed reply is noticed by the next registry request.
    pub async fn allocate_subscription(
        &self,
        record: SubscriptionRecord<'a>,
    ) -> Result<SubscriptionHandle, SessionError> {
        self.request(|ticket| Command::Allocate { ticket, record })
            .await?
            .ok_or(SessionError::AllocationFailed)
    }

    /// Remove a subscription, unsubscribing it first if it is active.
    pub async fn deallocate_subscription(
        &self,
        handle: SubscriptionHandle,
    ) -> Result<(), SessionError> {
        self.request(|ticket| Command::Deallocate { ticket, handle })
            .await
            .map(|_| ())
    }

    /// Subscribe a record on the live connection.
    pub async fn subscribe(&self, handle: SubscriptionHandle) -> Result<(), SessionError> {
        self.request(|ticket| Command::Subscribe { ticket, handle })
            .await
            .map(|_| ())
    }

    /// Unsubscribe a record on the live connection. The record stays
    /// allocated and is subscribed again by the next `Connected` fan-out.
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SessionError> {
        self.request(|ticket| Command::Unsubscribe { ticket, handle })
            .await
            .map(|_| ())
    }

    /// Queue a message for publishing.
    ///
    /// Waits at most `timeout` in total, first for the publish permit and
    /// then for room in the worker mailbox, and returns as soon as the
    /// worker has the request; transmission happens afterwards. Oversize
    /// messages are refused before the permit is touched.
    pub async fn publish(
        &self,
        message: &Message<'_>,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        let request = self.prepare(message)?;
        if let Err(err) = self.gate.acquire(timeout).await {
            debug!("mqtt: publish permit busy, dropping {}", message.topic);
            return Err(err);
        }

        let acknowledged = request.qos.requires_ack();
        if with_deadline(deadline, self.commands.send(Command::Publish(request)))
            .await
            .is_err()
        {
            self.gate.release();
            debug!("mqtt: mailbox stayed full, dropping {}", message.topic);
            return Err(SessionError::PublishRejected(RejectReason::Timeout));
        }
        if !acknowledged {
            self.gate.release();
        }
        Ok(())
    }

    /// Like [`publish`](Self::publish) but never waits; fails with
    /// `PublishRejected(Timeout)` if the permit is taken.
    ///
    /// Safe to call from subscription callbacks.
    pub fn try_publish(&self, message: &Message<'_>) -> Result<(), SessionError> {
        let request = self.prepare(message)?;
        self.gate.try_acquire()?;
        self.hand_off(request)
    }

    /// Number of allocated subscription records.
    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.lock(|count| count.get())
    }

    pub fn state(&self) -> SessionState {
        self.state.lock(|state| state.get())
    }

    /// `true` when no publish holds the permit.
    pub fn is_publish_idle(&self) -> bool {
        self.gate.is_available()
    }

    /// Deliver a transport event to the worker.
    ///
    /// This is the only thing a transport context does with the session. It
    /// never waits; if the event queue is full the event is dropped, logged,
    /// and `false` is returned.
    pub fn notify(&self, event: TransportEvent) -> bool {
        let name = event.name();
        match self.events.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                error!("mqtt: event queue full, dropped {} event", name);
                false
            }
        }
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let previous = self.state.lock(|state| state.replace(next));
        if previous != next {
            debug!("mqtt: state {:?} -> {:?}", previous, next);
        }
    }

    /// Read the state, apply `rule` and store its result in one step.
    /// Returns the state the rule was applied to.
    pub(crate) fn transition(
        &self,
        rule: impl FnOnce(SessionState) -> Transition,
    ) -> (SessionState, Transition) {
        let (previous, transition) = self.state.lock(|state| {
            let previous = state.get();
            let transition = rule(previous);
            state.set(transition.next);
            (previous, transition)
        });
        if previous != transition.next {
            debug!("mqtt: state {:?} -> {:?}", previous, transition.next);
        }
        (previous, transition)
    }

    /// Move to `Connecting` if a connect may start, handing back the state
    /// left behind and the configuration to start with. Otherwise returns
    /// the current state untouched.
    pub(crate) fn begin_connect(&self) -> Result<(SessionState, SessionConfig), SessionState> {
        let claim = self.state.lock(|state| {
            let current = state.get();
            if current.connect() != ConnectAction::Start {
                return Err(current);
            }
            let config = self.config.lock(|slot| slot.borrow().clone()).ok_or(current)?;
            state.set(SessionState::Connecting);
            Ok((current, config))
        });
        if let Ok((previous, _)) = &claim {
            debug!("mqtt: state {:?} -> {:?}", previous, SessionState::Connecting);
        }
        claim
    }

    pub(crate) fn set_subscription_count(&self, count: usize) {
        self.subscriptions.lock(|current| current.set(count));
    }

    pub(crate) fn config(&self) -> Option<SessionConfig> {
        self.config.lock(|slot| slot.borrow().clone())
    }

    fn prepare(&self, message: &Message<'_>) -> Result<PublishRequest, SessionError> {
        if self.state() == SessionState::Uninitialized {
            return Err(SessionError::NotConnected);
        }
        PublishRequest::from_message(message).inspect_err(|_| {
            warn!(
                "mqtt: oversize publish refused ({} byte topic, {} byte payload)",
                message.topic.len(),
                message.payload.len()
            );
        })
    }

    /// Pass a permitted request to the worker. QoS 0 gives the permit back
    /// immediately; acknowledged publishes leave it for the worker.
    fn hand_off(&self, request: PublishRequest) -> Result<(), SessionError> {
        let acknowledged = request.qos.requires_ack();
        if self.commands.try_send(Command::Publish(request)).is_err() {
            self.gate.release();
            warn!("mqtt: mailbox full, publish rejected");
            return Err(SessionError::PublishRejected(RejectReason::MailboxFull));
        }
        if !acknowledged {
            self.gate.release();
        }
        Ok(())
    }

    fn signal(&self, command: Command<'a>) -> Result<(), SessionError> {
        let name = command.name();
        self.commands.try_send(command).map_err(|_| {
            warn!("mqtt: mailbox full, {} signal dropped", name);
            SessionError::Busy
        })
    }

    async fn request(
        &self,
        build: impl FnOnce(u32) -> Command<'a>,
    ) -> Result<Option<SubscriptionHandle>, SessionError> {
        let mut next_ticket = self.requests.lock().await;
        let ticket = *next_ticket;
        *next_ticket = next_ticket.wrapping_add(1);

        self.commands.send(build(ticket)).await;
        loop {
            let reply = self.replies.receive().await;
            if reply.ticket == ticket {
                return reply.result;
            }
            trace!("mqtt: discarding stale reply {}", reply.ticket);
            if let Ok(Some(handle)) = reply.result {
                // Its caller gave up before learning the handle.
                if self.commands.try_send(Command::Reclaim { handle }).is_err() {
                    warn!("mqtt: mailbox full, orphaned subscription {:?} kept", handle);
                }
            }
        }
    }
}

impl<M: RawMutex> Default for Session<'_, M> {
    fn default() -> Self {
        Self::new()
    }
}
