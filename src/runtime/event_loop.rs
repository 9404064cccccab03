//! The session worker.
//!
//! `SessionWorker` is the only code that calls the transport driver and the
//! only writer of the subscription registry and the lifecycle state. It
//! sleeps on three sources at once: transport events, caller commands, and
//! the reconnect timer when a reconnect is scheduled. Each message is taken
//! off its queue and handled exactly once.

use core::pin::pin;

use embassy_futures::select::{Either as Either2, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::TrySendError;
use embassy_time::{Instant, Timer};
use futures::future::Either;
use heapless::Vec;

use super::mailbox::{Command, Reply};
use super::registry::{SubscriptionHandle, SubscriptionRecord, SubscriptionRegistry};
use super::session::Session;
use super::state::{ConnectAction, SessionState, Transition};
use crate::config::ReconnectPolicy;
use crate::error::SessionError;
use crate::packet::{InboundMessage, MessageId, Payload, PublishRequest, Topic};
use crate::transport::{TransportDriver, TransportEvent};

enum Wake<'a> {
    Event(TransportEvent),
    Command(Command<'a>),
    Reconnect,
}

/// Drives a [`Session`] against a transport driver.
///
/// Run it in its own task:
///
/// ```ignore
/// #[embassy_executor::task]
/// async fn mqtt_worker(mut worker: SessionWorker<'static, 'static, CriticalSectionRawMutex, EspTransport, 16>) -> ! {
///     worker.run().await
/// }
/// ```
pub struct SessionWorker<'s, 'a, M, T, const MAX_SUBSCRIPTIONS: usize>
where
    M: RawMutex,
    T: TransportDriver,
{
    session: &'s Session<'a, M>,
    transport: T,
    registry: SubscriptionRegistry<'a, MAX_SUBSCRIPTIONS>,
    /// The acknowledged publish whose permit the worker holds.
    in_flight: Option<PublishRequest>,
    reconnect_at: Option<Instant>,
}

impl<'s, 'a, M, T, const MAX_SUBSCRIPTIONS: usize> SessionWorker<'s, 'a, M, T, MAX_SUBSCRIPTIONS>
where
    M: RawMutex,
    T: TransportDriver,
{
    pub fn new(session: &'s Session<'a, M>, transport: T) -> Self {
        Self {
            session,
            transport,
            registry: SubscriptionRegistry::new(),
            in_flight: None,
            reconnect_at: None,
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry<'a, MAX_SUBSCRIPTIONS> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// When the next automatic reconnect fires, if one is scheduled.
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Process messages forever.
    pub async fn run(&mut self) -> ! {
        info!("mqtt: worker started");
        loop {
            self.run_once().await;
        }
    }

    /// Wait for the next message and handle it.
    pub async fn run_once(&mut self) {
        match self.next_wake().await {
            Wake::Event(event) => self.handle_event(event).await,
            Wake::Command(command) => self.handle_command(command).await,
            Wake::Reconnect => {
                self.reconnect_at = None;
                info!("mqtt: reconnect timer elapsed");
                self.connect().await;
            }
        }
    }

    async fn next_wake(&self) -> Wake<'a> {
        let queues = select(
            self.session.events.receive(),
            self.session.commands.receive(),
        );

        let Some(deadline) = self.reconnect_at else {
            return match queues.await {
                Either2::First(event) => Wake::Event(event),
                Either2::Second(command) => Wake::Command(command),
            };
        };

        let timer = Timer::at(deadline);
        match futures::future::select(pin!(queues), pin!(timer)).await {
            Either::Left((Either2::First(event), _)) => Wake::Event(event),
            Either::Left((Either2::Second(command), _)) => Wake::Command(command),
            Either::Right(((), _)) => Wake::Reconnect,
        }
    }

    async fn handle_command(&mut self, command: Command<'a>) {
        trace!("mqtt: command {}", command.name());
        match command {
            Command::Start => {
                self.reconnect_at = None;
                self.connect().await;
            }
            Command::Stop => {
                self.reconnect_at = None;
                let (previous, transition) = self.session.transition(SessionState::stop);
                self.apply(previous, transition, "stop").await;
            }
            Command::Publish(request) => self.submit(request).await,
            Command::Allocate { ticket, record } => {
                let result = self.allocate(record).map(Some);
                self.reply(Reply { ticket, result }).await;
            }
            Command::Deallocate { ticket, handle } => {
                let result = self.deallocate(handle).await.map(|()| None);
                self.reply(Reply { ticket, result }).await;
            }
            Command::Subscribe { ticket, handle } => {
                let result = self.subscribe(handle).await.map(|()| None);
                self.reply(Reply { ticket, result }).await;
            }
            Command::Unsubscribe { ticket, handle } => {
                let result = self.unsubscribe(handle).await.map(|()| None);
                self.reply(Reply { ticket, result }).await;
            }
            Command::Reclaim { handle } => self.reclaim(handle).await,
        }
    }

    /// Answer a registry request. A reply still waiting in the channel
    /// belongs to a caller that gave up; the newest answer replaces it, and
    /// a subscription that caller allocated is released again.
    async fn reply(&mut self, mut reply: Reply) {
        while let Err(TrySendError::Full(rejected)) = self.session.replies.try_send(reply) {
            if let Ok(stale) = self.session.replies.try_receive() {
                trace!("mqtt: evicting stale reply {}", stale.ticket);
                if let Ok(Some(handle)) = stale.result {
                    self.reclaim(handle).await;
                }
            }
            reply = rejected;
        }
    }

    /// Release a subscription whose handle never reached its caller.
    async fn reclaim(&mut self, handle: SubscriptionHandle) {
        match self.deallocate(handle).await {
            Ok(()) => debug!("mqtt: reclaimed orphaned subscription {:?}", handle),
            Err(_) => trace!("mqtt: orphaned subscription {:?} already gone", handle),
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        trace!("mqtt: event {}", event.name());
        match event {
            TransportEvent::Connected => {
                let (previous, transition) = self.session.transition(SessionState::on_connected);
                self.apply_lifecycle(previous, transition, "connected").await;
            }
            TransportEvent::Disconnected => {
                let (previous, transition) =
                    self.session.transition(SessionState::on_disconnected);
                self.apply_lifecycle(previous, transition, "disconnected").await;
            }
            TransportEvent::Subscribed(id) => debug!("mqtt: subscription acknowledged, msg_id={}", id),
            TransportEvent::Unsubscribed(id) => {
                debug!("mqtt: unsubscription acknowledged, msg_id={}", id)
            }
            TransportEvent::Published(id) => self.on_published(id),
            TransportEvent::Data { topic, payload } => self.dispatch(&topic, &payload),
            TransportEvent::Error => {
                warn!("mqtt: transport reported an error");
                self.release_in_flight("error");
            }
        }
    }

    /// Claim `Connecting` and start the transport with the configuration
    /// that was current at the moment of the claim. `initialize` is refused
    /// while connecting, so the configuration cannot change underneath.
    async fn connect(&mut self) {
        let (previous, config) = match self.session.begin_connect() {
            Ok(claim) => claim,
            Err(state) => {
                match state.connect() {
                    ConnectAction::AlreadyActive => {
                        debug!("mqtt: connect ignored while {:?}", state)
                    }
                    ConnectAction::Refused => warn!("mqtt: connect before initialization"),
                    ConnectAction::Start => warn!("mqtt: connect without configuration"),
                }
                return;
            }
        };

        match self.transport.start(&config).await {
            Ok(()) => info!("mqtt: connecting to {}:{}", config.host.as_str(), config.port),
            Err(_) => {
                error!("mqtt: transport start failed");
                // Only the worker leaves `Connecting`.
                self.session.set_state(previous);
                self.schedule_reconnect();
            }
        }
    }

    /// Apply a transition caused by a connection event and arm the reconnect
    /// timer if it took the session offline.
    async fn apply_lifecycle(
        &mut self,
        previous: SessionState,
        transition: Transition,
        cause: &'static str,
    ) {
        let went_offline =
            transition.next == SessionState::Disconnected && previous != SessionState::Disconnected;
        self.apply(previous, transition, cause).await;
        if went_offline {
            self.schedule_reconnect();
        }
    }

    /// Carry out the side effects of a transition the session has already
    /// committed.
    async fn apply(&mut self, previous: SessionState, transition: Transition, cause: &'static str) {
        if transition.anomaly {
            warn!("mqtt: unexpected {} while {:?}", cause, previous);
        }
        if transition.stop_transport && self.transport.stop().await.is_err() {
            warn!("mqtt: transport stop failed");
        }

        if transition.next == SessionState::Disconnected {
            self.release_in_flight(cause);
        }

        if transition.fan_out {
            match transition.next {
                SessionState::Connected => self.resubscribe_all().await,
                SessionState::Disconnected => self.notify_disconnect(),
                _ => {}
            }
        }
    }

    /// Re-issue every subscription in allocation order and run the connect
    /// callbacks. The broker forgets subscriptions across a disconnect, so
    /// every record is treated the same regardless of its previous flag.
    async fn resubscribe_all(&mut self) {
        info!("mqtt: connected, resubscribing {} records", self.registry.len());
        let handles: Vec<SubscriptionHandle, MAX_SUBSCRIPTIONS> = self.registry.handles().collect();
        for handle in handles {
            let Some(entry) = self.registry.get_mut(handle) else {
                continue;
            };
            match self
                .transport
                .subscribe(entry.record.topic.as_str(), entry.record.qos)
                .await
            {
                Ok(id) => {
                    entry.subscribed = true;
                    debug!(
                        "mqtt: subscribed to {}, msg_id={}",
                        entry.record.topic.as_str(),
                        id
                    );
                }
                Err(_) => {
                    entry.subscribed = false;
                    warn!("mqtt: subscribe to {} failed", entry.record.topic.as_str());
                }
            }
            entry.record.handler.on_connect();
        }
    }

    fn notify_disconnect(&self) {
        info!("mqtt: disconnected, notifying {} records", self.registry.len());
        for entry in self.registry.iter() {
            entry.record.handler.on_disconnect();
        }
    }

    fn dispatch(&self, topic: &Topic, payload: &Payload) {
        let msg = InboundMessage {
            topic: topic.as_str(),
            payload: payload.as_slice(),
        };
        let mut delivered = 0usize;
        for entry in self.registry.matching(msg.topic) {
            entry.record.handler.on_data(&msg);
            delivered += 1;
        }
        if delivered == 0 {
            debug!("mqtt: no subscriber for {}", msg.topic);
        }
    }

    async fn submit(&mut self, mut request: PublishRequest) {
        let acknowledged = request.qos.requires_ack();
        let result = self
            .transport
            .publish(
                request.topic.as_str(),
                request.payload.as_slice(),
                request.qos,
                request.retain,
            )
            .await;

        match result {
            Ok(id) => {
                request.message_id = Some(id);
                debug!(
                    "mqtt: published to {}, msg_id={}",
                    request.topic.as_str(),
                    id
                );
                if acknowledged {
                    self.in_flight = Some(request);
                }
            }
            Err(_) => {
                warn!("mqtt: publish to {} failed", request.topic.as_str());
                if acknowledged {
                    self.session.gate.release();
                }
            }
        }
    }

    fn on_published(&mut self, id: MessageId) {
        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|request| request.message_id == Some(id));
        if matches {
            self.in_flight = None;
            self.session.gate.release();
            debug!("mqtt: publication complete, msg_id={}", id);
        } else {
            warn!("mqtt: unexpected publication, msg_id={}", id);
        }
    }

    fn release_in_flight(&mut self, cause: &'static str) {
        if let Some(request) = self.in_flight.take() {
            self.session.gate.release();
            debug!(
                "mqtt: released publish to {} on {}",
                request.topic.as_str(),
                cause
            );
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(ReconnectPolicy::After(delay)) = self.session.config().map(|c| c.reconnect) {
            self.reconnect_at = Some(Instant::now() + delay);
            info!("mqtt: reconnect scheduled in {} ms", delay.as_millis());
        }
    }

    fn allocate(&mut self, record: SubscriptionRecord<'a>) -> Result<SubscriptionHandle, SessionError> {
        let result = self.registry.allocate(record);
        match &result {
            Ok(handle) => debug!("mqtt: allocated subscription {:?}", handle),
            Err(_) => warn!("mqtt: subscription registry full"),
        }
        self.session.set_subscription_count(self.registry.len());
        result
    }

    async fn deallocate(&mut self, handle: SubscriptionHandle) -> Result<(), SessionError> {
        let Some(entry) = self.registry.get(handle) else {
            return Err(SessionError::UnknownSubscription);
        };
        if entry.subscribed
            && self.session.state().is_connected()
            && self
                .transport
                .unsubscribe(entry.record.topic.as_str())
                .await
                .is_err()
        {
            warn!(
                "mqtt: unsubscribe from {} failed, removing anyway",
                entry.record.topic.as_str()
            );
        }

        let removed = self.registry.deallocate(handle)?;
        debug!("mqtt: deallocated subscription for {}", removed.record.topic.as_str());
        self.session.set_subscription_count(self.registry.len());
        Ok(())
    }

    async fn subscribe(&mut self, handle: SubscriptionHandle) -> Result<(), SessionError> {
        if !self.session.state().is_connected() {
            return Err(SessionError::NotConnected);
        }
        let entry = self
            .registry
            .get_mut(handle)
            .ok_or(SessionError::UnknownSubscription)?;
        self.transport
            .subscribe(entry.record.topic.as_str(), entry.record.qos)
            .await
            .map_err(|_| SessionError::TransportError)?;
        entry.subscribed = true;
        Ok(())
    }

    async fn unsubscribe(&mut self, handle: SubscriptionHandle) -> Result<(), SessionError> {
        let connected = self.session.state().is_connected();
        let entry = self
            .registry
            .get_mut(handle)
            .ok_or(SessionError::UnknownSubscription)?;
        if !entry.subscribed {
            return Ok(());
        }
        if !connected {
            return Err(SessionError::NotConnected);
        }
        self.transport
            .unsubscribe(entry.record.topic.as_str())
            .await
            .map_err(|_| SessionError::TransportError)?;
        entry.subscribed = false;
        Ok(())
    }
}
