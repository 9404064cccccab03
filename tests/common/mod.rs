#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::sync::Mutex;

use embassy_futures::block_on;
use embassy_futures::select::{Either, select};
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use gateway_mqtt::packet::{InboundMessage, MessageId};
use gateway_mqtt::runtime::SubscriptionHandler;
use gateway_mqtt::{QoS, Session, SessionConfig, SessionWorker, TransportDriver};

pub type TestSession<'a> = Session<'a, CriticalSectionRawMutex>;
pub type TestWorker<'s, 'a, 'r> = SessionWorker<'s, 'a, CriticalSectionRawMutex, MockTransport<'r>, 4>;

/// A transport call as seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Start(String),
    Stop,
    Subscribe(String, QoS),
    Unsubscribe(String),
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        id: MessageId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

/// Shared record of everything the worker asked the transport to do.
#[derive(Default)]
pub struct Recorder {
    calls: RefCell<Vec<Call>>,
    next_id: Cell<MessageId>,
    pub fail_start: Cell<bool>,
    pub fail_subscribe: Cell<bool>,
    pub fail_publish: Cell<bool>,
    /// Makes `start` take this long, keeping the worker busy.
    pub start_delay: Cell<Option<Duration>>,
    /// Makes every `publish` take this long, keeping the worker busy.
    pub publish_delay: Cell<Option<Duration>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Subscribe(topic, _) => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_publish_id(&self) -> Option<MessageId> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            Call::Publish { id, .. } => Some(*id),
            _ => None,
        })
    }

    fn next_id(&self) -> MessageId {
        let id = self.next_id.get().wrapping_add(1);
        self.next_id.set(id);
        id
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

pub struct MockTransport<'r> {
    recorder: &'r Recorder,
}

impl<'r> MockTransport<'r> {
    pub fn new(recorder: &'r Recorder) -> Self {
        Self { recorder }
    }
}

impl TransportDriver for MockTransport<'_> {
    type Error = MockError;

    async fn start(&mut self, config: &SessionConfig) -> Result<(), Self::Error> {
        if let Some(delay) = self.recorder.start_delay.get() {
            Timer::after(delay).await;
        }
        if self.recorder.fail_start.get() {
            return Err(MockError);
        }
        self.recorder.record(Call::Start(config.host.as_str().into()));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), Self::Error> {
        self.recorder.record(Call::Stop);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<MessageId, Self::Error> {
        if self.recorder.fail_subscribe.get() {
            return Err(MockError);
        }
        self.recorder.record(Call::Subscribe(topic.into(), qos));
        Ok(self.recorder.next_id())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<MessageId, Self::Error> {
        self.recorder.record(Call::Unsubscribe(topic.into()));
        Ok(self.recorder.next_id())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<MessageId, Self::Error> {
        if let Some(delay) = self.recorder.publish_delay.get() {
            Timer::after(delay).await;
        }
        if self.recorder.fail_publish.get() {
            return Err(MockError);
        }
        let id = self.recorder.next_id();
        self.recorder.record(Call::Publish {
            topic: topic.into(),
            payload: payload.to_vec(),
            qos,
            retain,
            id,
        });
        Ok(id)
    }
}

/// Log of handler callbacks, shared by several handlers.
#[derive(Default)]
pub struct CallbackLog {
    entries: Mutex<Vec<String>>,
}

impl CallbackLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// A subscription handler that writes `<name>:connect`, `<name>:disconnect`
/// and `<name>:data:<topic>:<payload>` lines into a shared log.
pub struct LoggingHandler<'l> {
    name: &'static str,
    log: &'l CallbackLog,
}

impl<'l> LoggingHandler<'l> {
    pub fn new(name: &'static str, log: &'l CallbackLog) -> Self {
        Self { name, log }
    }
}

impl SubscriptionHandler for LoggingHandler<'_> {
    fn on_connect(&self) {
        self.log.push(format!("{}:connect", self.name));
    }

    fn on_disconnect(&self) {
        self.log.push(format!("{}:disconnect", self.name));
    }

    fn on_data(&self, msg: &InboundMessage<'_>) {
        self.log.push(format!(
            "{}:data:{}:{}",
            self.name,
            msg.topic,
            String::from_utf8_lossy(msg.payload)
        ));
    }
}

pub fn broker_config() -> SessionConfig {
    SessionConfig::new("broker.local", 1883).unwrap()
}

/// Run `scenario` while the worker processes messages in the background.
pub fn drive<F: Future>(worker: &mut TestWorker<'_, '_, '_>, scenario: F) -> F::Output {
    match block_on(select(worker.run(), scenario)) {
        Either::First(never) => never,
        Either::Second(output) => output,
    }
}

/// Give the worker a chance to drain its queues.
pub async fn settle() {
    for _ in 0..8 {
        yield_now().await;
    }
}
