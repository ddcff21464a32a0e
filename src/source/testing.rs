//! In-memory transport and bootstrap doubles for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::bootstrap::BootstrapSource;
use super::connection::{Inbound, Transport};
use crate::data::TelemetrySnapshot;
use crate::error::{LoadError, TransportError};

/// A well-formed sensor payload with the given temperature.
pub(crate) fn payload(temperature: f64) -> Vec<u8> {
    serde_json::json!({
        "temperature": temperature,
        "humidity": 50.0,
        "moisture": 40.0,
        "light": 500.0,
    })
    .to_string()
    .into_bytes()
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BrokerStats {
    pub connects: usize,
    pub subscribes: usize,
    pub active_subscriptions: Vec<String>,
    pub closed: bool,
}

enum Scripted {
    Publish { topic: String, payload: Vec<u8> },
    Drop(String),
}

#[derive(Default)]
struct Shared {
    stats: BrokerStats,
    connect_failures: VecDeque<String>,
    subscribe_failures: VecDeque<String>,
    hang_connect: bool,
    queue: VecDeque<Scripted>,
}

/// A fake broker driven from the test body.
///
/// Publishing delivers one copy per matching active subscription, so a
/// duplicated subscription shows up as a duplicated message. Topics with no
/// subscription are delivered once, so client-side filtering is observable.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBroker {
    shared: Arc<Mutex<Shared>>,
    notify: Arc<Notify>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transport(&self) -> ScriptedTransport {
        ScriptedTransport {
            broker: self.clone(),
            pending: VecDeque::new(),
        }
    }

    pub fn publish(&self, topic: &str, payload: Vec<u8>) {
        self.push(Scripted::Publish {
            topic: topic.to_string(),
            payload,
        });
    }

    pub fn drop_connection(&self, reason: &str) {
        self.push(Scripted::Drop(reason.to_string()));
    }

    pub fn fail_next_connects(&self, n: usize, reason: &str) {
        let mut shared = self.shared.lock();
        shared
            .connect_failures
            .extend(std::iter::repeat(reason.to_string()).take(n));
    }

    pub fn fail_next_subscribes(&self, n: usize, reason: &str) {
        let mut shared = self.shared.lock();
        shared
            .subscribe_failures
            .extend(std::iter::repeat(reason.to_string()).take(n));
    }

    pub fn hang_next_connect(&self) {
        self.shared.lock().hang_connect = true;
    }

    pub fn stats(&self) -> BrokerStats {
        self.shared.lock().stats.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().stats.closed
    }

    fn push(&self, item: Scripted) {
        self.shared.lock().queue.push_back(item);
        self.notify.notify_one();
    }
}

pub(crate) struct ScriptedTransport {
    broker: ScriptedBroker,
    pending: VecDeque<Inbound>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        let hang = {
            let mut shared = self.broker.shared.lock();
            shared.stats.connects += 1;
            shared.stats.active_subscriptions.clear();
            shared.stats.closed = false;
            if let Some(reason) = shared.connect_failures.pop_front() {
                return Err(TransportError::Connect(reason));
            }
            std::mem::take(&mut shared.hang_connect)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut shared = self.broker.shared.lock();
        shared.stats.subscribes += 1;
        if let Some(reason) = shared.subscribe_failures.pop_front() {
            return Err(TransportError::Subscribe(reason));
        }
        shared.stats.active_subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Inbound, TransportError> {
        loop {
            if let Some(inbound) = self.pending.pop_front() {
                return Ok(inbound);
            }

            let next = self.broker.shared.lock().queue.pop_front();
            match next {
                Some(Scripted::Publish { topic, payload }) => {
                    let shared = self.broker.shared.lock();
                    let copies = shared
                        .stats
                        .active_subscriptions
                        .iter()
                        .filter(|t| **t == topic)
                        .count()
                        .max(1);
                    for _ in 0..copies {
                        self.pending.push_back(Inbound {
                            topic: topic.clone(),
                            payload: payload.clone(),
                        });
                    }
                }
                Some(Scripted::Drop(reason)) => {
                    self.broker.shared.lock().stats.active_subscriptions.clear();
                    return Err(TransportError::ConnectionLost(reason));
                }
                None => self.broker.notify.notified().await,
            }
        }
    }

    async fn close(&mut self) {
        self.pending.clear();
        let mut shared = self.broker.shared.lock();
        shared.stats.active_subscriptions.clear();
        shared.stats.closed = true;
    }

    fn description(&self) -> &str {
        "scripted broker"
    }
}

/// A bootstrap source that answers only once released by the test.
pub(crate) struct ScriptedBootstrap {
    result: Mutex<Option<Result<TelemetrySnapshot, LoadError>>>,
    release: Arc<Notify>,
}

impl ScriptedBootstrap {
    /// Returns the source and the notifier that lets `load` complete.
    pub fn new(result: Result<TelemetrySnapshot, LoadError>) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let source = Self {
            result: Mutex::new(Some(result)),
            release: release.clone(),
        };
        (source, release)
    }
}

#[async_trait]
impl BootstrapSource for ScriptedBootstrap {
    async fn load(&self) -> Result<TelemetrySnapshot, LoadError> {
        self.release.notified().await;
        self.result
            .lock()
            .take()
            .unwrap_or(Err(LoadError::Http("already loaded".to_string())))
    }

    fn description(&self) -> &str {
        "scripted bootstrap"
    }
}
