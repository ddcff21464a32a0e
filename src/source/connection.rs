//! Connection manager for the live sensor stream.
//!
//! Drives one publish/subscribe session through an explicit state machine:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!      Connecting ──ok──▶ Connected ──▶ Subscribing ──ok──▶ Subscribed
//!        │    ▲                             │                  │
//!     failure │ retry interval           failure          connection lost
//!        ▼    │                             ▼                  ▼
//!      Error(reason) ◀──────────────────────┘             Reconnecting
//! ```
//!
//! Every successful (re)connection is followed by exactly one subscribe.
//! Failures never end the loop; only teardown does.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Lifecycle state of the broker session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Subscribing,
    Subscribed,
    Reconnecting,
    Error(String),
}

impl ConnectionState {
    /// True for every state in which live data is not flowing.
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ConnectionState::Subscribed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("Connecting..."),
            ConnectionState::Connected => f.write_str("Connected"),
            ConnectionState::Subscribing => f.write_str("Subscribing..."),
            ConnectionState::Subscribed => f.write_str("Subscribed"),
            ConnectionState::Reconnecting => f.write_str("Reconnecting..."),
            ConnectionState::Error(reason) => write!(f, "Error: {}", reason),
        }
    }
}

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A publish/subscribe client session.
///
/// `connect` always starts a fresh session, discarding any previous one, so
/// subscriptions never carry over between connections.
#[async_trait]
pub trait Transport: Send {
    /// Open a new session with the broker.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Subscribe the current session to `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait for the next inbound message.
    ///
    /// An error means the session is gone and must be reconnected.
    async fn next_message(&mut self) -> Result<Inbound, TransportError>;

    /// Release the session. Safe to call when not connected.
    async fn close(&mut self);

    /// Returns a human-readable description of the broker.
    fn description(&self) -> &str;
}

/// Timing knobs for the connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Fixed delay between a failure and the next connect attempt.
    pub retry_interval: Duration,
    /// Upper bound for a single connect or subscribe attempt.
    pub connect_timeout: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(4),
        }
    }
}

/// Handle to a running connection loop.
///
/// Dropping the handle requests teardown; [`shutdown`](Self::shutdown)
/// additionally waits for the transport to be released.
#[derive(Debug)]
pub struct ConnectionHandle {
    state: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// A receiver for observing state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the loop, cancel any pending retry and close the session.
    ///
    /// Safe to call from any state and more than once.
    pub async fn shutdown(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the loop has finished.
    pub fn is_stopped(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Start the connection loop on the current tokio runtime.
///
/// Every message on `topic` is handed to `on_payload` in arrival order, from
/// the loop's own task. Messages on other topics are ignored.
pub fn connect<T, F>(
    transport: T,
    topic: impl Into<String>,
    options: ConnectionOptions,
    on_payload: F,
) -> ConnectionHandle
where
    T: Transport + 'static,
    F: FnMut(&[u8]) + Send + 'static,
{
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (stop_tx, stop_rx) = watch::channel(false);
    let topic = topic.into();

    let task = tokio::spawn(run(
        transport, topic, options, state_tx, stop_rx, on_payload,
    ));

    ConnectionHandle {
        state: state_rx,
        stop_tx,
        task: Some(task),
    }
}

async fn run<T, F>(
    mut transport: T,
    topic: String,
    options: ConnectionOptions,
    state_tx: watch::Sender<ConnectionState>,
    mut stop_rx: watch::Receiver<bool>,
    mut on_payload: F,
) where
    T: Transport,
    F: FnMut(&[u8]) + Send,
{
    let broker = transport.description().to_string();

    'session: loop {
        set_state(&state_tx, ConnectionState::Connecting);
        info!("Connecting to {}", broker);

        let connected = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => break 'session,
            result = bounded(options.connect_timeout, transport.connect()) => result,
        };
        if let Err(e) = connected {
            warn!("Connection to {} failed: {}", broker, e);
            set_state(&state_tx, ConnectionState::Error(e.to_string()));
            if !wait_retry(options.retry_interval, &mut stop_rx).await {
                break 'session;
            }
            continue 'session;
        }
        set_state(&state_tx, ConnectionState::Connected);

        set_state(&state_tx, ConnectionState::Subscribing);
        let subscribed = tokio::select! {
            biased;
            _ = stop_requested(&mut stop_rx) => break 'session,
            result = bounded(options.connect_timeout, transport.subscribe(&topic)) => result,
        };
        if let Err(e) = subscribed {
            warn!("Subscription to {} failed: {}", topic, e);
            set_state(&state_tx, ConnectionState::Error(e.to_string()));
            transport.close().await;
            if !wait_retry(options.retry_interval, &mut stop_rx).await {
                break 'session;
            }
            continue 'session;
        }
        info!("Subscribed to topic: {}", topic);
        set_state(&state_tx, ConnectionState::Subscribed);

        let lost = loop {
            let message = tokio::select! {
                biased;
                _ = stop_requested(&mut stop_rx) => break 'session,
                message = transport.next_message() => message,
            };
            match message {
                Ok(inbound) if inbound.topic == topic => on_payload(&inbound.payload),
                Ok(inbound) => debug!("Ignoring message on topic {}", inbound.topic),
                Err(e) => break e,
            }
        };

        warn!("Connection to {} lost: {}", broker, lost);
        set_state(&state_tx, ConnectionState::Reconnecting);
        if !wait_retry(options.retry_interval, &mut stop_rx).await {
            break 'session;
        }
    }

    transport.close().await;
    info!("Closed connection to {}", broker);
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, state: ConnectionState) {
    debug!("Connection state: {}", state);
    state_tx.send_replace(state);
}

/// Resolves once teardown has been requested or the handle is gone.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// Sleep for the retry interval. Returns false if teardown came first.
async fn wait_retry(interval: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = stop_requested(stop_rx) => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

async fn bounded<Fut>(limit: Duration, fut: Fut) -> Result<(), TransportError>
where
    Fut: Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}
