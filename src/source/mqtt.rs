//! MQTT transport backed by `rumqttc`.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use tracing::debug;

use super::connection::{Inbound, Transport};
use crate::error::TransportError;

/// Default client id prefix; a random 6-digit hex suffix is appended.
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "farm_client";

const REQUEST_CAPACITY: usize = 16;

struct Session {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// A [`Transport`] speaking MQTT 3.1.1 over TCP.
///
/// Each `connect` opens a clean session under a fresh client id.
pub struct MqttTransport {
    host: String,
    port: u16,
    client_id_prefix: String,
    keep_alive: Duration,
    description: String,
    session: Option<Session>,
    pending: VecDeque<Inbound>,
}

impl MqttTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let description = format!("mqtt://{}:{}", host, port);
        Self {
            host,
            port,
            client_id_prefix: DEFAULT_CLIENT_ID_PREFIX.to_string(),
            keep_alive: Duration::from_secs(60),
            description,
            session: None,
            pending: VecDeque::new(),
        }
    }

    pub fn with_client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.client_id_prefix = prefix.into();
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            client_id(&self.client_id_prefix),
            self.host.clone(),
            self.port,
        );
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("broker", &self.description)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.close().await;

        let options = self.options();
        debug!("Connecting as {}", options.client_id());
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(TransportError::Connect(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(TransportError::Connect(e.to_string())),
            }
        }

        self.session = Some(Session { client, eventloop });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::Subscribe("not connected".to_string()));
        };
        session
            .client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let result = loop {
            match session.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    let rejected = ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure));
                    break if rejected {
                        Err(TransportError::Subscribe(format!("broker rejected {}", topic)))
                    } else {
                        Ok(())
                    };
                }
                // A retained message can arrive ahead of the acknowledgement.
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pending.push_back(Inbound {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(_) => {}
                Err(e) => break Err(TransportError::ConnectionLost(e.to_string())),
            }
        };

        if result.is_err() {
            self.session = None;
        }
        result
    }

    async fn next_message(&mut self) -> Result<Inbound, TransportError> {
        if let Some(inbound) = self.pending.pop_front() {
            return Ok(inbound);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::ConnectionLost("not connected".to_string()));
        };

        let result = loop {
            match session.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    break Ok(Inbound {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    break Err(TransportError::ConnectionLost(
                        "broker sent disconnect".to_string(),
                    ));
                }
                Ok(_) => {}
                Err(e) => break Err(TransportError::ConnectionLost(e.to_string())),
            }
        };

        if result.is_err() {
            self.session = None;
        }
        result
    }

    async fn close(&mut self) {
        self.pending.clear();
        if let Some(mut session) = self.session.take() {
            if session.client.disconnect().await.is_ok() {
                // Drive the event loop once so the DISCONNECT is flushed.
                let _ = tokio::time::timeout(Duration::from_millis(250), session.eventloop.poll())
                    .await;
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// `<prefix>_<6 hex digits>`.
fn client_id(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    let salt = nanos ^ std::process::id().rotate_left(12);
    format!("{}_{:06x}", prefix, salt & 0xff_ffff)
}
