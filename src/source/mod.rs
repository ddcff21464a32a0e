//! Inbound data paths: the live broker stream and the historical bootstrap.
//!
//! Both paths are trait-based so they can be swapped out in tests:
//!
//! - [`Transport`]: a publish/subscribe session, driven by [`connect`] into a
//!   reconnecting receive loop. [`MqttTransport`] is the production backend.
//! - [`BootstrapSource`]: a one-shot history fetch. [`HttpBootstrap`] reads the
//!   local sensor server's `/data` endpoint.
//!
//! Raw payloads from the stream are turned into readings by [`decode`].

pub mod bootstrap;
pub mod connection;
pub mod decoder;
pub mod mqtt;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{parse_history, BootstrapSource, HttpBootstrap, HttpBootstrapBuilder};
pub use connection::{
    connect, ConnectionHandle, ConnectionOptions, ConnectionState, Inbound, Transport,
};
pub use decoder::{decode, decode_at};
pub use mqtt::MqttTransport;
