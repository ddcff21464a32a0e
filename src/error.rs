//! Error types for the telemetry pipeline.
//!
//! None of these are fatal: transport errors trigger a reconnect, decode
//! errors drop a single message, and load errors leave the history empty.

use thiserror::Error;

/// Errors raised by a publish/subscribe transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The broker could not be reached or refused the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The broker rejected or never acknowledged a subscription.
    #[error("subscription failed: {0}")]
    Subscribe(String),

    /// An established session was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No answer from the broker within the connect timeout.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised while decoding an inbound sensor payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not a JSON object.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A required metric field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A metric field is present but cannot be read as a finite number.
    #[error("field `{field}` is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// Errors raised by the historical bootstrap fetch.
#[derive(Debug, Error)]
pub enum LoadError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned status {0}")]
    Status(u16),

    /// Failed to parse the response body.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Timeout waiting for the response.
    #[error("request timed out")]
    Timeout,

    /// The pipeline was torn down before the fetch finished.
    #[error("bootstrap cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for LoadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LoadError::Timeout
        } else if err.is_decode() {
            LoadError::Parse(err.to_string())
        } else {
            LoadError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Parse(err.to_string())
    }
}
