//! Client error types

use std::time::Duration;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while configuring, sending, or decoding an exchange.
///
/// `Config` is the only kind returned synchronously, from target parsing.
/// `Request`, `Client`, and `Timeout` are only ever delivered through the
/// future returned by [`Request::send`](crate::Request::send). `Read` is
/// returned by the strict JSON accessor on [`Response`](crate::Response).
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed connection target string (missing scheme or host).
    #[error("invalid connection target: {0}")]
    Config(String),

    /// Failure while assembling the request, before anything was written
    /// to the transport.
    #[error("failed to assemble request: {0}")]
    Request(String),

    /// Transport-level failure: DNS, connect, TLS handshake, or a
    /// mid-stream socket error.
    #[error("connection error: {0}")]
    Client(String),

    /// No completed response within the configured window.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body was not valid JSON when strict decoding was requested.
    #[error("failed to decode response body: {0}")]
    Read(#[from] serde_json::Error),
}
