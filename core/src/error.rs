//! Error types for the CrossEngage client.
//!
//! # Design
//! Almost nothing in this crate surfaces as an `Err`: transport failures,
//! HTTP error statuses and unreadable bodies are all folded into a
//! `NormalizedResult` so callers branch on data. `ApiError` is reserved for
//! programmer errors detected before a request is sent, and for the local
//! serialization step the client later folds into a `client_error` result.
//! `TransportError` is the contract between a `Transport` and the
//! normalizer: the variant decides which error tag the caller sees.

use thiserror::Error;

/// Errors detected while preparing a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `send_events` needs at least one of email or external user id.
    #[error("email or external user id required for sending events")]
    MissingRecipient,

    /// A user payload lacks the identifier the endpoint URL is keyed on.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a `Transport` while executing a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// DNS, connect, TLS, timeout or socket failure. No response was received.
    #[error("{0}")]
    Connection(String),

    /// Any other failure, e.g. a body that could not be read.
    #[error("{0}")]
    Other(String),
}
