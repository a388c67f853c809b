// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the request lifecycle.
//!
//! Only [`DispatchError`] ever escapes the dispatcher. Every other error is
//! either folded into a `FAILED` response or logged and swallowed.

use thiserror::Error;

/// A failure raised by a user-supplied resource handler.
///
/// The message is logged but never copied into the response sent to
/// CloudFormation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create a handler error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::with_source("serialization error", err)
    }
}

/// Scheduling a continuation invocation failed.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The invocation context carries no function identity to re-invoke.
    #[error("invocation context has no function name")]
    MissingFunction,

    /// The continuation payload could not be encoded.
    #[error("failed to encode continuation payload: {0}")]
    Encode(#[from] CodecError),

    /// The platform rejected or failed the asynchronous invocation.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Looking up the enclosing stack's status failed.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The backend call failed (unreachable, throttled, access denied).
    #[error("status backend error: {0}")]
    Backend(String),
}

/// Delivering the response to the callback URL failed.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The endpoint answered with a non-success status.
    #[error("callback returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The endpoint could not be reached.
    #[error("failed to reach callback endpoint: {0}")]
    Transport(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Envelope encoding or decoding failed.
#[derive(Debug, Error)]
pub enum CodecError {
    /// serde_json failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A response field had the wrong JSON type.
    #[error("invalid value for response field {field}: {message}")]
    InvalidField {
        /// The offending field name
        field: String,
        /// What was wrong with it
        message: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// The inbound payload could not be turned into a request.
///
/// There is no usable `ResponseURL` in this case, so the failure is returned
/// to the host instead of being reported to CloudFormation.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload is not a valid request envelope.
    #[error("invalid request payload: {0}")]
    InvalidPayload(#[from] CodecError),
}

/// Type alias for dispatch results.
pub type Result<T> = std::result::Result<T, DispatchError>;
