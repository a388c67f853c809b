// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Callback delivery to the request's `ResponseURL`.
//!
//! One PUT, no retries. Delivery failures are logged and swallowed: the
//! invocation is complete either way.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, instrument};

use crate::error::CallbackError;

/// Transport for the response body.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    /// PUT `body` to `url`.
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), CallbackError>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpCallback {
    client: reqwest::Client,
}

impl HttpCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with a request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, CallbackError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CallbackError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackTransport for HttpCallback {
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), CallbackError> {
        // The presigned S3 URL is signed with an empty content type.
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await
            .map_err(|e| CallbackError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallbackError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Result of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
}

/// Deliver the response body. Never returns an error.
#[instrument(skip_all, fields(body_size = body.len()))]
pub async fn deliver(transport: &dyn CallbackTransport, url: &str, body: Vec<u8>) -> Delivery {
    match transport.put(url, body).await {
        Ok(()) => {
            debug!("Request to CloudFormation succeeded");
            Delivery::Delivered
        }
        Err(CallbackError::Status { status, body }) => {
            error!(status, response = %body, "Callback to CloudFormation failed");
            Delivery::Failed
        }
        Err(e) => {
            error!(error = %e, "Failed to reach CloudFormation");
            Delivery::Failed
        }
    }
}
