// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Asynchronous self re-invocation through the Lambda API.

use async_trait::async_trait;
use aws_sdk_lambda::Client;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use cfn_lifecycle::{InvokeError, Invoker};
use tracing::{debug, instrument};

/// [`Invoker`] backed by `Lambda:Invoke` with `InvocationType=Event`.
///
/// The function's execution role needs `lambda:InvokeFunction` on itself.
#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: Client,
}

impl LambdaInvoker {
    /// Create an invoker from shared AWS configuration.
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Use an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    async fn invoke_async(&self, function_name: &str, payload: Vec<u8>) -> Result<(), InvokeError> {
        let output = self
            .client
            .invoke()
            .function_name(function_name)
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| InvokeError::Platform(DisplayErrorContext(&e).to_string()))?;

        let status = output.status_code();
        if !(200..300).contains(&status) {
            return Err(InvokeError::Platform(format!(
                "invoke returned status code {}",
                status
            )));
        }

        debug!(status, "Asynchronous invocation accepted");
        Ok(())
    }
}
