// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stack status lookup through `CloudFormation:DescribeStacks`.

use async_trait::async_trait;
use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use cfn_lifecycle::{StackStatus, StackStatusSource, StatusError};

/// [`StackStatusSource`] backed by the CloudFormation API.
///
/// Needs `cloudformation:DescribeStacks` on the enclosing stack. Without it
/// every lookup fails and requests are enriched with `UNKNOWN`.
#[derive(Debug, Clone)]
pub struct CloudFormationStatus {
    client: Client,
}

impl CloudFormationStatus {
    /// Create a status source from shared AWS configuration.
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
impl StackStatusSource for CloudFormationStatus {
    async fn describe_stack(&self, stack_id: &str) -> Result<Option<StackStatus>, StatusError> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| StatusError::Backend(DisplayErrorContext(&e).to_string()))?;

        Ok(output.stacks().first().map(|stack| {
            StackStatus::from_parts(
                stack.stack_status().map(|status| status.as_str()),
                stack.stack_status_reason(),
            )
        }))
    }
}
