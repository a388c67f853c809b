// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Best-effort stack status enrichment for Update and Delete requests.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::envelope::RequestEnvelope;
use crate::error::StatusError;

/// Placeholder used whenever the status cannot be determined.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Aggregate state of the stack enclosing a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackStatus {
    pub status: String,
    pub reason: String,
}

impl StackStatus {
    pub fn new(status: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_STATUS, UNKNOWN_STATUS)
    }

    /// Build from optional backend fields, defaulting each to `UNKNOWN`.
    pub fn from_parts(status: Option<&str>, reason: Option<&str>) -> Self {
        Self::new(
            status.unwrap_or(UNKNOWN_STATUS),
            reason.unwrap_or(UNKNOWN_STATUS),
        )
    }
}

/// Backend that reports the current status of a stack.
#[async_trait]
pub trait StackStatusSource: Send + Sync {
    /// Look up a stack by id. `Ok(None)` when the stack is not found.
    async fn describe_stack(&self, stack_id: &str) -> Result<Option<StackStatus>, StatusError>;
}

/// Attach the stack status to the request.
///
/// Never fails: any backend error degrades to `UNKNOWN`. Without a source
/// the request is still marked `UNKNOWN` so handlers see a consistent shape.
pub async fn enrich(source: Option<&dyn StackStatusSource>, request: &mut RequestEnvelope) -> StackStatus {
    let status = match source {
        Some(source) => match source.describe_stack(&request.stack_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                debug!(stack_id = %request.stack_id, "Stack not found while looking up status");
                StackStatus::unknown()
            }
            Err(e) => {
                info!(
                    stack_id = %request.stack_id,
                    error = %e,
                    "Exception raised getting stack status - have you granted DescribeStacks permissions?"
                );
                StackStatus::unknown()
            }
        },
        None => StackStatus::unknown(),
    };

    request.stack_status = Some(status.status.clone());
    request.stack_status_reason = Some(status.reason.clone());
    status
}
