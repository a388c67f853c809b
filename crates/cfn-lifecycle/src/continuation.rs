// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Continuation trigger.
//!
//! When a handler returns [`HandlerOutcome::Continue`](crate::HandlerOutcome),
//! the current request is re-sent to the same function as an asynchronous
//! `Poll` invocation carrying the handler's state. The invocation that
//! schedules a continuation sends no callback; whichever invocation ends the
//! chain does.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::codec;
use crate::context::InvocationContext;
use crate::envelope::{POLL_EVENT_STATUS, RequestEnvelope};
use crate::error::InvokeError;

/// Reason reported when a continuation could not be scheduled.
pub const CONTINUATION_FAILED_REASON: &str =
    "Failed to invoke new Lambda function after maximum Lambda execution timeout";

/// Platform capability to invoke a function asynchronously.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Fire-and-forget invocation of `function_name` with `payload`.
    async fn invoke_async(&self, function_name: &str, payload: Vec<u8>) -> Result<(), InvokeError>;
}

/// The request the next invocation in the chain will receive.
///
/// Identical to `request` except for the routing marker and the state.
/// `CreationTime` is carried over untouched.
pub fn continuation_request(request: &RequestEnvelope, state: Value) -> RequestEnvelope {
    let mut next = request.clone();
    next.event_status = Some(POLL_EVENT_STATUS.to_string());
    next.event_state = Some(state);
    next
}

/// Schedule the continuation and return the request that was sent.
#[instrument(skip_all, fields(request_id = %request.request_id, function = %context.function_name))]
pub async fn schedule(
    invoker: &dyn Invoker,
    request: &RequestEnvelope,
    context: &InvocationContext,
    state: Value,
) -> Result<RequestEnvelope, InvokeError> {
    if context.function_name.is_empty() {
        return Err(InvokeError::MissingFunction);
    }

    let next = continuation_request(request, state);
    let payload = codec::encode_request(&next)?;
    invoker.invoke_async(&context.function_name, payload).await?;

    info!("Continuation invocation scheduled");
    Ok(next)
}
