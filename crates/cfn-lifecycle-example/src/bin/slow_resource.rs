// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Slow Resource Example - Demonstrates continuations across invocations.
//!
//! This example shows:
//! - A Create handler that starts slow work and returns a continuation
//! - A Poll handler that waits for the work, continuing again before the
//!   function's hard execution limit
//! - The soft deadline (`Timeout` property) bounding the whole chain
//!
//! Deployed as a Lambda function (`AWS_LAMBDA_RUNTIME_API` set) it serves
//! real CloudFormation requests. Anywhere else it runs a local demo that
//! feeds a synthetic Create event through the dispatcher and re-dispatches
//! each continuation in-process.
//!
//! Run with: cargo run -p cfn-lifecycle-example --bin slow_resource

use std::collections::VecDeque;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cfn_lifecycle::{
    CallbackError, CallbackTransport, DispatchOutcome, Dispatcher, HandlerConfig, HandlerError,
    HandlerOutcome, HandlerResult, HandlerTable, InvocationContext, InvokeError, Invoker,
    PartialResponse, RequestEnvelope, SystemClock, handler_fn,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, info_span, warn};

/// Continue once less than this much execution time is left.
const SAFETY_MARGIN: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Simulated provisioning time when `ProvisionSeconds` is not set.
const DEFAULT_PROVISION_SECS: i64 = 20;

/// Execution limit given to each local demo invocation.
const DEMO_INVOCATION_MS: i64 = 3_000;

/// State carried from one invocation to the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Provisioning {
    /// Epoch seconds when provisioning started
    started_at: i64,
    /// Number of continuations so far
    polls: u32,
}

fn resource_name(request: &RequestEnvelope) -> String {
    request
        .resource_properties
        .get("Name")
        .and_then(|v| v.as_str())
        .unwrap_or("slow-resource")
        .to_string()
}

fn provision_seconds(request: &RequestEnvelope) -> i64 {
    match request.resource_properties.get("ProvisionSeconds") {
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or(DEFAULT_PROVISION_SECS),
        None => DEFAULT_PROVISION_SECS,
    }
}

async fn create(request: RequestEnvelope, _context: InvocationContext) -> HandlerResult {
    info!(name = %resource_name(&request), "Starting provisioning");

    HandlerOutcome::continue_with(&Provisioning {
        started_at: Utc::now().timestamp(),
        polls: 0,
    })
}

async fn poll(request: RequestEnvelope, context: InvocationContext) -> HandlerResult {
    let mut progress: Provisioning = request
        .state()
        .transpose()?
        .ok_or_else(|| HandlerError::new("continuation carries no provisioning state"))?;
    let target = provision_seconds(&request);

    loop {
        let elapsed = Utc::now().timestamp() - progress.started_at;
        if elapsed >= target {
            info!(elapsed, polls = progress.polls, "Provisioning finished");
            return Ok(HandlerOutcome::Completed(
                PartialResponse::new()
                    .with_physical_resource_id(resource_name(&request))
                    .with_data("ReadyAt", Utc::now())
                    .with_data("Polls", progress.polls),
            ));
        }

        if let Some(remaining) = context.remaining_time(&SystemClock) {
            if remaining < SAFETY_MARGIN {
                progress.polls += 1;
                info!(elapsed, target, "Still provisioning, continuing in a new invocation");
                return HandlerOutcome::continue_with(&progress);
            }
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn update(request: RequestEnvelope, _context: InvocationContext) -> HandlerResult {
    Ok(HandlerOutcome::Completed(
        PartialResponse::new().with_data("Name", resource_name(&request)),
    ))
}

async fn delete(request: RequestEnvelope, _context: InvocationContext) -> HandlerResult {
    info!(
        physical_resource_id = ?request.physical_resource_id,
        "Nothing to clean up"
    );
    Ok(HandlerOutcome::done())
}

fn handlers() -> HandlerTable {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(create)));
    handlers.poll(Arc::new(handler_fn(poll)));
    handlers.update(Arc::new(handler_fn(update)));
    handlers.delete(Arc::new(handler_fn(delete)));
    handlers
}

// ============================================================================
// Local demo
// ============================================================================

/// Queues continuation payloads instead of invoking Lambda.
#[derive(Default)]
struct QueueInvoker {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl QueueInvoker {
    fn take(&self) -> Option<Vec<u8>> {
        self.queue.lock().ok()?.pop_front()
    }
}

#[async_trait]
impl Invoker for QueueInvoker {
    async fn invoke_async(&self, _function_name: &str, payload: Vec<u8>) -> Result<(), InvokeError> {
        self.queue
            .lock()
            .map_err(|e| InvokeError::Platform(e.to_string()))?
            .push_back(payload);
        Ok(())
    }
}

/// Logs the response instead of sending it.
struct PrintCallback;

#[async_trait]
impl CallbackTransport for PrintCallback {
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), CallbackError> {
        info!(url, body = %String::from_utf8_lossy(&body), "CloudFormation would receive");
        Ok(())
    }
}

async fn run_demo(handlers: HandlerTable) -> Result<(), lambda_runtime::Error> {
    let invoker = Arc::new(QueueInvoker::default());
    let dispatcher = Dispatcher::new(
        handlers,
        HandlerConfig::from_env()?,
        invoker.clone(),
        Arc::new(PrintCallback),
    )
    .with_span(info_span!("demo"));

    let mut payload = json!({
        "RequestType": "Create",
        "ResponseURL": "https://cloudformation-custom-resource-response.example.com/demo",
        "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/demo/0a1b2c3d",
        "RequestId": "demo-request",
        "LogicalResourceId": "SlowResource",
        "ResourceType": "Custom::SlowResource",
        "ResourceProperties": {"Name": "demo-resource", "ProvisionSeconds": 6},
        "Timeout": 60
    });

    for invocation in 1.. {
        let context = InvocationContext::new("slow-resource-demo")
            .with_request_id(format!("demo-invocation-{}", invocation))
            .with_deadline_ms(Utc::now().timestamp_millis() + DEMO_INVOCATION_MS);

        match dispatcher.handle_payload(payload, &context).await? {
            DispatchOutcome::Responded { response, delivery } => {
                info!(
                    invocations = invocation,
                    status = %response.status,
                    ?delivery,
                    "Demo finished"
                );
                break;
            }
            DispatchOutcome::Continued { .. } => {
                let next = invoker.take().ok_or("continuation was not queued")?;
                payload = serde_json::from_slice(&next)?;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    cfn_lifecycle_lambda::init_tracing();

    let handlers = handlers();
    if env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        return cfn_lifecycle_lambda::run(handlers).await;
    }

    warn!("AWS_LAMBDA_RUNTIME_API is not set. Running in demo mode.");
    run_demo(handlers).await
}
