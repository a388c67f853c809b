// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request dispatcher.
//!
//! Drives one request through its lifecycle:
//!
//! 1. route by `EventStatus`/`RequestType` to a registered handler
//! 2. enrich Update/Delete requests with the stack status (best effort)
//! 3. resolve the physical resource id and the creation time
//! 4. enforce the soft deadline, then run the handler
//! 5. either schedule a continuation (no callback) or strip, serialize and
//!    deliver exactly one response
//!
//! Only a payload without a `ResponseURL` is returned as an error; everything
//! else ends in a callback or a scheduled continuation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::callback::{self, CallbackTransport, Delivery};
use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::config::HandlerConfig;
use crate::context::InvocationContext;
use crate::continuation::{self, CONTINUATION_FAILED_REASON, Invoker};
use crate::deadline::{self, Deadline};
use crate::envelope::{RequestEnvelope, RequestIdentity, ResponseEnvelope};
use crate::error::{CodecError, Result};
use crate::handler::{HandlerOutcome, HandlerTable, MissingHandler, ResourceHandler};
use crate::identity;
use crate::status::{self, StackStatusSource};

/// Reason reported for any unclassified handler failure.
pub const HANDLER_FAILED_REASON: &str = "Exception was raised while handling custom resource";

/// What happened to a request.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A response was produced and a delivery attempted.
    Responded {
        response: ResponseEnvelope,
        delivery: Delivery,
    },
    /// The work was rescheduled; no response this invocation.
    Continued { next: RequestEnvelope },
}

impl DispatchOutcome {
    pub fn response(&self) -> Option<&ResponseEnvelope> {
        match self {
            DispatchOutcome::Responded { response, .. } => Some(response),
            DispatchOutcome::Continued { .. } => None,
        }
    }
}

enum Step {
    Respond,
    Continue(RequestEnvelope),
}

/// Dispatches lifecycle requests to registered handlers.
pub struct Dispatcher {
    handlers: HandlerTable,
    config: HandlerConfig,
    invoker: Arc<dyn Invoker>,
    callback: Arc<dyn CallbackTransport>,
    status_source: Option<Arc<dyn StackStatusSource>>,
    clock: Arc<dyn Clock>,
    span: Span,
}

impl Dispatcher {
    /// Create a dispatcher. The handler table is read-only from here on.
    pub fn new(
        handlers: HandlerTable,
        config: HandlerConfig,
        invoker: Arc<dyn Invoker>,
        callback: Arc<dyn CallbackTransport>,
    ) -> Self {
        Self {
            handlers,
            config,
            invoker,
            callback,
            status_source: None,
            clock: Arc::new(SystemClock),
            span: Span::none(),
        }
    }

    /// Look up stack status for Update/Delete requests from this backend.
    pub fn with_status_source(mut self, source: Arc<dyn StackStatusSource>) -> Self {
        self.status_source = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Parent span for every request this dispatcher processes.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Decode a raw invocation payload and handle it.
    ///
    /// A payload that does not decode is still answered with a `FAILED`
    /// callback when it names a `ResponseURL`. Only payloads without one are
    /// returned as errors.
    pub async fn handle_payload(&self, payload: Value, context: &InvocationContext) -> Result<DispatchOutcome> {
        let error = match codec::decode_request(&payload) {
            Ok(request) => return Ok(self.handle(request, context).await),
            Err(e) => e,
        };

        let Some(identity) = RequestIdentity::from_payload(&payload) else {
            error!(error = %error, "Received an invalid custom resource request");
            return Err(error.into());
        };

        let span = info_span!(
            parent: &self.span,
            "cfn_request",
            request_id = %identity.request_id,
            logical_resource_id = %identity.logical_resource_id,
            operation = %identity.request_type,
        );
        Ok(self.reject(identity, error).instrument(span).await)
    }

    async fn reject(&self, identity: RequestIdentity, error: CodecError) -> DispatchOutcome {
        error!(error = %error, "Failed to decode custom resource request");

        let physical_resource_id = match identity.physical_resource_id {
            Some(id) => id,
            None => identity::physical_resource_id(&identity.stack_id, &identity.logical_resource_id),
        };
        let mut response = ResponseEnvelope::new(
            identity.stack_id,
            identity.request_id,
            identity.logical_resource_id,
            physical_resource_id,
        );
        response.fail(HANDLER_FAILED_REASON);

        self.respond(&identity.request_type, &identity.response_url, response)
            .await
    }

    /// Handle one request. Always ends in a delivery attempt or a scheduled
    /// continuation.
    pub async fn handle(&self, request: RequestEnvelope, context: &InvocationContext) -> DispatchOutcome {
        let span = info_span!(
            parent: &self.span,
            "cfn_request",
            request_id = %request.request_id,
            logical_resource_id = %request.logical_resource_id,
            operation = %request.routing_key(),
        );
        self.process(request, context).instrument(span).await
    }

    async fn process(&self, mut request: RequestEnvelope, context: &InvocationContext) -> DispatchOutcome {
        let handler: Arc<dyn ResourceHandler> = match request.operation().and_then(|kind| self.handlers.get(kind)) {
            Some(handler) => handler,
            None => {
                warn!(routing_key = %request.routing_key(), "No handler registered for request");
                Arc::new(MissingHandler)
            }
        };

        if request.request_type.wants_stack_status() {
            status::enrich(self.status_source.as_deref(), &mut request).await;
        }

        let physical_resource_id = match request.supplied_physical_resource_id() {
            Some(id) => id.to_string(),
            None => identity::physical_resource_id(&request.stack_id, &request.logical_resource_id),
        };
        let mut response = ResponseEnvelope::for_request(&request, physical_resource_id);

        match codec::redact_request(&request, &self.config.secure_attributes) {
            Ok(line) => debug!(event = %line, "Received {} request", request.request_type),
            Err(e) => debug!(error = %e, "Received {} request (unprintable)", request.request_type),
        }

        let now = self.clock.epoch_secs();
        let creation_time = match request.creation_time {
            Some(t) if t != 0 => t,
            _ => now,
        };
        request.creation_time = Some(creation_time);
        let timeout = deadline::effective_timeout(request.timeout, self.config.default_timeout_secs);
        let deadline = Deadline::new(creation_time, timeout);

        let step = if let Err(e) = response.merge(self.config.base_response.clone()) {
            error!(error = %e, "Configured base response is invalid");
            response.fail(HANDLER_FAILED_REASON);
            Step::Respond
        } else if deadline.is_exceeded(now) {
            info!(timeout_secs = timeout, "Function reached maximum timeout of {} seconds", timeout);
            response.fail(deadline.failure_reason());
            Step::Respond
        } else {
            self.run_handler(handler.as_ref(), &request, context, &mut response)
                .await
        };

        if let Step::Continue(next) = step {
            return DispatchOutcome::Continued { next };
        }

        self.respond(request.request_type.as_str(), &request.response_url, response)
            .await
    }

    async fn run_handler(
        &self,
        handler: &dyn ResourceHandler,
        request: &RequestEnvelope,
        context: &InvocationContext,
        response: &mut ResponseEnvelope,
    ) -> Step {
        let result = AssertUnwindSafe(handler.handle(request, context))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(HandlerOutcome::Completed(partial))) => {
                if let Err(e) = response.merge(partial.into_fields()) {
                    error!(error = %e, "Handler returned an invalid response");
                    response.fail(HANDLER_FAILED_REASON);
                }
                Step::Respond
            }
            Ok(Ok(HandlerOutcome::Continue(state))) => {
                info!("Function approaching maximum Lambda execution timeout...");
                info!("Invoking new Lambda function...");
                match continuation::schedule(self.invoker.as_ref(), request, context, state).await {
                    Ok(next) => Step::Continue(next),
                    Err(e) => {
                        error!(error = %e, "{}", CONTINUATION_FAILED_REASON);
                        response.fail(CONTINUATION_FAILED_REASON);
                        Step::Respond
                    }
                }
            }
            Ok(Err(e)) => {
                let source = std::error::Error::source(&e).map(|s| s.to_string());
                error!(error = %e, source = ?source, "Failed to execute resource function");
                response.fail(HANDLER_FAILED_REASON);
                Step::Respond
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(panic = %detail, "Resource function panicked");
                response.fail(HANDLER_FAILED_REASON);
                Step::Respond
            }
        }
    }

    async fn respond(&self, request_type: &str, response_url: &str, mut response: ResponseEnvelope) -> DispatchOutcome {
        response.strip_transient();

        let body = match codec::serialize(&response) {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                response.fail(HANDLER_FAILED_REASON);
                codec::minimal_failure(&response, HANDLER_FAILED_REASON)
            }
        };

        match codec::redact(&response, &self.config.secure_attributes) {
            Ok(line) => info!(
                status = %response.status,
                "Responding to '{}' request with: {}",
                request_type,
                String::from_utf8_lossy(&line)
            ),
            Err(e) => info!(status = %response.status, error = %e, "Responding to '{}' request", request_type),
        }

        let delivery = callback::deliver(self.callback.as_ref(), response_url, body).await;
        DispatchOutcome::Responded { response, delivery }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers)
            .field("config", &self.config)
            .field("status_source", &self.status_source.is_some())
            .finish()
    }
}
