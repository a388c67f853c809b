// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! cfn-lifecycle - Request lifecycle adapter for CloudFormation custom resources.
//!
//! Wraps user-supplied Create/Update/Delete handlers with the bookkeeping a
//! custom resource backend needs: routing, stack status enrichment, physical
//! resource id generation, a soft deadline spanning chained invocations,
//! continuation across function timeouts and exactly one callback to
//! CloudFormation per request.
//!
//! # Features
//!
//! - **Routing**: `EventStatus` (`Poll`) takes precedence over `RequestType`
//! - **Stable identifiers**: a physical id is derived from the stack and
//!   logical id when CloudFormation did not supply one
//! - **Continuations**: a handler returns [`HandlerOutcome::Continue`] with
//!   its state and is resumed in a fresh invocation
//! - **Soft deadline**: `CreationTime` + `Timeout` (default 300s) across the
//!   whole chain
//! - **Redacted logging**: `Data` keys marked secure are masked in logs, never
//!   on the wire
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfn_lifecycle::{
//!     Dispatcher, HandlerConfig, HandlerOutcome, HandlerTable, HttpCallback,
//!     PartialResponse, handler_fn,
//! };
//!
//! let mut handlers = HandlerTable::new();
//! handlers.create(Arc::new(handler_fn(|request, _context| async move {
//!     let bucket = create_bucket(&request.resource_properties).await?;
//!     Ok(HandlerOutcome::Completed(
//!         PartialResponse::new()
//!             .with_physical_resource_id(bucket.name.clone())
//!             .with_data("Arn", bucket.arn),
//!     ))
//! })));
//!
//! let dispatcher = Dispatcher::new(
//!     handlers,
//!     HandlerConfig::from_env()?,
//!     Arc::new(my_invoker),
//!     Arc::new(HttpCallback::new()),
//! );
//!
//! let outcome = dispatcher.handle_payload(event, &context).await?;
//! ```
//!
//! # Continuations
//!
//! ```ignore
//! handlers.create(Arc::new(handler_fn(|request, _context| async move {
//!     start_provisioning(&request).await?;
//!     HandlerOutcome::continue_with(&Progress { step: 1 })
//! })));
//!
//! handlers.poll(Arc::new(handler_fn(|request, _context| async move {
//!     let progress: Progress = request.state().transpose()?.unwrap_or_default();
//!     if provisioning_done(&progress).await? {
//!         return Ok(HandlerOutcome::done());
//!     }
//!     HandlerOutcome::continue_with(&progress.next())
//! })));
//! ```
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CFN_BASE_RESPONSE` | No | `{}` | JSON object merged into every response |
//! | `CFN_SECURE_ATTRIBUTES` | No | - | Comma-separated `Data` keys masked in logs |
//! | `CFN_DEFAULT_TIMEOUT_SECS` | No | `300` | Soft deadline without a `Timeout` override |

mod callback;
mod clock;
mod codec;
mod config;
mod context;
mod continuation;
mod deadline;
mod dispatcher;
mod envelope;
mod error;
mod handler;
mod identity;
mod status;

// Main types
pub use dispatcher::{DispatchOutcome, Dispatcher, HANDLER_FAILED_REASON};
pub use error::{
    CallbackError, CodecError, ConfigError, DispatchError, HandlerError, InvokeError, Result,
    StatusError,
};
pub use handler::{FnHandler, HandlerOutcome, HandlerResult, HandlerTable, ResourceHandler, handler_fn};

// Wire format
pub use codec::{MASK, WireValue};
pub use envelope::{
    OperationKind, POLL_EVENT_STATUS, PartialResponse, RequestEnvelope, RequestIdentity,
    RequestType, ResponseEnvelope, ResponseStatus, TRANSIENT_FIELDS,
};

// Collaborators
pub use callback::{CallbackTransport, Delivery, HttpCallback};
pub use clock::{Clock, FixedClock, SystemClock};
pub use continuation::{CONTINUATION_FAILED_REASON, Invoker, continuation_request};
pub use status::{StackStatus, StackStatusSource, UNKNOWN_STATUS};

// Configuration and invocation metadata
pub use config::HandlerConfig;
pub use context::InvocationContext;
pub use deadline::{DEFAULT_TIMEOUT_SECS, Deadline, effective_timeout};
pub use identity::physical_resource_id;

// Lower-level helpers for hosts
pub use codec::{decode_request, encode_request, redact, redact_request, serialize};
