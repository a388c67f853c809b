// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource handlers and the registration table.
//!
//! A handler either completes with a partial response or asks to be resumed
//! in a fresh invocation by returning [`HandlerOutcome::Continue`] with the
//! state it needs to pick up where it left off.
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfn_lifecycle::{HandlerOutcome, HandlerTable, PartialResponse, handler_fn};
//!
//! let mut handlers = HandlerTable::new();
//! handlers.create(Arc::new(handler_fn(|request, _context| async move {
//!     let name = request.resource_properties["Name"].clone();
//!     Ok(HandlerOutcome::Completed(PartialResponse::new().with_data("Name", name)))
//! })));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::context::InvocationContext;
use crate::envelope::{OperationKind, PartialResponse, RequestEnvelope};
use crate::error::HandlerError;

/// What a handler asks the dispatcher to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Work is finished; merge these fields into the response.
    Completed(PartialResponse),
    /// Reschedule as a `Poll` invocation carrying this state.
    Continue(Value),
}

impl HandlerOutcome {
    /// Complete with no extra fields.
    pub fn done() -> Self {
        HandlerOutcome::Completed(PartialResponse::new())
    }

    /// Continue with a serializable state value.
    pub fn continue_with<T: Serialize>(state: &T) -> Result<Self, HandlerError> {
        Ok(HandlerOutcome::Continue(serde_json::to_value(state)?))
    }
}

/// Result returned by every handler.
pub type HandlerResult = std::result::Result<HandlerOutcome, HandlerError>;

/// User-supplied resource management logic for one operation kind.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(&self, request: &RequestEnvelope, context: &InvocationContext) -> HandlerResult;
}

/// Adapter turning an async closure into a [`ResourceHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async function or closure as a handler.
///
/// The closure receives owned copies of the request and context.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(RequestEnvelope, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> ResourceHandler for FnHandler<F>
where
    F: Fn(RequestEnvelope, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, request: &RequestEnvelope, context: &InvocationContext) -> HandlerResult {
        (self.f)(request.clone(), context.clone()).await
    }
}

/// Handlers keyed by operation kind.
///
/// Populated during setup, then moved into the dispatcher, which only ever
/// reads it.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<OperationKind, Arc<dyn ResourceHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`, replacing any previous one.
    ///
    /// Returns the handler unchanged so the caller keeps its own handle.
    pub fn register<H>(&mut self, kind: OperationKind, handler: Arc<H>) -> Arc<H>
    where
        H: ResourceHandler + 'static,
    {
        let entry: Arc<dyn ResourceHandler> = handler.clone();
        self.handlers.insert(kind, entry);
        handler
    }

    pub fn create<H: ResourceHandler + 'static>(&mut self, handler: Arc<H>) -> Arc<H> {
        self.register(OperationKind::Create, handler)
    }

    pub fn update<H: ResourceHandler + 'static>(&mut self, handler: Arc<H>) -> Arc<H> {
        self.register(OperationKind::Update, handler)
    }

    pub fn delete<H: ResourceHandler + 'static>(&mut self, handler: Arc<H>) -> Arc<H> {
        self.register(OperationKind::Delete, handler)
    }

    pub fn poll<H: ResourceHandler + 'static>(&mut self, handler: Arc<H>) -> Arc<H> {
        self.register(OperationKind::Poll, handler)
    }

    pub fn get(&self, kind: OperationKind) -> Option<Arc<dyn ResourceHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: OperationKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerTable").field("kinds", &kinds).finish()
    }
}

/// Stands in for an unregistered operation kind.
///
/// Runs through the normal pipeline so the request still gets exactly one
/// `FAILED` callback.
pub(crate) struct MissingHandler;

#[async_trait]
impl ResourceHandler for MissingHandler {
    async fn handle(&self, request: &RequestEnvelope, _context: &InvocationContext) -> HandlerResult {
        Ok(HandlerOutcome::Completed(PartialResponse::failed(format!(
            "No handler defined for request type {}",
            request.request_type
        ))))
    }
}
