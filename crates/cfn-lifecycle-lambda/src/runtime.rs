// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lambda event loop wiring.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use cfn_lifecycle::{
    ConfigError, DispatchOutcome, Dispatcher, HandlerConfig, HandlerTable, HttpCallback,
    InvocationContext,
};
use lambda_runtime::{Context, LambdaEvent, service_fn};
use serde_json::Value;
use tracing::{debug, info_span};
use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::invoker::LambdaInvoker;
use crate::status::CloudFormationStatus;

/// Default timeout of the callback PUT.
pub const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 30_000;

/// Host settings on top of [`HandlerConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaConfig {
    /// Callback PUT timeout in milliseconds; 0 disables it (default: 30000)
    pub callback_timeout_ms: u64,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            callback_timeout_ms: DEFAULT_CALLBACK_TIMEOUT_MS,
        }
    }
}

impl LambdaConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `CFN_CALLBACK_TIMEOUT_MS` - Callback PUT timeout (default: 30000, 0 to disable)
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        let callback_timeout_ms = match env::var("CFN_CALLBACK_TIMEOUT_MS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(
                    "CFN_CALLBACK_TIMEOUT_MS",
                    format!("must be a non-negative integer, got {:?}", raw),
                )
            })?,
            Err(_) => DEFAULT_CALLBACK_TIMEOUT_MS,
        };

        Ok(Self {
            callback_timeout_ms,
        })
    }

    pub fn with_callback_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.callback_timeout_ms = timeout_ms;
        self
    }

    pub fn callback_timeout(&self) -> Option<Duration> {
        (self.callback_timeout_ms > 0).then(|| Duration::from_millis(self.callback_timeout_ms))
    }

    /// Build the callback transport for these settings.
    pub fn callback(&self) -> Result<HttpCallback> {
        Ok(match self.callback_timeout() {
            Some(timeout) => HttpCallback::with_timeout(timeout)?,
            None => HttpCallback::new(),
        })
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG`.
///
/// An already installed global subscriber is kept; events keep flowing to it.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(false)
        .without_time()
        .try_init();
    if let Err(e) = installed {
        debug!(error = %e, "Keeping the existing tracing subscriber");
    }
}

/// Translate the Lambda context into invocation metadata.
///
/// The invoked ARN (with any alias or version qualifier) is the re-invocation
/// target; the bare function name is used when the ARN is missing.
pub fn invocation_context(context: &Context) -> InvocationContext {
    let function_name = if context.invoked_function_arn.is_empty() {
        context.env_config.function_name.clone()
    } else {
        context.invoked_function_arn.clone()
    };

    let mut invocation = InvocationContext::new(function_name);
    if !context.request_id.is_empty() {
        invocation = invocation.with_request_id(context.request_id.clone());
    }
    if let Some(deadline_ms) = i64::try_from(context.deadline).ok().filter(|ms| *ms > 0) {
        invocation = invocation.with_deadline_ms(deadline_ms);
    }
    invocation
}

/// Build a dispatcher wired to the real AWS services.
pub async fn build_dispatcher(handlers: HandlerTable) -> Result<Dispatcher> {
    let config = HandlerConfig::from_env()?;
    let host = LambdaConfig::from_env()?;
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;

    let function = env::var("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default();
    Ok(Dispatcher::new(
        handlers,
        config,
        Arc::new(LambdaInvoker::new(&sdk_config)),
        Arc::new(host.callback()?),
    )
    .with_status_source(Arc::new(CloudFormationStatus::new(&sdk_config)))
    .with_span(info_span!("custom_resource", function = %function)))
}

/// Handle one Lambda event.
///
/// Returns an error only for payloads that are not custom resource requests.
pub async fn serve(
    dispatcher: &Dispatcher,
    event: LambdaEvent<Value>,
) -> std::result::Result<(), lambda_runtime::Error> {
    let (payload, context) = event.into_parts();
    let invocation = invocation_context(&context);

    match dispatcher.handle_payload(payload, &invocation).await? {
        DispatchOutcome::Responded { delivery, .. } => {
            debug!(?delivery, "Request finished");
        }
        DispatchOutcome::Continued { .. } => {
            debug!("Request continues in a new invocation");
        }
    }
    Ok(())
}

/// Run the Lambda event loop with these handlers.
pub async fn run(handlers: HandlerTable) -> std::result::Result<(), lambda_runtime::Error> {
    let dispatcher = Arc::new(build_dispatcher(handlers).await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let dispatcher = dispatcher.clone();
        async move { serve(&dispatcher, event).await }
    }))
    .await
}
