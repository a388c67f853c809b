// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! cfn-lifecycle-lambda - AWS Lambda host for cfn-lifecycle handlers.
//!
//! Connects a [`HandlerTable`](cfn_lifecycle::HandlerTable) to the Lambda
//! runtime:
//!
//! - continuations re-invoke the function asynchronously (`InvocationType=Event`)
//! - Update/Delete requests are enriched through `DescribeStacks`
//! - responses are PUT to the presigned `ResponseURL`
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfn_lifecycle::{HandlerOutcome, HandlerTable, handler_fn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lambda_runtime::Error> {
//!     cfn_lifecycle_lambda::init_tracing();
//!
//!     let mut handlers = HandlerTable::new();
//!     handlers.create(Arc::new(handler_fn(|_request, _context| async move {
//!         Ok(HandlerOutcome::done())
//!     })));
//!
//!     cfn_lifecycle_lambda::run(handlers).await
//! }
//! ```
//!
//! # IAM
//!
//! The execution role needs `lambda:InvokeFunction` on the function itself
//! (for continuations) and `cloudformation:DescribeStacks` (for enrichment;
//! optional, requests are enriched with `UNKNOWN` without it).
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `CFN_BASE_RESPONSE` | No | `{}` | JSON object merged into every response |
//! | `CFN_SECURE_ATTRIBUTES` | No | - | Comma-separated `Data` keys masked in logs |
//! | `CFN_DEFAULT_TIMEOUT_SECS` | No | `300` | Soft deadline without a `Timeout` override |
//! | `CFN_CALLBACK_TIMEOUT_MS` | No | `30000` | Callback PUT timeout, 0 to disable |
//! | `RUST_LOG` | No | `info` | Log filter |

mod error;
mod invoker;
mod runtime;
mod status;

pub use error::{HostError, Result};
pub use invoker::LambdaInvoker;
pub use runtime::{
    DEFAULT_CALLBACK_TIMEOUT_MS, LambdaConfig, build_dispatcher, init_tracing, invocation_context,
    run, serve,
};
pub use status::CloudFormationStatus;
