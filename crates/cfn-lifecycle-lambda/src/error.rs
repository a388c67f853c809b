// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the Lambda host.

use cfn_lifecycle::{CallbackError, ConfigError};
use thiserror::Error;

/// Errors raised while setting up the host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Invalid configuration in the environment
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The callback HTTP client could not be built
    #[error("callback client error: {0}")]
    Callback(#[from] CallbackError),
}

/// Type alias for host results.
pub type Result<T> = std::result::Result<T, HostError>;
