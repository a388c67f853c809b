// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Dispatcher configuration.

use std::collections::BTreeSet;
use std::env;

use serde_json::{Map, Value};

use crate::deadline::DEFAULT_TIMEOUT_SECS;
use crate::error::ConfigError;

/// Settings shared by every request the dispatcher handles.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerConfig {
    /// Fields merged into every response before the handler's output
    pub base_response: Map<String, Value>,
    /// `Data` keys masked in log lines (default: none)
    pub secure_attributes: BTreeSet<String>,
    /// Soft deadline for requests without a `Timeout` override (default: 300).
    /// Set to 0 to disable the deadline for such requests.
    pub default_timeout_secs: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            base_response: Map::new(),
            secure_attributes: BTreeSet::new(),
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `CFN_BASE_RESPONSE` - JSON object merged into every response
    /// - `CFN_SECURE_ATTRIBUTES` - Comma-separated `Data` keys to mask in logs
    /// - `CFN_DEFAULT_TIMEOUT_SECS` - Default soft deadline (default: 300, 0 to disable)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_response = match env::var("CFN_BASE_RESPONSE") {
            Ok(raw) if !raw.trim().is_empty() => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(ConfigError::Invalid(
                        "CFN_BASE_RESPONSE",
                        "must be a JSON object".to_string(),
                    ));
                }
                Err(e) => return Err(ConfigError::Invalid("CFN_BASE_RESPONSE", e.to_string())),
            },
            _ => Map::new(),
        };

        let secure_attributes = env::var("CFN_SECURE_ATTRIBUTES")
            .map(|raw| parse_list(&raw))
            .unwrap_or_default();

        let default_timeout_secs = match env::var("CFN_DEFAULT_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(
                    "CFN_DEFAULT_TIMEOUT_SECS",
                    format!("must be a non-negative integer, got {:?}", raw),
                )
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_response,
            secure_attributes,
            default_timeout_secs,
        })
    }

    /// Replace the base response.
    pub fn with_base_response(mut self, base: Map<String, Value>) -> Self {
        self.base_response = base;
        self
    }

    /// Add one field to the base response.
    pub fn with_base_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.base_response.insert(key.into(), value.into());
        self
    }

    /// Add `Data` keys to mask in logs.
    pub fn with_secure_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secure_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Set the default soft deadline. 0 disables it.
    pub fn with_default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn is_secure(&self, key: &str) -> bool {
        self.secure_attributes.contains(key)
    }
}

fn parse_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
