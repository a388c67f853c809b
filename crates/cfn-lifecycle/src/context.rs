// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation metadata supplied by the host platform.

use std::time::Duration;

use crate::clock::Clock;

/// Metadata about the current invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationContext {
    /// Identity used to re-invoke this function (name or ARN)
    pub function_name: String,
    /// Platform request id of this invocation
    pub request_id: Option<String>,
    /// Hard execution deadline, in epoch milliseconds
    pub deadline_ms: Option<i64>,
}

impl InvocationContext {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            request_id: None,
            deadline_ms: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Time left before the platform's hard ceiling.
    ///
    /// Handlers use this to decide when to return a continuation. `None` when
    /// the platform supplied no deadline; zero once it has passed.
    pub fn remaining_time(&self, clock: &dyn Clock) -> Option<Duration> {
        let deadline = self.deadline_ms?;
        let remaining = deadline.saturating_sub(clock.now().timestamp_millis());
        Some(Duration::from_millis(u64::try_from(remaining).unwrap_or(0)))
    }
}
