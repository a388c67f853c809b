// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Soft deadline tracking.
//!
//! The soft deadline is measured from the request's `CreationTime`, which is
//! carried unchanged through every continuation, so it bounds the whole
//! chain rather than a single invocation. It is independent of the host's
//! hard execution ceiling; approaching that ceiling is the handler's to
//! detect and signal with a continuation.

/// Timeout applied when a request carries no override.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Pick the timeout for a request.
///
/// A missing or zero override falls back to `default_secs`.
pub fn effective_timeout(requested: Option<u64>, default_secs: u64) -> u64 {
    match requested {
        Some(secs) if secs > 0 => secs,
        _ => default_secs,
    }
}

/// Soft deadline of one request chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    creation_time: i64,
    timeout_secs: u64,
}

impl Deadline {
    pub fn new(creation_time: i64, timeout_secs: u64) -> Self {
        Self {
            creation_time,
            timeout_secs,
        }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Epoch second after which the chain has expired, if enabled.
    pub fn finish_at(&self) -> Option<i64> {
        if self.timeout_secs == 0 {
            return None;
        }
        let timeout = i64::try_from(self.timeout_secs).unwrap_or(i64::MAX);
        Some(self.creation_time.saturating_add(timeout))
    }

    /// `now > creation_time + timeout`; never true when the timeout is zero.
    pub fn is_exceeded(&self, now: i64) -> bool {
        self.finish_at().is_some_and(|finish| now > finish)
    }

    /// Failure reason reported when the deadline has passed.
    pub fn failure_reason(&self) -> String {
        format!(
            "The custom resource operation failed to complete within the user specified timeout of {} seconds",
            self.timeout_secs
        )
    }
}
