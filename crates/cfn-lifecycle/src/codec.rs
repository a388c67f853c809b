// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Envelope codec: wire serialization, value normalisation and log redaction.
//!
//! Non-primitive values are flattened to strings before they reach the
//! wire: timestamps render as ISO-8601, byte payloads decode as UTF-8 and
//! anything else goes through its `Display` form.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::CodecError;

/// Replacement for redacted values in log lines.
pub const MASK: &str = "*******";

/// A value on its way into a response, normalised for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WireValue(Value);

impl WireValue {
    /// Render any displayable value as a JSON string.
    pub fn display(value: impl fmt::Display) -> Self {
        Self(Value::String(value.to_string()))
    }

    /// Decode a byte payload as (lossy) UTF-8 text.
    pub fn bytes(bytes: &[u8]) -> Self {
        Self(Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// Render a zoned timestamp as RFC 3339.
    pub fn timestamp<Tz>(time: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self(Value::String(
            time.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        ))
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for WireValue {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self(Value::String(value))
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self(Value::Bool(value))
    }
}

macro_rules! wire_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for WireValue {
                fn from(value: $ty) -> Self {
                    Self(json!(value))
                }
            }
        )*
    };
}

wire_number!(i32, i64, u32, u64, usize, f64);

impl From<Vec<u8>> for WireValue {
    fn from(value: Vec<u8>) -> Self {
        Self::bytes(&value)
    }
}

impl From<&[u8]> for WireValue {
    fn from(value: &[u8]) -> Self {
        Self::bytes(value)
    }
}

impl<Tz> From<DateTime<Tz>> for WireValue
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    fn from(value: DateTime<Tz>) -> Self {
        Self::timestamp(&value)
    }
}

impl From<NaiveDateTime> for WireValue {
    fn from(value: NaiveDateTime) -> Self {
        Self(Value::String(
            value.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        ))
    }
}

impl From<NaiveDate> for WireValue {
    fn from(value: NaiveDate) -> Self {
        Self(Value::String(value.format("%Y-%m-%d").to_string()))
    }
}

impl<T: Into<WireValue>> From<Option<T>> for WireValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self(Value::Null))
    }
}

/// Serialize a response exactly as it is transmitted.
pub fn serialize(envelope: &ResponseEnvelope) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Serialize a response for logging, masking `Data` keys in `secure`.
///
/// Never use the result as the transmitted body.
pub fn redact(envelope: &ResponseEnvelope, secure: &BTreeSet<String>) -> Result<Vec<u8>, CodecError> {
    match &envelope.data {
        Some(data) if !secure.is_empty() => {
            let mut sanitized = envelope.clone();
            sanitized.data = Some(mask_keys(data, secure));
            serialize(&sanitized)
        }
        _ => serialize(envelope),
    }
}

/// Last-resort body when a response cannot be serialized.
///
/// Keeps only the identifiers so CloudFormation is never left waiting.
pub fn minimal_failure(envelope: &ResponseEnvelope, reason: &str) -> Vec<u8> {
    json!({
        "StackId": envelope.stack_id,
        "RequestId": envelope.request_id,
        "LogicalResourceId": envelope.logical_resource_id,
        "PhysicalResourceId": envelope.physical_resource_id,
        "Status": "FAILED",
        "Reason": reason,
    })
    .to_string()
    .into_bytes()
}

/// Decode an inbound invocation payload.
pub fn decode_request(payload: &Value) -> Result<RequestEnvelope, CodecError> {
    Ok(RequestEnvelope::deserialize(payload)?)
}

/// Encode a request for an asynchronous re-invocation.
pub fn encode_request(request: &RequestEnvelope) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(request)?)
}

/// Render a request for the debug log with secure properties masked.
pub fn redact_request(request: &RequestEnvelope, secure: &BTreeSet<String>) -> Result<String, CodecError> {
    let mut sanitized = request.clone();
    if !secure.is_empty() {
        sanitized.resource_properties = mask_keys(&request.resource_properties, secure);
        sanitized.old_resource_properties = request
            .old_resource_properties
            .as_ref()
            .map(|old| mask_keys(old, secure));
    }
    Ok(serde_json::to_string(&sanitized)?)
}

fn mask_keys(map: &Map<String, Value>, secure: &BTreeSet<String>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            if secure.contains(key) {
                (key.clone(), Value::String(MASK.to_string()))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
