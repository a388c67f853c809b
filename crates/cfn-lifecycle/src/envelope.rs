// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request and response envelopes exchanged with CloudFormation.
//!
//! Field names follow the custom resource wire format (PascalCase,
//! `ResponseURL` spelled as CloudFormation spells it). Unknown top-level
//! request keys are retained so that continuation payloads carry the whole
//! original event forward.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::WireValue;
use crate::error::CodecError;

/// `EventStatus` value marking a resumed continuation.
pub const POLL_EVENT_STATUS: &str = "Poll";

/// Request-only keys that must never appear in a response.
pub const TRANSIENT_FIELDS: &[&str] = &[
    "ResourceProperties",
    "OldResourceProperties",
    "ServiceToken",
    "ResponseURL",
    "RequestType",
    "CreationTime",
    "ResourceType",
    "StackStatus",
    "StackStatusReason",
    "EventStatus",
    "EventState",
    "Timeout",
];

/// Lifecycle event type sent by CloudFormation.
///
/// Unrecognised values are kept verbatim in [`RequestType::Unknown`] so the
/// request can still be answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestType {
    Create,
    Update,
    Delete,
    Unknown(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Unknown(other) => other,
        }
    }

    /// Update and Delete requests are enriched with the stack's status.
    pub fn wants_stack_status(&self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    /// Handler kind for this type; `None` for unknown types.
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            Self::Create => Some(OperationKind::Create),
            Self::Update => Some(OperationKind::Update),
            Self::Delete => Some(OperationKind::Delete),
            Self::Unknown(_) => None,
        }
    }
}

impl From<String> for RequestType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            _ => Self::Unknown(value),
        }
    }
}

impl From<RequestType> for String {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the handler registration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    /// Resume a previously scheduled continuation
    Poll,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::Poll => POLL_EVENT_STATUS,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestEnvelope {
    pub request_type: RequestType,
    /// Routing override; `"Poll"` on continuations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_status: Option<String>,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    /// Absent on the first Create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Map<String, Value>>,
    /// Soft deadline override in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Epoch seconds of first receipt; never overwritten once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    /// Opaque state carried by a continuation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_status_reason: Option<String>,
    /// Any other top-level keys, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestEnvelope {
    /// Create a minimal request, as CloudFormation would send it.
    pub fn new(
        request_type: RequestType,
        stack_id: impl Into<String>,
        request_id: impl Into<String>,
        logical_resource_id: impl Into<String>,
        response_url: impl Into<String>,
    ) -> Self {
        Self {
            request_type,
            event_status: None,
            stack_id: stack_id.into(),
            request_id: request_id.into(),
            logical_resource_id: logical_resource_id.into(),
            physical_resource_id: None,
            response_url: response_url.into(),
            service_token: None,
            resource_type: None,
            resource_properties: Map::new(),
            old_resource_properties: None,
            timeout: None,
            creation_time: None,
            event_state: None,
            stack_status: None,
            stack_status_reason: None,
            extra: Map::new(),
        }
    }

    /// Resolve which registered handler should run.
    ///
    /// A non-empty `EventStatus` takes precedence over `RequestType`. Any
    /// status other than `"Poll"`, and any unknown `RequestType`, has no
    /// handler and yields `None`.
    pub fn operation(&self) -> Option<OperationKind> {
        match self.event_status.as_deref() {
            Some(status) if !status.is_empty() => {
                (status == POLL_EVENT_STATUS).then_some(OperationKind::Poll)
            }
            _ => self.request_type.operation(),
        }
    }

    /// Routing key as it appears on the wire, for logs.
    pub fn routing_key(&self) -> &str {
        match self.event_status.as_deref() {
            Some(status) if !status.is_empty() => status,
            _ => self.request_type.as_str(),
        }
    }

    /// Whether this request resumes an earlier invocation.
    pub fn is_continuation(&self) -> bool {
        self.operation() == Some(OperationKind::Poll)
    }

    /// The physical id supplied by CloudFormation, ignoring empty strings.
    pub fn supplied_physical_resource_id(&self) -> Option<&str> {
        self.physical_resource_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Deserialize the continuation state into a typed value.
    pub fn state<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.event_state
            .as_ref()
            .map(|state| serde_json::from_value(state.clone()))
    }

    pub fn with_physical_resource_id(mut self, id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(id.into());
        self
    }

    pub fn with_resource_properties(mut self, properties: Map<String, Value>) -> Self {
        self.resource_properties = properties;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Some(timeout_secs);
        self
    }

    pub fn with_creation_time(mut self, epoch_secs: i64) -> Self {
        self.creation_time = Some(epoch_secs);
        self
    }
}

/// The fields needed to answer a request, read leniently from raw JSON.
///
/// Used when a payload does not decode as a [`RequestEnvelope`]: as long as
/// it names a `ResponseURL`, CloudFormation can still be told it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub request_type: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: Option<String>,
    pub response_url: String,
}

impl RequestIdentity {
    /// Recover identifiers from a payload. `None` without a usable
    /// `ResponseURL`; other missing fields read as empty.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let text = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let response_url = text("ResponseURL").filter(|url| !url.is_empty())?;
        Some(Self {
            request_type: text("RequestType").unwrap_or_default(),
            stack_id: text("StackId").unwrap_or_default(),
            request_id: text("RequestId").unwrap_or_default(),
            logical_resource_id: text("LogicalResourceId").unwrap_or_default(),
            physical_resource_id: text("PhysicalResourceId").filter(|id| !id.is_empty()),
            response_url,
        })
    }
}

/// Outcome reported to CloudFormation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response body PUT to the request's `ResponseURL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseEnvelope {
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub physical_resource_id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Ask CloudFormation to mask `Data` in stack outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Extra fields merged in from configuration or handlers
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseEnvelope {
    /// A `SUCCESS` response with the given identifiers.
    pub fn new(
        stack_id: impl Into<String>,
        request_id: impl Into<String>,
        logical_resource_id: impl Into<String>,
        physical_resource_id: impl Into<String>,
    ) -> Self {
        Self {
            stack_id: stack_id.into(),
            request_id: request_id.into(),
            logical_resource_id: logical_resource_id.into(),
            physical_resource_id: physical_resource_id.into(),
            status: ResponseStatus::Success,
            reason: None,
            no_echo: None,
            data: None,
            extra: Map::new(),
        }
    }

    /// Base response for a request: ids copied over, status `SUCCESS`.
    pub fn for_request(request: &RequestEnvelope, physical_resource_id: impl Into<String>) -> Self {
        Self::new(
            request.stack_id.clone(),
            request.request_id.clone(),
            request.logical_resource_id.clone(),
            physical_resource_id,
        )
    }

    /// Mark the response failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ResponseStatus::Failed;
        self.reason = Some(reason.into());
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Overlay a partial response. Later values win.
    ///
    /// Canonical keys are type-checked; anything else lands in `extra`. A
    /// `null` clears an optional canonical field.
    pub fn merge(&mut self, fields: Map<String, Value>) -> Result<(), CodecError> {
        for (key, value) in fields {
            match key.as_str() {
                "StackId" => self.stack_id = expect_string(&key, value)?,
                "RequestId" => self.request_id = expect_string(&key, value)?,
                "LogicalResourceId" => self.logical_resource_id = expect_string(&key, value)?,
                "PhysicalResourceId" => self.physical_resource_id = expect_string(&key, value)?,
                "Status" => {
                    self.status = serde_json::from_value(value).map_err(|e| {
                        CodecError::InvalidField {
                            field: key.clone(),
                            message: e.to_string(),
                        }
                    })?
                }
                "Reason" => {
                    self.reason = match value {
                        Value::Null => None,
                        Value::String(reason) => Some(reason),
                        other => Some(other.to_string()),
                    }
                }
                "NoEcho" => {
                    self.no_echo = match value {
                        Value::Null => None,
                        Value::Bool(flag) => Some(flag),
                        other => return Err(invalid(&key, "expected a boolean", &other)),
                    }
                }
                "Data" => {
                    self.data = match value {
                        Value::Null => None,
                        Value::Object(data) => Some(data),
                        other => return Err(invalid(&key, "expected an object", &other)),
                    }
                }
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
        Ok(())
    }

    /// Remove request-only keys that a handler may have echoed back.
    pub fn strip_transient(&mut self) {
        for field in TRANSIENT_FIELDS {
            self.extra.remove(*field);
        }
    }
}

fn expect_string(field: &str, value: Value) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(invalid(field, "expected a string", &other)),
    }
}

fn invalid(field: &str, message: &str, value: &Value) -> CodecError {
    CodecError::InvalidField {
        field: field.to_string(),
        message: format!("{}, got {}", message, value),
    }
}

/// Fields a handler wants merged into the response.
///
/// Handler output wins over the base response on every key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialResponse {
    fields: Map<String, Value>,
}

impl PartialResponse {
    /// An empty partial response; the request succeeds with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// A partial response that fails the request with a reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::new()
            .with_field("Status", ResponseStatus::Failed.as_str())
            .with_field("Reason", reason.into())
    }

    pub fn with_physical_resource_id(self, id: impl Into<String>) -> Self {
        self.with_field("PhysicalResourceId", id.into())
    }

    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        self.with_field("Reason", reason.into())
    }

    pub fn with_no_echo(self, no_echo: bool) -> Self {
        self.with_field("NoEcho", no_echo)
    }

    /// Add one entry to the `Data` map, normalising the value for the wire.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        let entry = self
            .fields
            .entry("Data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(data) = entry {
            data.insert(key.into(), value.into().into_value());
        }
        self
    }

    /// Set an arbitrary top-level response field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<WireValue>) -> Self {
        self.fields.insert(key.into(), value.into().into_value());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for PartialResponse {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}
