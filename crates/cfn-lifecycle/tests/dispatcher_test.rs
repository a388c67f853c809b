// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the request dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfn_lifecycle::{
    CONTINUATION_FAILED_REASON, CallbackError, CallbackTransport, Delivery, DispatchError,
    DispatchOutcome, Dispatcher, FixedClock, HANDLER_FAILED_REASON, HandlerConfig, HandlerError,
    HandlerOutcome, HandlerResult, HandlerTable, InvocationContext, InvokeError, Invoker, MASK,
    PartialResponse, RequestEnvelope, RequestType, ResourceHandler, ResponseStatus, StackStatus,
    StackStatusSource, StatusError, TRANSIENT_FIELDS, handler_fn, physical_resource_id,
};
use serde_json::{Value, json};
use tracing_subscriber::fmt::MakeWriter;

const STACK_ID: &str = "arn:aws:cloudformation:us-east-1:123456789012:stack/demo/0a1b2c3d";
const RESPONSE_URL: &str = "https://cloudformation-custom-resource-response.s3.amazonaws.com/signed";
const FUNCTION_ARN: &str = "arn:aws:lambda:us-east-1:123456789012:function:custom-resource";
const NOW: i64 = 1_700_000_000;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct RecordingInvoker {
    calls: Mutex<Vec<(String, Value)>>,
    fail: bool,
}

impl RecordingInvoker {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn invoke_async(&self, function_name: &str, payload: Vec<u8>) -> Result<(), InvokeError> {
        if self.fail {
            return Err(InvokeError::Platform("throttled".to_string()));
        }
        let payload = serde_json::from_slice(&payload).unwrap();
        self.calls
            .lock()
            .unwrap()
            .push((function_name.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingCallback {
    calls: Mutex<Vec<(String, Value)>>,
    fail: bool,
}

impl RecordingCallback {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    fn only_body(&self) -> Value {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one callback");
        calls[0].1.clone()
    }
}

#[async_trait]
impl CallbackTransport for RecordingCallback {
    async fn put(&self, url: &str, body: Vec<u8>) -> Result<(), CallbackError> {
        let body = serde_json::from_slice(&body).unwrap();
        self.calls.lock().unwrap().push((url.to_string(), body));
        if self.fail {
            return Err(CallbackError::Status {
                status: 403,
                body: "SignatureDoesNotMatch".to_string(),
            });
        }
        Ok(())
    }
}

struct FixedStatus(Option<StackStatus>);

#[async_trait]
impl StackStatusSource for FixedStatus {
    async fn describe_stack(&self, _stack_id: &str) -> Result<Option<StackStatus>, StatusError> {
        Ok(self.0.clone())
    }
}

struct DeniedStatus;

#[async_trait]
impl StackStatusSource for DeniedStatus {
    async fn describe_stack(&self, _stack_id: &str) -> Result<Option<StackStatus>, StatusError> {
        Err(StatusError::Backend("AccessDenied".to_string()))
    }
}

struct Panicking;

#[async_trait]
impl ResourceHandler for Panicking {
    async fn handle(&self, _request: &RequestEnvelope, _context: &InvocationContext) -> HandlerResult {
        panic!("handler blew up");
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    dispatcher: Dispatcher,
    invoker: Arc<RecordingInvoker>,
    callback: Arc<RecordingCallback>,
}

fn harness(handlers: HandlerTable) -> Harness {
    harness_with(handlers, HandlerConfig::default(), RecordingInvoker::default(), RecordingCallback::default())
}

fn harness_with(
    handlers: HandlerTable,
    config: HandlerConfig,
    invoker: RecordingInvoker,
    callback: RecordingCallback,
) -> Harness {
    let invoker = Arc::new(invoker);
    let callback = Arc::new(callback);
    let dispatcher = Dispatcher::new(handlers, config, invoker.clone(), callback.clone())
        .with_clock(Arc::new(FixedClock::at_epoch_secs(NOW)));
    Harness {
        dispatcher,
        invoker,
        callback,
    }
}

fn request(request_type: RequestType) -> RequestEnvelope {
    RequestEnvelope::new(request_type, STACK_ID, "req-1", "MyResource", RESPONSE_URL)
}

fn context() -> InvocationContext {
    InvocationContext::new(FUNCTION_ARN).with_request_id("lambda-req-1")
}

fn counting_handler(calls: Arc<AtomicUsize>) -> impl ResourceHandler {
    handler_fn(move |_request: RequestEnvelope, _context: InvocationContext| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(HandlerOutcome::done())
        }
    })
}

fn expect_response(outcome: &DispatchOutcome) -> &cfn_lifecycle::ResponseEnvelope {
    outcome.response().expect("expected a response")
}

// ============================================================================
// Routing and identifiers
// ============================================================================

#[tokio::test]
async fn test_create_success_generates_physical_id() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(PartialResponse::new().with_data("Name", "bucket-1")))
    })));
    let h = harness(handlers);

    let outcome = h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(
        response.physical_resource_id,
        physical_resource_id(STACK_ID, "MyResource")
    );

    let calls = h.callback.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, RESPONSE_URL);
    let body = &calls[0].1;
    assert_eq!(body["Status"], "SUCCESS");
    assert_eq!(body["StackId"], STACK_ID);
    assert_eq!(body["RequestId"], "req-1");
    assert_eq!(body["LogicalResourceId"], "MyResource");
    assert_eq!(body["Data"], json!({"Name": "bucket-1"}));
}

#[tokio::test]
async fn test_supplied_physical_id_is_kept() {
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(Arc::new(AtomicUsize::new(0)))));
    let h = harness(handlers);

    let outcome = h
        .dispatcher
        .handle(
            request(RequestType::Update).with_physical_resource_id("bucket-1"),
            &context(),
        )
        .await;

    assert_eq!(expect_response(&outcome).physical_resource_id, "bucket-1");
    assert_eq!(h.callback.only_body()["PhysicalResourceId"], "bucket-1");
}

#[tokio::test]
async fn test_handler_can_override_physical_id() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(
            PartialResponse::new().with_physical_resource_id("custom-id"),
        ))
    })));
    let h = harness(handlers);

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    assert_eq!(h.callback.only_body()["PhysicalResourceId"], "custom-id");
}

#[tokio::test]
async fn test_missing_delete_handler_fails_with_request_type() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(counting_handler(Arc::new(AtomicUsize::new(0)))));
    let h = harness(handlers);

    let outcome = h.dispatcher.handle(request(RequestType::Delete), &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.as_deref().unwrap().contains("Delete"));
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_unknown_event_status_fails() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let mut req = request(RequestType::Create);
    req.event_status = Some("Resume".to_string());
    let outcome = h.dispatcher.handle(req, &context()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        expect_response(&outcome).reason.as_deref(),
        Some("No handler defined for request type Create")
    );
}

#[tokio::test]
async fn test_poll_routes_to_poll_handler_with_state() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Err(HandlerError::new("create must not run on a continuation"))
    })));
    handlers.poll(Arc::new(handler_fn(|request: RequestEnvelope, _context: InvocationContext| async move {
        let step = request.event_state.clone().unwrap_or(Value::Null)["step"].clone();
        Ok(HandlerOutcome::Completed(PartialResponse::new().with_data("Step", step)))
    })));
    let h = harness(handlers);

    let mut req = request(RequestType::Create).with_creation_time(NOW - 10);
    req.event_status = Some("Poll".to_string());
    req.event_state = Some(json!({"step": 2}));
    let outcome = h.dispatcher.handle(req, &context()).await;

    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
    assert_eq!(h.callback.only_body()["Data"], json!({"Step": 2}));
}

// ============================================================================
// Soft deadline
// ============================================================================

#[tokio::test]
async fn test_deadline_exceeded_fails_without_running_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let req = request(RequestType::Update)
        .with_creation_time(NOW - 601)
        .with_timeout(600);
    let outcome = h.dispatcher.handle(req, &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(
        response.reason.as_deref(),
        Some("The custom resource operation failed to complete within the user specified timeout of 600 seconds")
    );
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_deadline_not_yet_exceeded_runs_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let req = request(RequestType::Update)
        .with_creation_time(NOW - 599)
        .with_timeout(600);
    let outcome = h.dispatcher.handle(req, &context()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_default_timeout_applies_without_override() {
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(Arc::new(AtomicUsize::new(0)))));
    let h = harness(handlers);

    let outcome = h
        .dispatcher
        .handle(
            request(RequestType::Update).with_creation_time(NOW - 301),
            &context(),
        )
        .await;
    let response = expect_response(&outcome);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.as_deref().unwrap().contains("300 seconds"));

    let outcome = h
        .dispatcher
        .handle(
            request(RequestType::Update)
                .with_creation_time(NOW - 301)
                .with_timeout(900),
            &context(),
        )
        .await;
    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_zero_timeout_falls_back_to_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let req = request(RequestType::Update)
        .with_creation_time(NOW - 301)
        .with_timeout(0);
    let outcome = h.dispatcher.handle(req, &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert!(response.reason.as_deref().unwrap().contains("300 seconds"));
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_zero_default_timeout_disables_deadline() {
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(counting_handler(Arc::new(AtomicUsize::new(0)))));
    let h = harness_with(
        handlers,
        HandlerConfig::new().with_default_timeout_secs(0),
        RecordingInvoker::default(),
        RecordingCallback::default(),
    );

    let outcome = h
        .dispatcher
        .handle(
            request(RequestType::Update).with_creation_time(NOW - 86_400),
            &context(),
        )
        .await;

    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
}

#[tokio::test]
async fn test_creation_time_set_on_first_receipt() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(
            PartialResponse::new().with_data("CreationTime", request.creation_time),
        ))
    })));
    let h = harness(handlers);

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let body = h.callback.only_body();
    assert_eq!(body["Data"]["CreationTime"], NOW);
    assert!(body.get("CreationTime").is_none());
}

// ============================================================================
// Continuations
// ============================================================================

#[tokio::test]
async fn test_continuation_schedules_poll_without_callback() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        HandlerOutcome::continue_with(&json!({"step": 2}))
    })));
    let h = harness(handlers);

    let req = request(RequestType::Create)
        .with_creation_time(NOW - 100)
        .with_timeout(3600);
    let outcome = h.dispatcher.handle(req, &context()).await;

    let DispatchOutcome::Continued { next } = outcome else {
        panic!("expected a continuation");
    };
    assert_eq!(next.event_status.as_deref(), Some("Poll"));
    assert!(h.callback.calls().is_empty());

    let calls = h.invoker.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, FUNCTION_ARN);
    let payload = &calls[0].1;
    assert_eq!(payload["EventStatus"], "Poll");
    assert_eq!(payload["EventState"], json!({"step": 2}));
    assert_eq!(payload["CreationTime"], NOW - 100);
    assert_eq!(payload["Timeout"], 3600);
    assert_eq!(payload["RequestType"], "Create");
    assert_eq!(payload["ResponseURL"], RESPONSE_URL);
}

#[tokio::test]
async fn test_continuation_carries_fresh_creation_time() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        HandlerOutcome::continue_with(&json!({"step": 1}))
    })));
    let h = harness(handlers);

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let calls = h.invoker.calls();
    assert_eq!(calls[0].1["CreationTime"], NOW);
}

#[tokio::test]
async fn test_failed_continuation_reports_failure() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        HandlerOutcome::continue_with(&json!({"step": 2}))
    })));
    let h = harness_with(
        handlers,
        HandlerConfig::default(),
        RecordingInvoker::failing(),
        RecordingCallback::default(),
    );

    let outcome = h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.reason.as_deref(), Some(CONTINUATION_FAILED_REASON));
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_continuation_without_function_identity_fails() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        HandlerOutcome::continue_with(&json!({"step": 2}))
    })));
    let h = harness(handlers);

    let outcome = h
        .dispatcher
        .handle(request(RequestType::Create), &InvocationContext::default())
        .await;

    assert_eq!(
        expect_response(&outcome).reason.as_deref(),
        Some(CONTINUATION_FAILED_REASON)
    );
    assert!(h.invoker.calls().is_empty());
}

// ============================================================================
// Handler failures
// ============================================================================

#[tokio::test]
async fn test_handler_error_uses_generic_reason() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Err(HandlerError::new("secret connection string leaked here"))
    })));
    let h = harness(handlers);

    let outcome = h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let response = expect_response(&outcome);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.reason.as_deref(), Some(HANDLER_FAILED_REASON));
    let body = h.callback.only_body().to_string();
    assert!(!body.contains("secret connection string"));
}

#[tokio::test]
async fn test_handler_panic_uses_generic_reason() {
    let mut handlers = HandlerTable::new();
    handlers.delete(Arc::new(Panicking));
    let h = harness(handlers);

    let outcome = h.dispatcher.handle(request(RequestType::Delete), &context()).await;

    assert_eq!(
        expect_response(&outcome).reason.as_deref(),
        Some(HANDLER_FAILED_REASON)
    );
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_handler_reported_failure_is_passed_through() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(PartialResponse::failed("Bucket name taken")))
    })));
    let h = harness(handlers);

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let body = h.callback.only_body();
    assert_eq!(body["Status"], "FAILED");
    assert_eq!(body["Reason"], "Bucket name taken");
}

#[tokio::test]
async fn test_invalid_handler_output_uses_generic_reason() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(PartialResponse::new().with_field("Data", "not-a-map")))
    })));
    let h = harness(handlers);

    let outcome = h.dispatcher.handle(request(RequestType::Create), &context()).await;

    assert_eq!(
        expect_response(&outcome).reason.as_deref(),
        Some(HANDLER_FAILED_REASON)
    );
}

// ============================================================================
// Response shaping
// ============================================================================

#[tokio::test]
async fn test_transient_fields_never_reach_callback() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|request: RequestEnvelope, _context: InvocationContext| async move {
        let echoed = serde_json::to_value(&request).unwrap_or_default();
        let mut partial = PartialResponse::new();
        for field in TRANSIENT_FIELDS {
            partial = partial.with_field(*field, echoed.get(*field).cloned().unwrap_or(json!("x")));
        }
        Ok(HandlerOutcome::Completed(partial.with_field("Custom", "kept")))
    })));
    let h = harness(handlers);

    let mut req = request(RequestType::Create)
        .with_resource_properties(json!({"Name": "a"}).as_object().unwrap().clone())
        .with_timeout(60);
    req.service_token = Some(FUNCTION_ARN.to_string());
    req.resource_type = Some("Custom::Bucket".to_string());
    h.dispatcher.handle(req, &context()).await;

    let body = h.callback.only_body();
    for field in TRANSIENT_FIELDS {
        assert!(body.get(*field).is_none(), "{} leaked into the response", field);
    }
    assert_eq!(body["Custom"], "kept");
}

#[tokio::test]
async fn test_base_response_merged_before_handler_output() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(PartialResponse::new().with_field("Team", "handler")))
    })));
    let config = HandlerConfig::new()
        .with_base_field("NoEcho", true)
        .with_base_field("Team", "base");
    let h = harness_with(
        handlers,
        config,
        RecordingInvoker::default(),
        RecordingCallback::default(),
    );

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let body = h.callback.only_body();
    assert_eq!(body["NoEcho"], true);
    assert_eq!(body["Team"], "handler");
}

#[tokio::test]
async fn test_secure_attributes_redacted_in_logs_only() {
    let buffer = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(buffer.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|_request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(
            PartialResponse::new()
                .with_data("password", "hunter2-secret")
                .with_data("name", "visible-name"),
        ))
    })));
    let h = harness_with(
        handlers,
        HandlerConfig::new().with_secure_attributes(["password"]),
        RecordingInvoker::default(),
        RecordingCallback::default(),
    );

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let body = h.callback.only_body();
    assert_eq!(body["Data"]["password"], "hunter2-secret");

    let logs = buffer.contents();
    assert!(logs.contains("Responding to 'Create' request with"));
    assert!(logs.contains(MASK));
    assert!(logs.contains("visible-name"));
    assert!(!logs.contains("hunter2-secret"));
}

// ============================================================================
// Stack status enrichment
// ============================================================================

fn status_echo_handler() -> impl ResourceHandler {
    handler_fn(|request: RequestEnvelope, _context: InvocationContext| async move {
        Ok(HandlerOutcome::Completed(
            PartialResponse::new()
                .with_data("StackStatus", request.stack_status)
                .with_data("StackStatusReason", request.stack_status_reason),
        ))
    })
}

#[tokio::test]
async fn test_update_enriched_with_stack_status() {
    let mut handlers = HandlerTable::new();
    handlers.update(Arc::new(status_echo_handler()));
    let mut h = harness(handlers);
    h.dispatcher = h.dispatcher.with_status_source(Arc::new(FixedStatus(Some(
        StackStatus::new("UPDATE_IN_PROGRESS", "User Initiated"),
    ))));

    h.dispatcher.handle(request(RequestType::Update), &context()).await;

    let body = h.callback.only_body();
    assert_eq!(body["Data"]["StackStatus"], "UPDATE_IN_PROGRESS");
    assert_eq!(body["Data"]["StackStatusReason"], "User Initiated");
    assert!(body.get("StackStatus").is_none());
}

#[tokio::test]
async fn test_enrichment_failure_still_succeeds() {
    let mut handlers = HandlerTable::new();
    handlers.delete(Arc::new(status_echo_handler()));
    let mut h = harness(handlers);
    h.dispatcher = h.dispatcher.with_status_source(Arc::new(DeniedStatus));

    let outcome = h.dispatcher.handle(request(RequestType::Delete), &context()).await;

    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
    let body = h.callback.only_body();
    assert_eq!(body["Data"]["StackStatus"], "UNKNOWN");
    assert_eq!(body["Data"]["StackStatusReason"], "UNKNOWN");
}

#[tokio::test]
async fn test_create_is_not_enriched() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(status_echo_handler()));
    let mut h = harness(handlers);
    h.dispatcher = h.dispatcher.with_status_source(Arc::new(FixedStatus(Some(
        StackStatus::new("CREATE_IN_PROGRESS", "User Initiated"),
    ))));

    h.dispatcher.handle(request(RequestType::Create), &context()).await;

    assert_eq!(
        h.callback.only_body()["Data"],
        json!({"StackStatus": null, "StackStatusReason": null})
    );
}

// ============================================================================
// Delivery and decoding
// ============================================================================

#[tokio::test]
async fn test_delivery_failure_is_swallowed() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(counting_handler(Arc::new(AtomicUsize::new(0)))));
    let h = harness_with(
        handlers,
        HandlerConfig::default(),
        RecordingInvoker::default(),
        RecordingCallback::failing(),
    );

    let outcome = h.dispatcher.handle(request(RequestType::Create), &context()).await;

    let DispatchOutcome::Responded { response, delivery } = outcome else {
        panic!("expected a response");
    };
    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(delivery, Delivery::Failed);
    assert_eq!(h.callback.calls().len(), 1);
}

#[tokio::test]
async fn test_handle_payload_decodes_wire_request() {
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(handler_fn(|request: RequestEnvelope, _context: InvocationContext| async move {
        let name = request.resource_properties["BucketName"].clone();
        Ok(HandlerOutcome::Completed(PartialResponse::new().with_data("BucketName", name)))
    })));
    let h = harness(handlers);

    let payload = json!({
        "RequestType": "Create",
        "ServiceToken": FUNCTION_ARN,
        "ResponseURL": RESPONSE_URL,
        "StackId": STACK_ID,
        "RequestId": "req-1",
        "LogicalResourceId": "MyBucket",
        "ResourceType": "Custom::Bucket",
        "ResourceProperties": {"ServiceToken": FUNCTION_ARN, "BucketName": "my-bucket"}
    });
    let outcome = h.dispatcher.handle_payload(payload, &context()).await.unwrap();

    assert_eq!(expect_response(&outcome).status, ResponseStatus::Success);
    assert_eq!(h.callback.only_body()["Data"], json!({"BucketName": "my-bucket"}));
}

#[tokio::test]
async fn test_handle_payload_rejects_invalid_request() {
    let h = harness(HandlerTable::new());

    let err = h
        .dispatcher
        .handle_payload(json!({"RequestType": "Create"}), &context())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidPayload(_)));
    assert!(h.callback.calls().is_empty());
}

fn wire_request(overrides: Value) -> Value {
    let mut payload = json!({
        "RequestType": "Create",
        "ServiceToken": FUNCTION_ARN,
        "ResponseURL": RESPONSE_URL,
        "StackId": STACK_ID,
        "RequestId": "req-1",
        "LogicalResourceId": "MyResource",
        "ResourceType": "Custom::Thing",
        "ResourceProperties": {"ServiceToken": FUNCTION_ARN}
    });
    for (key, value) in overrides.as_object().unwrap() {
        payload[key] = value.clone();
    }
    payload
}

async fn assert_malformed_request_fails(overrides: Value) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let outcome = h
        .dispatcher
        .handle_payload(wire_request(overrides), &context())
        .await
        .unwrap();

    let response = expect_response(&outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.reason.as_deref(), Some(HANDLER_FAILED_REASON));

    let callbacks = h.callback.calls();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].0, RESPONSE_URL);
    assert_eq!(callbacks[0].1["Status"], "FAILED");
    assert_eq!(callbacks[0].1["RequestId"], "req-1");
    assert_eq!(callbacks[0].1["StackId"], STACK_ID);
    assert_eq!(callbacks[0].1["LogicalResourceId"], "MyResource");
    assert_eq!(
        callbacks[0].1["PhysicalResourceId"],
        physical_resource_id(STACK_ID, "MyResource").as_str()
    );
}

#[tokio::test]
async fn test_handle_payload_string_timeout_still_answers() {
    assert_malformed_request_fails(json!({"Timeout": "600"})).await;
}

#[tokio::test]
async fn test_handle_payload_negative_timeout_still_answers() {
    assert_malformed_request_fails(json!({"Timeout": -1})).await;
}

#[tokio::test]
async fn test_handle_payload_fractional_creation_time_still_answers() {
    assert_malformed_request_fails(json!({"CreationTime": 1_700_000_000.5})).await;
}

#[tokio::test]
async fn test_handle_payload_malformed_keeps_supplied_physical_id() {
    let h = harness(HandlerTable::new());
    let payload = wire_request(json!({
        "RequestType": "Delete",
        "PhysicalResourceId": "existing-id",
        "Timeout": "600"
    }));

    let outcome = h.dispatcher.handle_payload(payload, &context()).await.unwrap();

    assert_eq!(expect_response(&outcome).physical_resource_id, "existing-id");
    assert_eq!(h.callback.only_body()["PhysicalResourceId"], "existing-id");
}

#[tokio::test]
async fn test_handle_payload_unknown_request_type_reaches_missing_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = HandlerTable::new();
    handlers.create(Arc::new(counting_handler(calls.clone())));
    handlers.update(Arc::new(counting_handler(calls.clone())));
    handlers.delete(Arc::new(counting_handler(calls.clone())));
    let h = harness(handlers);

    let outcome = h
        .dispatcher
        .handle_payload(wire_request(json!({"RequestType": "Foo"})), &context())
        .await
        .unwrap();

    let response = expect_response(&outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.status, ResponseStatus::Failed);
    assert_eq!(response.reason.as_deref(), Some("No handler defined for request type Foo"));

    let callbacks = h.callback.calls();
    assert_eq!(callbacks.len(), 1);
    assert_eq!(callbacks[0].0, RESPONSE_URL);
}
