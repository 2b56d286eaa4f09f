// Integration tests for the HTTP control API
//
// Requests go straight into the router with `oneshot`; the session behind it
// runs on fake devices and a fake transport.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use loqa_live::live::{ServerEvent, TransportEvent};
use loqa_live::{create_router, AppState, SessionController};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(devices: &FakeDevices, transport: &FakeTransport) -> Router {
    let session = SessionController::spawn(test_config(), Arc::new(devices.clone()), Arc::new(transport.clone()));
    create_router(AppState::new(session))
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let app = app(&FakeDevices::new(), &FakeTransport::new());

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_start_then_conflict() {
    let app = app(&FakeDevices::new(), &FakeTransport::new());

    let (status, body) = call(&app, "POST", "/session/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");

    let (status, body) = call(&app, "POST", "/session/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_start_failure_reports_user_message() {
    let app = app(&FakeDevices::denied(), &FakeTransport::new());

    let (status, body) = call(&app, "POST", "/session/start").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Could not access microphone or network.");
}

#[tokio::test]
async fn test_session_state_and_messages() {
    let transport = FakeTransport::new();
    let app = app(&FakeDevices::new(), &transport);

    let (_, body) = call(&app, "GET", "/session").await;
    assert_eq!(body["status"], "disconnected");

    call(&app, "POST", "/session/start").await;
    transport.emit(TransportEvent::Server(ServerEvent::input("hi")));
    transport.emit(TransportEvent::Server(ServerEvent::output("hello")));
    transport.emit(TransportEvent::Server(ServerEvent::turn_complete()));

    let (status, body) = call(&app, "GET", "/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connected");
    assert_eq!(body["is_typing"], false);

    let (status, body) = call(&app, "GET", "/session/messages").await;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["sender"], "user");
    assert_eq!(messages[0]["text"], "hi");
    assert_eq!(messages[1]["sender"], "assistant");
}

#[tokio::test]
async fn test_stop_returns_stats() {
    let devices = FakeDevices::new();
    let app = app(&devices, &FakeTransport::new());

    call(&app, "POST", "/session/start").await;
    devices.send_frame(frame(0.2)).await;
    eventually(|| async { call(&app, "GET", "/session/stats").await.1["frames_sent"] == 1 }).await;

    let (status, body) = call(&app, "POST", "/session/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["stats"]["frames_sent"], 1);
    assert_eq!(body["stats"]["frames_captured"], 1);
    assert_eq!(devices.capture_stopped(), 1);
}

#[tokio::test]
async fn test_levels() {
    let app = app(&FakeDevices::new(), &FakeTransport::new());

    let (status, body) = call(&app, "GET", "/session/levels").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input"], 0.0);
    assert_eq!(body["output"], 0.0);
}
