//! Admin API integration tests.

use std::time::Duration;

use apprunner_protocol::{EventTrigger, PageRef};
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use serde_json::{Value, json};
use tower::ServiceExt;

mod common;
use common::test_app;

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().uri(uri).method(method);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(request(Method::GET, "/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_list_applications() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(request(Method::GET, "/applications", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let apps = json.as_array().unwrap();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0]["application_id"], "quiz");
    assert_eq!(apps[0]["pages"].as_array().unwrap().len(), 2);
    assert_eq!(apps[0]["pages"][0]["id"], "main");
}

#[tokio::test]
async fn test_launch_lifecycle() {
    let (app, runner) = test_app().await;

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/applications/quiz/launch", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "CONFLICT");

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/applications/locked/launch", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/applications/unknown/launch", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/applications/quiz/stop", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!runner.is_running("quiz").await);

    let response = app
        .oneshot(request(Method::POST, "/applications/quiz/launch", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(runner.is_running("quiz").await);
}

#[tokio::test]
async fn test_launch_at_version() {
    let (app, runner) = test_app().await;
    runner.stop("quiz").await.unwrap();

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/applications/quiz/launch?version=2023-06-01T12:00:00Z",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let resolved = runner.resolve_page(&PageRef::new("quiz", "main")).await.unwrap();
    assert_eq!(
        resolved.application_version.unwrap().to_rfc3339(),
        "2023-06-01T12:00:00+00:00"
    );

    runner.stop("quiz").await.unwrap();
    let response = app
        .oneshot(request(
            Method::POST,
            "/applications/quiz/launch?version=yesterday",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!runner.is_running("quiz").await);
}

#[tokio::test]
async fn test_application_log_outlives_instance() {
    let (app, runner) = test_app().await;
    runner
        .trigger_event(EventTrigger {
            application_id: "quiz".to_string(),
            page_id: "main".to_string(),
            name: "answer".to_string(),
            arguments: vec!["2".to_string()],
        })
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/applications/quiz/log", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["running"], true);
    assert_eq!(json["entries"][0]["level"], "runtime");
    assert_eq!(
        json["entries"][1]["message"],
        "answer from page main answered with answer-received (0 stream(s))"
    );

    runner.stop("quiz").await.unwrap();
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/applications/quiz/log", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["running"], false);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.last().unwrap()["message"], "application instance stopped");

    let response = app
        .oneshot(request(Method::GET, "/applications/locked/log", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_lifecycle_stream_reports_stop() {
    let (app, runner) = test_app().await;

    let response = app
        .oneshot(request(Method::GET, "/applications/lifecycle", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    runner.stop("quiz").await.unwrap();

    let mut body = response.into_body().into_data_stream();
    let text = tokio::time::timeout(Duration::from_secs(5), async {
        let mut text = String::new();
        while let Some(chunk) = body.next().await {
            text.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if text.contains("\n\n") {
                break;
            }
        }
        text
    })
    .await
    .unwrap();

    assert!(text.contains("event: stopped"), "unexpected frame: {text}");
    assert!(text.contains(r#""type":"stopped""#));
    assert!(text.contains(r#""application_id":"quiz""#));
}

#[tokio::test]
async fn test_publish_and_unpublish_page() {
    let (app, runner) = test_app().await;

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/applications/quiz/pages/lobby",
            Some(json!({ "file": "lobby.html", "title": "Lobby" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let page = PageRef::new("quiz", "lobby");
    let resolved = runner.resolve_page(&page).await.unwrap();
    assert_eq!(resolved.application_file_name, "lobby.html");
    assert_eq!(resolved.page_title, "Lobby");

    let response = app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/applications/quiz/pages/empty",
            Some(json!({ "file": "" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/applications/quiz/pages/lobby", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(runner.resolve_page(&page).await.is_err());

    let response = app
        .oneshot(request(Method::DELETE, "/applications/quiz/pages/lobby", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_emit_event_to_page() {
    let (app, runner) = test_app().await;
    let mut events = runner
        .subscribe(&PageRef::new("quiz", "main"))
        .await
        .unwrap();

    let response = app
        .oneshot(request(
            Method::POST,
            "/applications/quiz/events",
            Some(json!({
                "page_id": "main",
                "name": "question",
                "arguments": ["What is 6 x 7?", 42, {"round": 1}]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["delivered"], 1);

    let event = events.recv().await.unwrap();
    assert_eq!(event.name, "question");
    assert_eq!(
        event.arguments,
        vec!["\"What is 6 x 7?\"", "42", r#"{"round":1}"#]
    );
}

#[tokio::test]
async fn test_emit_event_errors() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/applications/quiz/events",
            Some(json!({ "page_id": "ghost", "name": "x" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/applications/quiz/events",
            Some(json!({ "name": "" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(request(
            Method::POST,
            "/applications/nobody/events",
            Some(json!({ "name": "x" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
