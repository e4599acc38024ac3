//! Shared setup for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use apprunner::api::{self, AppState};
use apprunner::manifest::ApplicationManifest;
use apprunner::{AppRunner, RuntimeClient, RuntimeEndpoint, Server, ServerOptions};
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const QUIZ_MANIFEST: &str = r#"
id = "quiz"
version = "2024-01-01T00:00:00Z"

[pages.main]
file = "index.html"
title = "Quiz"

[pages.scoreboard]
file = "scores.html"
title = "Scores"

[methods.ping]
kind = "reply"
value = "pong"

[methods.echo]
kind = "echo"

[methods.announce]
kind = "emit"
event = "announcement"

[listeners.answer]
emit = "answer-received"

[listeners.cheer]
target = "all"
"#;

pub const LOCKED_MANIFEST: &str = r#"
id = "locked"
allow_launching = false

[pages.main]
file = "index.html"
"#;

/// Runner with the quiz application registered and launched.
pub async fn quiz_runner() -> Arc<AppRunner> {
    let runner = Arc::new(AppRunner::default());
    runner
        .register(ApplicationManifest::from_toml(QUIZ_MANIFEST).unwrap())
        .await
        .unwrap();
    runner
        .register(ApplicationManifest::from_toml(LOCKED_MANIFEST).unwrap())
        .await
        .unwrap();
    runner.launch("quiz").await.unwrap();
    runner
}

/// Admin router over a fresh quiz runner.
pub async fn test_app() -> (Router, Arc<AppRunner>) {
    let runner = quiz_runner().await;
    let router = api::create_router(AppState::new(runner.clone()));
    (router, runner)
}

/// A contract server running on an ephemeral port.
pub struct TestServer {
    pub runner: Arc<AppRunner>,
    pub client: RuntimeClient,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start(heartbeat_interval: Duration) -> Self {
        let runner = quiz_runner().await;
        let options = ServerOptions {
            grpc_listen: "127.0.0.1:0".parse().unwrap(),
            heartbeat_interval,
            ..ServerOptions::default()
        };
        let server = Server::bind(runner.clone(), options).await.unwrap();
        let addr = server.grpc_addr().unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.run(shutdown.clone()));

        let client = RuntimeClient::new(RuntimeEndpoint::Tcp(format!("http://{addr}")));
        Self {
            runner,
            client,
            shutdown,
            handle,
        }
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

/// Wait until `check` holds, polling briefly.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
