//! Admin request handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use apprunner_protocol::{ApplicationEvent, PageRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tracing::{info, warn};

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::runner::{LogEntry, Page, RunningApplication};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List running applications.
pub async fn list_applications(State(state): State<AppState>) -> Json<Vec<RunningApplication>> {
    Json(state.runner.running_applications().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct LaunchQuery {
    /// Version to launch instead of the manifest's (RFC 3339).
    #[serde(default)]
    pub version: Option<DateTime<Utc>>,
}

pub async fn launch_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    Query(query): Query<LaunchQuery>,
) -> ApiResult<StatusCode> {
    match query.version {
        Some(version) => {
            state
                .runner
                .launch_at_version(&application_id, version)
                .await?;
            info!(
                "Launched application {} at version {} via admin API",
                application_id,
                version.to_rfc3339()
            );
        }
        None => {
            state.runner.launch(&application_id).await?;
            info!("Launched application {} via admin API", application_id);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_application(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.runner.stop(&application_id).await?;
    info!("Stopped application {} via admin API", application_id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ApplicationLogResponse {
    pub application_id: String,
    /// False when the log belongs to a recently stopped instance.
    pub running: bool,
    pub entries: Vec<LogEntry>,
}

/// Log of a running or recently stopped application.
pub async fn application_log(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> ApiResult<Json<ApplicationLogResponse>> {
    let log = state.runner.application_log(&application_id).await?;
    let running = state.runner.is_running(&application_id).await;
    Ok(Json(ApplicationLogResponse {
        application_id,
        running,
        entries: log.entries(),
    }))
}

/// SSE stream of application launches and stops.
pub async fn lifecycle_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.runner.subscribe_lifecycle()).filter_map(|received| {
        let lifecycle = match received {
            Ok(lifecycle) => lifecycle,
            Err(err) => {
                warn!("Lifecycle stream lagged: {}", err);
                return None;
            }
        };
        let data = match serde_json::to_string(&lifecycle) {
            Ok(data) => data,
            Err(err) => {
                warn!("Failed to serialize lifecycle event: {:?}", err);
                return None;
            }
        };
        Some(Ok(Event::default().event(lifecycle.kind()).data(data)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[derive(Debug, Deserialize)]
pub struct PublishPageRequest {
    pub file: String,
    #[serde(default)]
    pub title: String,
}

pub async fn publish_page(
    State(state): State<AppState>,
    Path((application_id, page_id)): Path<(String, String)>,
    Json(request): Json<PublishPageRequest>,
) -> ApiResult<StatusCode> {
    let page = Page::new(page_id, request.file, request.title);
    state.runner.publish_page(&application_id, page).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unpublish_page(
    State(state): State<AppState>,
    Path((application_id, page_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .runner
        .unpublish_page(&PageRef::new(application_id, page_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server event to emit. Without `page_id` the event goes to every page.
#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    #[serde(default)]
    pub page_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct EmitEventResponse {
    /// Number of open streams the event was handed to.
    pub delivered: usize,
}

pub async fn emit_event(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
    Json(request): Json<EmitEventRequest>,
) -> ApiResult<Json<EmitEventResponse>> {
    if request.name.is_empty() {
        return Err(ApiError::bad_request("event name must not be empty"));
    }

    let arguments = request.arguments.iter().map(Value::to_string).collect();
    let event = ApplicationEvent::new(request.name, arguments);

    let delivered = match request.page_id {
        Some(page_id) => {
            state
                .runner
                .emit_to_page(&PageRef::new(application_id, page_id), event)
                .await?
        }
        None => state.runner.emit_to_all(&application_id, event).await?,
    };

    Ok(Json(EmitEventResponse { delivered }))
}
