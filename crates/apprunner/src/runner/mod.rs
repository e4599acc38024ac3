//! Application runner.
//!
//! Hosts application instances and exposes the operations of the runtime
//! contract on top of them:
//!
//! ```text
//! page --gRPC--> RuntimeService --> AppRunner --> AppInstance --> ApplicationHandler
//!                       ^                              |
//!                       +------ PageEvents <--- EventHub (per instance)
//! ```
//!
//! - The catalog holds every registered manifest; only launched applications
//!   have an instance.
//! - One instance per application ID.
//! - Stopping an instance closes all its event streams. Its log stays readable
//!   for [`RunnerConfig::log_retention`].
//! - Launches and stops are announced on a lifecycle broadcast, and the list of
//!   running applications is published on a watch channel.

mod handler;
mod instance;
mod app_log;
mod pages;

pub use handler::{ApplicationHandler, Emitter, EventContext, InvocationContext};
pub use instance::AppInstance;
pub use app_log::{ApplicationLog, DEFAULT_LOG_CAPACITY, LogEntry, LogLevel};
pub use pages::{Page, PageRegistry};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use apprunner_protocol::{
    ApplicationEvent, EventTrigger, MethodInvocation, MethodResult, PageRef, ResolvedPage,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast, watch};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::events::{DEFAULT_EVENT_BUFFER, PageEvents};
use crate::manifest::{ApplicationManifest, ManifestHandler};

/// How long the log of a stopped application stays readable.
pub const DEFAULT_LOG_RETENTION: Duration = Duration::from_secs(60 * 60);

const LIFECYCLE_BUFFER: usize = 64;

/// Configuration for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Capacity of each event broadcast channel.
    pub event_buffer: usize,
    /// How long a stopped application's log is kept.
    pub log_retention: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            log_retention: DEFAULT_LOG_RETENTION,
        }
    }
}

/// Identity and initial pages of an application hosted with a custom handler.
#[derive(Debug, Clone)]
pub struct ApplicationDescriptor {
    pub application_id: String,
    pub application_version: Option<DateTime<Utc>>,
    pub pages: Vec<Page>,
}

/// Summary of a running application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunningApplication {
    pub application_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_version: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub pages: Vec<Page>,
}

impl RunningApplication {
    fn of(instance: &AppInstance) -> Self {
        Self {
            application_id: instance.application_id().to_string(),
            application_version: instance.application_version(),
            started_at: instance.started_at(),
            pages: instance.pages().unwrap_or_else(|e| {
                warn!(application_id = %instance.application_id(), "listing pages failed: {e}");
                Vec::new()
            }),
        }
    }
}

/// Launch or stop of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Launched(RunningApplication),
    Stopped(RunningApplication),
}

impl LifecycleEvent {
    pub fn application(&self) -> &RunningApplication {
        match self {
            Self::Launched(app) | Self::Stopped(app) => app,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Launched(_) => "launched",
            Self::Stopped(_) => "stopped",
        }
    }
}

/// Launches applications and manages their lifecycle.
pub struct AppRunner {
    config: RunnerConfig,
    catalog: RwLock<HashMap<String, ApplicationManifest>>,
    instances: RwLock<HashMap<String, Arc<AppInstance>>>,
    recent_logs: DashMap<String, (Instant, Arc<ApplicationLog>)>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    running: watch::Sender<Vec<RunningApplication>>,
}

impl AppRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let (lifecycle, _) = broadcast::channel(LIFECYCLE_BUFFER);
        let (running, _) = watch::channel(Vec::new());
        Self {
            config,
            catalog: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
            recent_logs: DashMap::new(),
            lifecycle,
            running,
        }
    }

    /// Launches and stops, in the order they happen.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe()
    }

    /// The running applications, updated after every launch and stop.
    pub fn watch_running_applications(&self) -> watch::Receiver<Vec<RunningApplication>> {
        self.running.subscribe()
    }

    /// Add (or replace) an application in the catalog.
    pub async fn register(&self, manifest: ApplicationManifest) -> RuntimeResult<()> {
        manifest.validate()?;
        debug!(application_id = %manifest.id, "registered application");
        self.catalog.write().await.insert(manifest.id.clone(), manifest);
        Ok(())
    }

    /// IDs of catalog entries marked for launch at startup.
    pub async fn autostart_applications(&self) -> Vec<String> {
        let catalog = self.catalog.read().await;
        let mut ids: Vec<String> = catalog
            .values()
            .filter(|m| m.autostart && m.allow_launching)
            .map(|m| m.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Launch a catalog application at its manifest version.
    pub async fn launch(&self, application_id: &str) -> RuntimeResult<()> {
        self.launch_from_catalog(application_id, None).await
    }

    /// Launch a catalog application at `version`, overriding the manifest's.
    pub async fn launch_at_version(
        &self,
        application_id: &str,
        version: DateTime<Utc>,
    ) -> RuntimeResult<()> {
        self.launch_from_catalog(application_id, Some(version)).await
    }

    async fn launch_from_catalog(
        &self,
        application_id: &str,
        version: Option<DateTime<Utc>>,
    ) -> RuntimeResult<()> {
        let manifest = self
            .catalog
            .read()
            .await
            .get(application_id)
            .cloned()
            .ok_or_else(|| RuntimeError::ApplicationNotFound(application_id.to_string()))?;

        if !manifest.allow_launching {
            return Err(RuntimeError::ApplicationNotEnabled(application_id.to_string()));
        }

        let mut descriptor = manifest.descriptor();
        if let Some(version) = version {
            descriptor.application_version = Some(version);
        }
        let handler = Arc::new(ManifestHandler::new(&manifest));
        self.launch_with_handler(descriptor, handler).await
    }

    /// Launch an application whose behaviour is provided by Rust code.
    pub async fn launch_with_handler(
        &self,
        descriptor: ApplicationDescriptor,
        handler: Arc<dyn ApplicationHandler>,
    ) -> RuntimeResult<()> {
        if descriptor.application_id.is_empty() {
            return Err(RuntimeError::invalid_argument("application id must not be empty"));
        }

        let mut instances = self.instances.write().await;
        if instances.contains_key(&descriptor.application_id) {
            return Err(RuntimeError::ApplicationAlreadyRunning(
                descriptor.application_id,
            ));
        }

        let instance = AppInstance::new(
            descriptor.application_id.clone(),
            descriptor.application_version,
            handler,
            self.config.event_buffer,
        );
        for page in descriptor.pages {
            instance.publish_page(page)?;
        }

        info!(
            application_id = %descriptor.application_id,
            version = ?descriptor.application_version,
            "application launched"
        );
        let launched = RunningApplication::of(&instance);
        instances.insert(descriptor.application_id, Arc::new(instance));
        // no receivers is fine
        let _ = self.lifecycle.send(LifecycleEvent::Launched(launched));
        self.running.send_replace(snapshot(&instances));
        Ok(())
    }

    /// Stop a running application, closing its event streams.
    pub async fn stop(&self, application_id: &str) -> RuntimeResult<()> {
        let mut instances = self.instances.write().await;
        let instance = instances
            .remove(application_id)
            .ok_or_else(|| RuntimeError::ApplicationNotRunning(application_id.to_string()))?;
        self.retire(&instance);
        self.running.send_replace(snapshot(&instances));
        Ok(())
    }

    /// Stop every running application.
    pub async fn stop_all(&self) {
        let mut instances = self.instances.write().await;
        if instances.is_empty() {
            info!("No running applications to stop");
            return;
        }
        info!("Stopping {} running application(s)...", instances.len());
        for (_, instance) in instances.drain() {
            self.retire(&instance);
        }
        self.running.send_replace(Vec::new());
    }

    /// Stop an instance already removed from the map: keep its log, announce it.
    fn retire(&self, instance: &AppInstance) {
        let stopped = RunningApplication::of(instance);
        instance.stop();
        self.prune_recent_logs();
        self.recent_logs.insert(
            instance.application_id().to_string(),
            (Instant::now(), instance.log()),
        );
        let _ = self.lifecycle.send(LifecycleEvent::Stopped(stopped));
    }

    fn prune_recent_logs(&self) {
        let retention = self.config.log_retention;
        self.recent_logs
            .retain(|_, (stopped_at, _)| stopped_at.elapsed() < retention);
    }

    /// Log of a running or recently stopped application.
    pub async fn application_log(&self, application_id: &str) -> RuntimeResult<Arc<ApplicationLog>> {
        if let Some(instance) = self.instances.read().await.get(application_id) {
            return Ok(instance.log());
        }
        self.prune_recent_logs();
        self.recent_logs
            .get(application_id)
            .map(|entry| entry.value().1.clone())
            .ok_or_else(|| RuntimeError::ApplicationLogNotFound(application_id.to_string()))
    }

    /// Running applications, sorted by ID.
    pub async fn running_applications(&self) -> Vec<RunningApplication> {
        snapshot(&*self.instances.read().await)
    }

    pub async fn is_running(&self, application_id: &str) -> bool {
        self.instances.read().await.contains_key(application_id)
    }

    /// The running instance of an application.
    pub async fn instance(&self, application_id: &str) -> RuntimeResult<Arc<AppInstance>> {
        self.instances
            .read()
            .await
            .get(application_id)
            .cloned()
            .ok_or_else(|| RuntimeError::ApplicationNotRunning(application_id.to_string()))
    }

    // -- contract operations --

    pub async fn resolve_page(&self, page: &PageRef) -> RuntimeResult<ResolvedPage> {
        page.validate()?;
        let instance = self.page_instance(page).await?;
        instance.resolve_page(&page.page_id)
    }

    pub async fn subscribe(&self, page: &PageRef) -> RuntimeResult<PageEvents> {
        page.validate()?;
        let instance = self.page_instance(page).await?;
        instance.subscribe(&page.page_id)
    }

    pub async fn invoke_method(&self, invocation: MethodInvocation) -> RuntimeResult<MethodResult> {
        if invocation.application_id.is_empty() {
            return Err(RuntimeError::invalid_argument("application_id must not be empty"));
        }
        if invocation.method.is_empty() {
            return Err(RuntimeError::invalid_argument("method must not be empty"));
        }
        let instance = self.instance(&invocation.application_id).await?;
        let result = instance
            .invoke(&invocation.method, &invocation.arguments)
            .await?;
        Ok(MethodResult { result })
    }

    /// Deliver a page-originated event to the application's listeners.
    pub async fn trigger_event(&self, trigger: EventTrigger) -> RuntimeResult<()> {
        let page = trigger.page();
        page.validate()?;
        if trigger.name.is_empty() {
            return Err(RuntimeError::invalid_argument("event name must not be empty"));
        }
        let instance = self.page_instance(&page).await?;
        instance
            .handle_event(&page.page_id, &trigger.name, &trigger.arguments, false)
            .await
    }

    // -- server-side emission and page management --

    pub async fn emit_to_page(&self, page: &PageRef, event: ApplicationEvent) -> RuntimeResult<usize> {
        page.validate()?;
        let instance = self.page_instance(page).await?;
        instance.resolve_page(&page.page_id)?;
        Ok(instance.hub().emit_to_page(&page.page_id, event))
    }

    pub async fn emit_to_all(
        &self,
        application_id: &str,
        event: ApplicationEvent,
    ) -> RuntimeResult<usize> {
        let instance = self.instance(application_id).await?;
        Ok(instance.hub().emit_to_all(event))
    }

    pub async fn publish_page(&self, application_id: &str, page: Page) -> RuntimeResult<()> {
        self.instance(application_id).await?.publish_page(page)
    }

    pub async fn unpublish_page(&self, page: &PageRef) -> RuntimeResult<()> {
        self.instance(&page.application_id)
            .await?
            .unpublish_page(&page.page_id)
    }

    /// Number of open streams on a page.
    pub async fn page_subscriber_count(&self, page: &PageRef) -> usize {
        match self.instance(&page.application_id).await {
            Ok(instance) => instance.hub().page_subscriber_count(&page.page_id),
            Err(_) => 0,
        }
    }

    /// Like [`Self::instance`], but an absent application is reported as a missing page.
    async fn page_instance(&self, page: &PageRef) -> RuntimeResult<Arc<AppInstance>> {
        self.instance(&page.application_id)
            .await
            .map_err(|_| RuntimeError::PageNotFound(page.clone()))
    }
}

impl Default for AppRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

fn snapshot(instances: &HashMap<String, Arc<AppInstance>>) -> Vec<RunningApplication> {
    let mut running: Vec<RunningApplication> = instances
        .values()
        .map(|instance| RunningApplication::of(instance))
        .collect();
    running.sort_by(|a, b| a.application_id.cmp(&b.application_id));
    running
}
