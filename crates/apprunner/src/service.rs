//! gRPC implementation of the application runtime contract.

use std::sync::Arc;
use std::time::Duration;

use apprunner_protocol::proto;
use apprunner_protocol::{
    ApplicationRuntime, ApplicationRuntimeServer, EventTrigger, MethodInvocation, PageRef,
    StreamUpdate,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::PageEvents;
use crate::runner::AppRunner;

/// Default interval between heartbeats on an event stream.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Buffered updates per stream before the forwarder waits on the client.
const STREAM_BUFFER: usize = 16;

type UpdateStream = ReceiverStream<Result<proto::ApplicationEventStreamUpdate, Status>>;

/// Serves the contract on top of an [`AppRunner`].
#[derive(Clone)]
pub struct RuntimeService {
    runner: Arc<AppRunner>,
    heartbeat_interval: Duration,
}

impl RuntimeService {
    pub fn new(runner: Arc<AppRunner>) -> Self {
        Self {
            runner,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Set the heartbeat cadence. Clamped to at least one millisecond.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(MIN_HEARTBEAT_INTERVAL);
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn into_server(self) -> ApplicationRuntimeServer<Self> {
        ApplicationRuntimeServer::new(self)
    }
}

#[tonic::async_trait]
impl ApplicationRuntime for RuntimeService {
    async fn resolve_application_page(
        &self,
        request: Request<proto::ResolveApplicationPageRequest>,
    ) -> Result<Response<proto::ResolveApplicationPageResponse>, Status> {
        let page = PageRef::from(request.into_inner());
        let resolved = self.runner.resolve_page(&page).await?;
        Ok(Response::new(resolved.into()))
    }

    type ConsumeApplicationEventsStream = UpdateStream;

    async fn consume_application_events(
        &self,
        request: Request<proto::ConsumeApplicationEventStreamRequest>,
    ) -> Result<Response<Self::ConsumeApplicationEventsStream>, Status> {
        let page = PageRef::from(request.into_inner());
        let events = self.runner.subscribe(&page).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let subscription = Uuid::new_v4();
        debug!(%subscription, page = %page, "event stream opened");
        tokio::spawn(forward_updates(
            subscription,
            page,
            events,
            tx,
            self.heartbeat_interval,
        ));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn application_server_method(
        &self,
        request: Request<proto::ApplicationServerMethodRequest>,
    ) -> Result<Response<proto::ApplicationServerMethodResponse>, Status> {
        let invocation = MethodInvocation::from(request.into_inner());
        let result = self.runner.invoke_method(invocation).await?;
        Ok(Response::new(result.into()))
    }

    async fn trigger_application_event(
        &self,
        request: Request<proto::TriggerApplicationEventRequest>,
    ) -> Result<Response<proto::TriggerApplicationEventResponse>, Status> {
        let trigger = EventTrigger::from(request.into_inner());
        self.runner.trigger_event(trigger).await?;
        Ok(Response::new(proto::TriggerApplicationEventResponse {}))
    }
}

/// Pump heartbeats and page events into one client stream until either side goes away.
async fn forward_updates(
    subscription: Uuid,
    page: PageRef,
    mut events: PageEvents,
    tx: mpsc::Sender<Result<proto::ApplicationEventStreamUpdate, Status>>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let update = tokio::select! {
            _ = tx.closed() => {
                debug!(%subscription, page = %page, "client went away");
                break;
            }
            _ = heartbeat.tick() => StreamUpdate::Heartbeat,
            received = events.recv() => match received {
                Ok(event) => StreamUpdate::Event(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%subscription, page = %page, skipped, "event stream lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => {
                    debug!(%subscription, page = %page, "page closed");
                    break;
                }
            },
        };

        if tx.send(Ok(update.into())).await.is_err() {
            break;
        }
    }

    debug!(%subscription, page = %page, "event stream closed");
}
