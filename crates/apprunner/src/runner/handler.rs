//! Application-side hooks invoked by the runner.

use std::sync::Arc;

use apprunner_protocol::ApplicationEvent;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::RuntimeResult;
use crate::events::EventHub;

use super::app_log::ApplicationLog;

/// Handle through which application code emits server events.
#[derive(Clone)]
pub struct Emitter {
    hub: Arc<EventHub>,
}

impl Emitter {
    pub(crate) fn new(hub: Arc<EventHub>) -> Self {
        Self { hub }
    }

    /// Emit an event to one page. Arguments are JSON-encoded in order.
    pub fn to_page(&self, page_id: &str, name: &str, args: &[Value]) -> usize {
        self.hub.emit_to_page(page_id, encode_event(name, args))
    }

    /// Emit an event to every page of the application.
    pub fn to_all(&self, name: &str, args: &[Value]) -> usize {
        self.hub.emit_to_all(encode_event(name, args))
    }
}

fn encode_event(name: &str, args: &[Value]) -> ApplicationEvent {
    ApplicationEvent::new(name, args.iter().map(Value::to_string).collect())
}

/// Context of a server method call.
#[derive(Clone)]
pub struct InvocationContext {
    pub application_id: String,
    /// Calls through the contract are never trusted.
    pub trusted: bool,
    pub emitter: Emitter,
    /// The instance log, readable by operators after the application stops.
    pub log: Arc<ApplicationLog>,
}

/// Context of a client-originated event.
#[derive(Clone)]
pub struct EventContext {
    pub application_id: String,
    pub page_id: String,
    pub trusted: bool,
    pub emitter: Emitter,
    pub log: Arc<ApplicationLog>,
}

/// Backend behaviour of a hosted application.
///
/// Arguments arrive already decoded from JSON, in the order the client sent them.
#[async_trait]
pub trait ApplicationHandler: Send + Sync {
    /// Run a server method. Unknown methods must return `RuntimeError::UnknownMethod`.
    async fn invoke(
        &self,
        ctx: &InvocationContext,
        method: &str,
        args: Vec<Value>,
    ) -> RuntimeResult<Value>;

    /// React to an event triggered by a page. Events without a listener are ignored.
    async fn handle_event(
        &self,
        _ctx: &EventContext,
        _event: &str,
        _args: Vec<Value>,
    ) -> RuntimeResult<()> {
        Ok(())
    }
}
