//! A running application: its pages, event hub and handler.

use std::sync::Arc;

use apprunner_protocol::{PageRef, ResolvedPage};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use super::handler::{ApplicationHandler, Emitter, EventContext, InvocationContext};
use super::app_log::ApplicationLog;
use super::pages::{Page, PageRegistry};
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::{EventHub, PageEvents};

pub struct AppInstance {
    application_id: String,
    application_version: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    pages: PageRegistry,
    hub: Arc<EventHub>,
    log: Arc<ApplicationLog>,
    handler: Arc<dyn ApplicationHandler>,
}

impl AppInstance {
    pub(crate) fn new(
        application_id: String,
        application_version: Option<DateTime<Utc>>,
        handler: Arc<dyn ApplicationHandler>,
        event_buffer: usize,
    ) -> Self {
        let hub = Arc::new(EventHub::new(application_id.clone(), event_buffer));
        let log = Arc::new(ApplicationLog::default());
        match application_version {
            Some(version) => log.runtime(format!(
                "application instance started at version {}",
                version.to_rfc3339()
            )),
            None => log.runtime("application instance started"),
        }
        Self {
            application_id,
            application_version,
            started_at: Utc::now(),
            pages: PageRegistry::new(),
            hub,
            log,
            handler,
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn application_version(&self) -> Option<DateTime<Utc>> {
        self.application_version
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn pages(&self) -> RuntimeResult<Vec<Page>> {
        self.pages.list()
    }

    pub fn emitter(&self) -> Emitter {
        Emitter::new(self.hub.clone())
    }

    pub fn log(&self) -> Arc<ApplicationLog> {
        self.log.clone()
    }

    pub(crate) fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Publish a page. Streams open on a page being replaced are closed.
    pub fn publish_page(&self, page: Page) -> RuntimeResult<()> {
        let page_id = page.id.clone();
        if let Some(previous) = self.pages.publish(page)? {
            debug!(
                application_id = %self.application_id,
                page_id = %previous.id,
                "replacing published page"
            );
            self.hub.close_page(&previous.id);
        }
        self.hub.open_page(&page_id);
        Ok(())
    }

    pub fn unpublish_page(&self, page_id: &str) -> RuntimeResult<()> {
        match self.pages.unpublish(page_id)? {
            Some(_) => {
                self.hub.close_page(page_id);
                Ok(())
            }
            None => Err(RuntimeError::PageNotFound(self.page_ref(page_id))),
        }
    }

    pub fn resolve_page(&self, page_id: &str) -> RuntimeResult<ResolvedPage> {
        let page = self
            .pages
            .resolve(page_id)?
            .ok_or_else(|| RuntimeError::PageNotFound(self.page_ref(page_id)))?;
        Ok(ResolvedPage {
            application_file_name: page.file_name,
            page_title: page.title,
            application_version: self.application_version,
        })
    }

    pub fn subscribe(&self, page_id: &str) -> RuntimeResult<PageEvents> {
        // resolve first so a missing page is NotFound rather than a silent empty stream
        self.resolve_page(page_id)?;
        self.hub
            .subscribe(page_id)
            .ok_or_else(|| RuntimeError::PageNotFound(self.page_ref(page_id)))
    }

    pub async fn invoke(&self, method: &str, args: &[String]) -> RuntimeResult<String> {
        let args = decode_arguments(args)?;
        let ctx = InvocationContext {
            application_id: self.application_id.clone(),
            trusted: false,
            emitter: self.emitter(),
            log: self.log.clone(),
        };
        match self.handler.invoke(&ctx, method, args).await {
            Ok(result) => Ok(result.to_string()),
            Err(e) => {
                self.log.warn(format!("method {method} failed: {e}"));
                Err(e)
            }
        }
    }

    pub async fn handle_event(
        &self,
        page_id: &str,
        event: &str,
        args: &[String],
        trusted: bool,
    ) -> RuntimeResult<()> {
        self.resolve_page(page_id)?;
        let args = decode_arguments(args)?;
        let ctx = EventContext {
            application_id: self.application_id.clone(),
            page_id: page_id.to_string(),
            trusted,
            emitter: self.emitter(),
            log: self.log.clone(),
        };
        self.handler
            .handle_event(&ctx, event, args)
            .await
            .inspect_err(|e| self.log.warn(format!("listener for {event} failed: {e}")))
    }

    /// Close every stream of this instance.
    pub(crate) fn stop(&self) {
        self.hub.close_all();
        self.log.runtime("application instance stopped");
        info!(application_id = %self.application_id, "application instance stopped");
    }

    fn page_ref(&self, page_id: &str) -> PageRef {
        PageRef::new(&self.application_id, page_id)
    }
}

/// Arguments travel as JSON text; each one must parse on its own.
fn decode_arguments(args: &[String]) -> RuntimeResult<Vec<Value>> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            serde_json::from_str(arg).map_err(|e| {
                RuntimeError::invalid_argument(format!("argument {i} is not valid JSON: {e}"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_arguments_preserves_order() {
        let args = vec!["3".to_string(), "\"a\"".to_string(), "[1,2]".to_string()];
        let decoded = decode_arguments(&args).unwrap();
        assert_eq!(
            decoded,
            vec![
                Value::from(3),
                Value::from("a"),
                serde_json::json!([1, 2])
            ]
        );
    }

    #[test]
    fn test_decode_arguments_rejects_bad_json() {
        let args = vec!["1".to_string(), "{oops".to_string()];
        let err = decode_arguments(&args).unwrap_err();
        match err {
            RuntimeError::InvalidArgument(msg) => assert!(msg.starts_with("argument 1")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
