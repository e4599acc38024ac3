//! Event hub for fanning out application events to page subscribers.

use apprunner_protocol::ApplicationEvent;
use dashmap::DashMap;
use log::{debug, trace};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Default capacity of each broadcast channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Broadcast hub owned by one running application.
///
/// The hub keeps one channel per published page. Events for every page are
/// fanned out over the page channels, so a page observes events in the order
/// they were emitted regardless of how they were addressed.
///
/// Every subscription owns its own receiver, so each subscriber sees the
/// same events independently and dropping one never affects another.
pub struct EventHub {
    application_id: String,

    /// Page ID -> channel for events delivered to that page.
    pages: DashMap<String, broadcast::Sender<ApplicationEvent>>,

    /// Cancelled when the application stops.
    shutdown: CancellationToken,

    buffer: usize,
}

impl EventHub {
    pub fn new(application_id: impl Into<String>, buffer: usize) -> Self {
        Self {
            application_id: application_id.into(),
            pages: DashMap::new(),
            shutdown: CancellationToken::new(),
            buffer: buffer.max(1),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Create the channel for a page. No-op if it is already open.
    pub fn open_page(&self, page_id: &str) {
        self.pages.entry(page_id.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.buffer);
            tx
        });
        debug!("Opened event channel for {}/{}", self.application_id, page_id);
    }

    /// Drop the channel for a page, ending every subscription to it.
    pub fn close_page(&self, page_id: &str) -> bool {
        let removed = self.pages.remove(page_id).is_some();
        if removed {
            debug!("Closed event channel for {}/{}", self.application_id, page_id);
        }
        removed
    }

    /// End every subscription of this application.
    pub fn close_all(&self) {
        self.shutdown.cancel();
        self.pages.clear();
        debug!("Closed all event channels for {}", self.application_id);
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Subscribe to the events of one page. `None` if the page has no channel.
    pub fn subscribe(&self, page_id: &str) -> Option<PageEvents> {
        if self.is_closed() {
            return None;
        }
        let page = self.pages.get(page_id)?.subscribe();
        Some(PageEvents {
            page,
            closed: self.shutdown.child_token(),
        })
    }

    /// Send an event to the subscribers of one page.
    ///
    /// Returns the number of receivers the event was delivered to.
    pub fn emit_to_page(&self, page_id: &str, event: ApplicationEvent) -> usize {
        let Some(tx) = self.pages.get(page_id) else {
            trace!(
                "Dropping event {} for unpublished page {}/{}",
                event.name, self.application_id, page_id
            );
            return 0;
        };
        tx.send(event).unwrap_or(0)
    }

    /// Send an event to the subscribers of every page.
    pub fn emit_to_all(&self, event: ApplicationEvent) -> usize {
        self.pages
            .iter()
            .map(|tx| tx.send(event.clone()).unwrap_or(0))
            .sum()
    }

    /// Number of live subscriptions on a page.
    pub fn page_subscriber_count(&self, page_id: &str) -> usize {
        self.pages
            .get(page_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Receiver held by a single page subscription.
pub struct PageEvents {
    page: broadcast::Receiver<ApplicationEvent>,
    closed: CancellationToken,
}

impl PageEvents {
    /// Wait for the next event delivered to this page.
    ///
    /// `RecvError::Lagged` reports skipped events; the subscription stays usable.
    /// `RecvError::Closed` is terminal.
    pub async fn recv(&mut self) -> Result<ApplicationEvent, RecvError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(RecvError::Closed),
            received = self.page.recv() => received,
        }
    }
}
