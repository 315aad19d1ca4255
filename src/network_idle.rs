//! Network quiescence detection from DevTools network events.

use crate::ScreenshotError;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    ResourceType,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long the network must stay silent before a page counts as settled.
pub const IDLE_WINDOW: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// In-flight request bookkeeping, independent of any browser.
#[derive(Debug)]
pub struct NetworkTracker {
    in_flight: HashSet<String>,
    last_activity: Instant,
    document_status: Option<u16>,
}

impl NetworkTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_activity: now,
            document_status: None,
        }
    }

    pub fn request_started(&mut self, id: &str, now: Instant) {
        self.in_flight.insert(id.to_string());
        self.last_activity = now;
    }

    pub fn request_finished(&mut self, id: &str, now: Instant) {
        if self.in_flight.remove(id) {
            self.last_activity = now;
        }
    }

    /// Last main-frame document response wins, so redirects report the final status.
    pub fn document_response(&mut self, status: u16) {
        self.document_status = Some(status);
    }

    pub fn document_status(&self) -> Option<u16> {
        self.document_status
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self, now: Instant) -> bool {
        self.in_flight.is_empty() && now.duration_since(self.last_activity) >= IDLE_WINDOW
    }
}

/// Feeds a [`NetworkTracker`] from the event streams of one page.
pub struct NetworkIdleWatcher {
    tracker: Arc<Mutex<NetworkTracker>>,
    task: JoinHandle<()>,
}

impl NetworkIdleWatcher {
    /// Start listening. Must be called before navigating so no request is missed.
    pub async fn attach(page: &Page) -> Result<Self, ScreenshotError> {
        let main_frame = page.mainframe().await?;
        let mut started = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut finished = page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = page.event_listener::<EventLoadingFailed>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;

        let tracker = Arc::new(Mutex::new(NetworkTracker::new(Instant::now())));
        let shared = tracker.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = started.next() => {
                        if let Ok(mut t) = shared.lock() {
                            t.request_started(event.request_id.inner(), Instant::now());
                        }
                    }
                    Some(event) = finished.next() => {
                        if let Ok(mut t) = shared.lock() {
                            t.request_finished(event.request_id.inner(), Instant::now());
                        }
                    }
                    Some(event) = failed.next() => {
                        if let Ok(mut t) = shared.lock() {
                            t.request_finished(event.request_id.inner(), Instant::now());
                        }
                    }
                    Some(event) = responses.next() => {
                        let is_main_document = event.r#type == ResourceType::Document
                            && event.frame_id.is_some()
                            && event.frame_id == main_frame;
                        if is_main_document {
                            let status = u16::try_from(event.response.status).unwrap_or(0);
                            debug!(status, url = %event.response.url, "main document response");
                            if let Ok(mut t) = shared.lock() {
                                t.document_response(status);
                            }
                        }
                    }
                    else => break,
                }
            }
        });

        Ok(Self { tracker, task })
    }

    pub fn document_status(&self) -> Option<u16> {
        self.tracker.lock().ok().and_then(|t| t.document_status())
    }

    /// Main document status once its response event has been handled, or
    /// `None` if none arrives within `grace`.
    pub async fn wait_for_document_status(&self, grace: Duration) -> Option<u16> {
        poll_document_status(&self.tracker, grace).await
    }

    /// Wait until the page is idle. Returns `false` when `timeout` elapses first.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            let idle = self.tracker.lock().map(|t| t.is_idle(now)).unwrap_or(true);
            if idle {
                return true;
            }
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

async fn poll_document_status(tracker: &Mutex<NetworkTracker>, grace: Duration) -> Option<u16> {
    let deadline = Instant::now() + grace;
    loop {
        let status = tracker.lock().ok().and_then(|t| t.document_status());
        if status.is_some() || Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

impl Drop for NetworkIdleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
