//! Marks posts as seen once they've stayed on screen for a dwell period.
//!
//! A post becoming visible starts a timer; leaving view before it fires
//! cancels it. When the timer fires the post is marked with a silent
//! request. Failures are logged at debug and the post stays unmarked, so
//! the next visibility retries.

#[cfg(test)]
#[path = "seen_test.rs"]
mod seen_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::net::{Request, Route, Transport};

/// How long a post must stay visible before it counts as seen.
pub const DEFAULT_SEEN_DWELL: Duration = Duration::from_millis(1000);

#[derive(Default)]
struct SeenInner {
    marked: HashSet<Uuid>,
    timers: HashMap<Uuid, JoinHandle<()>>,
}

#[derive(Clone)]
pub struct SeenTracker {
    transport: Arc<dyn Transport>,
    friend_token: Option<String>,
    dwell: Duration,
    inner: Arc<Mutex<SeenInner>>,
}

impl SeenTracker {
    /// `friend_token` is attached when viewing as a friend.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, friend_token: Option<String>) -> Self {
        Self { transport, friend_token, dwell: DEFAULT_SEEN_DWELL, inner: Arc::default() }
    }

    #[must_use]
    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SeenInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_marked(&self, post_id: Uuid) -> bool {
        self.lock().marked.contains(&post_id)
    }

    /// Report that a post entered or left the viewport. Must be called
    /// inside a tokio runtime.
    pub fn on_visibility(&self, post_id: Uuid, visible: bool) {
        let mut inner = self.lock();
        if let Some(timer) = inner.timers.remove(&post_id) {
            timer.abort();
        }
        if !visible || inner.marked.contains(&post_id) {
            return;
        }
        let tracker = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(tracker.dwell).await;
            // Past the dwell; leaving view no longer cancels the request.
            tracker.lock().timers.remove(&post_id);
            tracker.mark(post_id).await;
        });
        inner.timers.insert(post_id, timer);
    }

    async fn mark(&self, post_id: Uuid) {
        let request = Request::post(Route::MarkPostSeen { post_id }.path(), serde_json::json!({}))
            .with_friend_token(self.friend_token.as_deref())
            .with_descriptor("mark post as seen");
        match self.transport.send(&request).await {
            Ok(_) => {
                self.lock().marked.insert(post_id);
                debug!(%post_id, "post marked seen");
            }
            Err(e) => debug!(%post_id, error = %e, "mark seen failed"),
        }
    }
}
