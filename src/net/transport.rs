//! Transport seam: the only way the sync layer reaches the server.
//!
//! DESIGN
//! ======
//! `Transport` is an async trait so the cache and executor can be exercised
//! against a scripted mock in tests and against `HttpTransport` in the
//! binary. Implementations return the decoded JSON body on success and a
//! typed `ApiError` otherwise; envelope decoding happens in callers.

use super::request::Request;
use super::types::ApiError;

/// Provider-neutral async request/response interface.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return its JSON body.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the request fails, the server rejects it,
    /// or the body is malformed.
    async fn send(&self, request: &Request) -> Result<serde_json::Value, ApiError>;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::*;
    use crate::net::request::Method;

    type Handler = Box<dyn Fn(&Request) -> Result<serde_json::Value, ApiError> + Send + Sync>;

    struct Hold {
        method: Method,
        path: String,
        release: Arc<Notify>,
    }

    /// Scripted transport. The handler computes each response when the
    /// request arrives; a matching hold then delays its delivery until
    /// released, so tests control completion order.
    pub struct MockTransport {
        handler: Handler,
        requests: Mutex<Vec<Request>>,
        holds: Mutex<VecDeque<Hold>>,
    }

    impl MockTransport {
        pub fn new(
            handler: impl Fn(&Request) -> Result<serde_json::Value, ApiError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self { handler: Box::new(handler), requests: Mutex::new(Vec::new()), holds: Mutex::new(VecDeque::new()) })
        }

        /// Hold the next `method path` response until the returned handle is notified.
        pub fn hold(&self, method: Method, path: &str) -> Arc<Notify> {
            let release = Arc::new(Notify::new());
            self.holds
                .lock()
                .unwrap()
                .push_back(Hold { method, path: path.to_owned(), release: release.clone() });
            release
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.method == method && r.path == path)
                .count()
        }

        fn take_hold(&self, request: &Request) -> Option<Arc<Notify>> {
            let mut holds = self.holds.lock().unwrap();
            let pos = holds
                .iter()
                .position(|h| h.method == request.method && h.path == request.path)?;
            holds.remove(pos).map(|h| h.release)
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: &Request) -> Result<serde_json::Value, ApiError> {
            self.requests.lock().unwrap().push(request.clone());
            let hold = self.take_hold(request);
            let response = (self.handler)(request);
            if let Some(release) = hold {
                release.notified().await;
            }
            response
        }
    }
}
