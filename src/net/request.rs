//! Request: the single outbound call shape for the sync layer.
//!
//! ARCHITECTURE
//! ============
//! Every network operation the client performs is a `Request`: an HTTP
//! method, a route path, flat query params, and an optional JSON body. The
//! transport never inspects the body; feature controllers build requests
//! with the builders below and hand them to the executor or the cache.
//!
//! DESIGN
//! ======
//! - Friend-authenticated routes carry the access token as the
//!   `friend_token` query param, never as a header.
//! - `descriptor` is the human phrase used in warnings ("react to post").

#[cfg(test)]
#[path = "request_test.rs"]
mod request_test;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Query key carrying a friend's access token.
pub const FRIEND_TOKEN_PARAM: &str = "friend_token";

/// Error body key for a single error message.
pub const ERROR_MESSAGE: &str = "error";

/// Error body key for the field-level validation map.
pub const ERROR_FIELDS: &str = "errors";

// =============================================================================
// TYPES
// =============================================================================

/// Flat query params. Ordered so request URLs and cache keys are stable.
pub type Query = BTreeMap<String, String>;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    /// Methods that never carry a body.
    #[must_use]
    pub fn is_bodyless(self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    pub method: Method,
    pub path: String,
    pub query: Query,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub descriptor: String,
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
pub(crate) fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Request {
    fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: Uuid::new_v4(),
            ts: now_ms(),
            method,
            descriptor: format!("{method} {path}"),
            path,
            query: Query::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Request {
    /// Attach a body. Ignored for GET/DELETE.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        if !self.method.is_bodyless() {
            self.body = Some(body);
        }
        self
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_queries(mut self, query: &Query) -> Self {
        self.query
            .extend(query.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Attach the friend token when the caller is acting as a friend.
    #[must_use]
    pub fn with_friend_token(self, token: Option<&str>) -> Self {
        match token {
            Some(token) => self.with_query(FRIEND_TOKEN_PARAM, token),
            None => self,
        }
    }

    #[must_use]
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    /// Path plus raw query for logs, e.g. `/posts/1/reactions?friend_token=abc`.
    /// The transport encodes the query itself.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}
