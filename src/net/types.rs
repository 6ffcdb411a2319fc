//! Wire types: resources, response envelopes, and API errors.
//!
//! Reads return `{ <collection>: T[] }`; writes return `{ <resource>: T }`.
//! Failures return either `{ "errors": { field: message } }` (validation)
//! or `{ "error": message }`.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::ErrorCode;
use crate::placement::RelativePosition;

// =============================================================================
// ERROR
// =============================================================================

/// Field-level validation messages keyed by field name.
pub type FieldErrors = BTreeMap<String, String>;

/// Errors produced by a transport call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The server rejected a write with field-level messages.
    #[error("validation failed: {}", format_fields(.0))]
    Validation(FieldErrors),

    /// The request failed before a server response arrived.
    #[error("request failed: {0}")]
    Transport(String),

    /// The server returned a non-success status.
    #[error("server error: status {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The transport could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Status { .. } => "E_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::ClientBuild(_) => "E_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Status { status: 429 | 500..=599, .. })
    }
}

fn format_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field} {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// RESOURCE
// =============================================================================

/// A server resource that lives in a cached collection.
pub trait Resource: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Envelope key for a single resource, e.g. `"reaction"`.
    const RESOURCE: &'static str;
    /// Envelope key for a collection, e.g. `"reactions"`.
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;
}

/// Decode `{ <collection>: [...] }` into items.
///
/// # Errors
///
/// Returns `ApiError::Parse` if the key is missing or the items don't decode.
pub fn decode_collection<T: Resource>(body: &serde_json::Value) -> Result<Vec<T>, ApiError> {
    let raw = body
        .get(T::COLLECTION)
        .ok_or_else(|| ApiError::Parse(format!("missing `{}` in response", T::COLLECTION)))?;
    serde_json::from_value(raw.clone()).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Decode `{ <resource>: {...} }` into one item.
///
/// # Errors
///
/// Returns `ApiError::Parse` if the key is missing or the item doesn't decode.
pub fn decode_resource<T: Resource>(body: &serde_json::Value) -> Result<T, ApiError> {
    let raw = body
        .get(T::RESOURCE)
        .ok_or_else(|| ApiError::Parse(format!("missing `{}` in response", T::RESOURCE)))?;
    serde_json::from_value(raw.clone()).map_err(|e| ApiError::Parse(e.to_string()))
}

/// Wrap items the way the server does for a collection read.
#[must_use]
pub fn encode_collection<T: Resource>(items: &[T]) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert(T::COLLECTION.into(), serde_json::to_value(items).unwrap_or_default());
    serde_json::Value::Object(body)
}

/// Wrap one item the way the server does for a write response.
#[must_use]
pub fn encode_resource<T: Resource>(item: &T) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert(T::RESOURCE.into(), serde_json::to_value(item).unwrap_or_default());
    serde_json::Value::Object(body)
}

// =============================================================================
// ACTORS
// =============================================================================

/// Kind of account behind a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactorType {
    Friend,
    User,
}

/// Who the local client is acting as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// An invited friend, authenticated by access token.
    Friend { id: Uuid, access_token: String },
    /// A signed-in user reacting to a public post.
    User { id: Uuid },
}

impl Actor {
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Friend { id, .. } | Self::User { id } => *id,
        }
    }

    #[must_use]
    pub fn reactor_type(&self) -> ReactorType {
        match self {
            Self::Friend { .. } => ReactorType::Friend,
            Self::User { .. } => ReactorType::User,
        }
    }

    /// Access token to attach to requests, if acting as a friend.
    #[must_use]
    pub fn friend_token(&self) -> Option<&str> {
        match self {
            Self::Friend { access_token, .. } => Some(access_token),
            Self::User { .. } => None,
        }
    }
}

// =============================================================================
// RESOURCES
// =============================================================================

/// An emoji reaction on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostReaction {
    pub id: Uuid,
    pub post_id: Uuid,
    pub emoji: String,
    pub reactor_type: ReactorType,
    pub reactor_id: Uuid,
}

impl PostReaction {
    /// Whether this reaction was made by `actor`.
    #[must_use]
    pub fn is_by(&self, actor: &Actor) -> bool {
        self.reactor_type == actor.reactor_type() && self.reactor_id == actor.id()
    }
}

impl Resource for PostReaction {
    const RESOURCE: &'static str = "reaction";
    const COLLECTION: &'static str = "reactions";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// An emoji sticker placed on a post's sticker pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSticker {
    pub id: Uuid,
    pub emoji: String,
    pub relative_position: RelativePosition,
    pub friend_id: Uuid,
}

impl Resource for PostSticker {
    const RESOURCE: &'static str = "sticker";
    const COLLECTION: &'static str = "stickers";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A friend of the current user's world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Friend {
    pub id: Uuid,
    pub name: String,
    /// RFC 3339 timestamp when the friend was paused.
    #[serde(default)]
    pub paused_since: Option<String>,
}

impl Friend {
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }
}

impl Resource for Friend {
    const RESOURCE: &'static str = "friend";
    const COLLECTION: &'static str = "friends";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// An outstanding invitation to the current user's world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub invitee_name: String,
}

impl Resource for Invitation {
    const RESOURCE: &'static str = "invitation";
    const COLLECTION: &'static str = "invitations";

    fn id(&self) -> Uuid {
        self.id
    }
}
