//! Draft persistence for in-progress post forms.
//!
//! DESIGN
//! ======
//! A draft is the form's values plus the post type they were written for,
//! stored as JSON under `world_post_draft:<world_id>` or
//! `space_post_draft:<space_id>`. A draft only applies to a form with the
//! same post type. Values with no content are never stored; saving them
//! clears the draft instead.
//!
//! `DraftSession` layers the form lifecycle on top: the touched gate, the
//! save throttle, and one-shot restoration.

pub mod session;
pub mod store;


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub use session::{DraftSession, RestoreState};
pub use store::{FileStore, KeyValueStore, MemoryStore};

use crate::net::ErrorCode;

/// Non-breaking space as the editor encodes it.
const NBSP_ENTITY: &str = "&nbsp;";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DraftError {
    #[error("draft store I/O failed: {0}")]
    Io(String),
    #[error("stored draft `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("draft encode failed: {0}")]
    Encode(String),
}

impl ErrorCode for DraftError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_DRAFT_IO",
            Self::Corrupt { .. } => "E_DRAFT_CORRUPT",
            Self::Encode(_) => "E_DRAFT_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

// =============================================================================
// KEYS
// =============================================================================

/// Which composer a draft belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftKey {
    WorldPost { world_id: Uuid },
    SpacePost { space_id: Uuid },
}

impl DraftKey {
    #[must_use]
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldPost { world_id } => write!(f, "world_post_draft:{world_id}"),
            Self::SpacePost { space_id } => write!(f, "space_post_draft:{space_id}"),
        }
    }
}

// =============================================================================
// VALUES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    JournalEntry,
    Poem,
    Invitation,
    Question,
    FollowUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostVisibility {
    Secret,
    #[default]
    Friends,
    Public,
    ChosenFamily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notifiability {
    Hidden,
    Muted,
    Notify,
}

/// An uploaded image, referenced by its signed blob id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub signed_id: String,
}

/// Values of the post composer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostFormValues {
    pub title: String,
    pub body_html: String,
    pub emoji: String,
    pub images_uploads: Vec<Upload>,
    pub visibility: PostVisibility,
    pub pinned_until: Option<String>,
    pub friend_notifiability: BTreeMap<Uuid, Notifiability>,
    pub encouragement_id: Option<Uuid>,
    pub spotify_track_url: String,
    pub visible_to_ids: Vec<Uuid>,
}

/// Whether a form has anything worth keeping.
pub trait DraftContent {
    fn has_content(&self) -> bool;
}

impl DraftContent for PostFormValues {
    /// Only body text counts; a title or attachments alone are not kept.
    fn has_content(&self) -> bool {
        html_has_text(&self.body_html)
    }
}

/// Whether rich-text HTML has any visible text outside its tags.
fn html_has_text(html: &str) -> bool {
    let mut in_tag = false;
    let mut text = String::new();
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    !text.replace(NBSP_ENTITY, " ").trim().is_empty()
}

/// What is stored under a draft key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft<V> {
    pub post_type: PostType,
    #[serde(rename = "values")]
    pub form_values: V,
}

// =============================================================================
// DRAFTS
// =============================================================================

/// Draft operations over a key-value store.
#[derive(Clone)]
pub struct Drafts {
    store: Arc<dyn KeyValueStore>,
}

impl Drafts {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Stored values for `key` if they were written for `post_type`.
    ///
    /// # Errors
    ///
    /// Returns store or decode errors.
    pub fn load_draft<V>(&self, key: DraftKey, post_type: PostType) -> Result<Option<V>, DraftError>
    where
        V: DeserializeOwned,
    {
        let draft: Option<PostDraft<V>> = store::load_json(self.store(), &key.storage_key())?;
        Ok(draft.and_then(|d| (d.post_type == post_type).then_some(d.form_values)))
    }

    /// Store `values`, or clear the draft if they have no content.
    ///
    /// # Errors
    ///
    /// Returns store or encode errors.
    pub fn save_draft<V>(&self, key: DraftKey, post_type: PostType, values: &V) -> Result<(), DraftError>
    where
        V: Serialize + DraftContent,
    {
        if !values.has_content() {
            debug!(%key, "clearing empty draft");
            return self.clear_draft(key);
        }
        debug!(%key, ?post_type, "saving draft");
        let draft = PostDraft { post_type, form_values: values };
        store::save_json(self.store(), &key.storage_key(), &draft)
    }

    /// # Errors
    ///
    /// Returns store errors.
    pub fn clear_draft(&self, key: DraftKey) -> Result<(), DraftError> {
        self.store.remove(&key.storage_key())
    }

    /// Post type of the stored draft, whatever it is.
    ///
    /// # Errors
    ///
    /// Returns store errors. A draft whose post type can't be read is `None`.
    pub fn saved_draft_type(&self, key: DraftKey) -> Result<Option<PostType>, DraftError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TypeOnly {
            post_type: PostType,
        }
        let Some(raw) = self.store.get(&key.storage_key())? else {
            return Ok(None);
        };
        Ok(serde_json::from_str::<TypeOnly>(&raw).ok().map(|t| t.post_type))
    }
}
