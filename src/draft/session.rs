//! Draft lifecycle for one mounted form.
//!
//! Restoration runs at most once per session:
//!
//! ```text
//! Idle ──restore()──► Restoring ──draft found──► Restored
//!   │                     └──────no draft──────► Idle
//!   └──touch() before any draft was restored───► Dismissed
//! ```
//!
//! Saves are gated on the form having been touched and throttled: the
//! first change in a window writes immediately, later ones are held and
//! written by the next change past the window or by `flush`.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{DraftContent, DraftError, DraftKey, Drafts, PostType};

/// Default save throttle window.
pub const DEFAULT_DRAFT_THROTTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    Restoring,
    Restored,
    Dismissed,
}

/// What `on_change` did with the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Not written: form untouched or editing an existing post.
    Skipped,
    Saved,
    /// Held until the throttle window passes.
    Deferred,
}

pub struct DraftSession<V> {
    drafts: Drafts,
    key: DraftKey,
    post_type: PostType,
    editing_existing: bool,
    touched: bool,
    restore: RestoreState,
    throttle: Duration,
    last_write: Option<Instant>,
    pending: Option<V>,
}

impl<V> DraftSession<V>
where
    V: Serialize + DeserializeOwned + DraftContent + Clone,
{
    /// Session for composing a new post.
    #[must_use]
    pub fn new(drafts: Drafts, key: DraftKey, post_type: PostType) -> Self {
        Self {
            drafts,
            key,
            post_type,
            editing_existing: false,
            touched: false,
            restore: RestoreState::Idle,
            throttle: DEFAULT_DRAFT_THROTTLE,
            last_write: None,
            pending: None,
        }
    }

    /// Session for editing an existing post. Drafts are neither restored nor saved.
    #[must_use]
    pub fn editing(drafts: Drafts, key: DraftKey, post_type: PostType) -> Self {
        Self { editing_existing: true, restore: RestoreState::Dismissed, ..Self::new(drafts, key, post_type) }
    }

    #[must_use]
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    #[must_use]
    pub fn restore_state(&self) -> RestoreState {
        self.restore
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Load the stored draft into the form, once.
    ///
    /// Returns the values to apply, or `None` if restoration already
    /// happened, was dismissed, or no matching draft exists yet.
    ///
    /// # Errors
    ///
    /// Returns store or decode errors; the session goes back to `Idle`.
    pub fn restore(&mut self) -> Result<Option<V>, DraftError> {
        if self.restore != RestoreState::Idle {
            return Ok(None);
        }
        self.restore = RestoreState::Restoring;
        match self.drafts.load_draft::<V>(self.key, self.post_type) {
            Ok(Some(values)) => {
                debug!(key = %self.key, "restored draft");
                self.restore = RestoreState::Restored;
                Ok(Some(values))
            }
            Ok(None) => {
                self.restore = RestoreState::Idle;
                Ok(None)
            }
            Err(e) => {
                self.restore = RestoreState::Idle;
                Err(e)
            }
        }
    }

    /// The user edited a field.
    pub fn touch(&mut self) {
        self.touched = true;
        if self.restore == RestoreState::Idle {
            self.restore = RestoreState::Dismissed;
        }
    }

    /// Form values changed.
    ///
    /// # Errors
    ///
    /// Returns store errors from an immediate write.
    pub fn on_change(&mut self, values: &V) -> Result<SaveOutcome, DraftError> {
        self.on_change_at(values, Instant::now())
    }

    pub(crate) fn on_change_at(&mut self, values: &V, now: Instant) -> Result<SaveOutcome, DraftError> {
        if !self.touched || self.editing_existing {
            return Ok(SaveOutcome::Skipped);
        }
        let window_open = self
            .last_write
            .is_some_and(|last| now.saturating_duration_since(last) < self.throttle);
        if window_open {
            self.pending = Some(values.clone());
            return Ok(SaveOutcome::Deferred);
        }
        self.pending = None;
        self.write(values, now)?;
        Ok(SaveOutcome::Saved)
    }

    /// Write a held value now, if any.
    ///
    /// # Errors
    ///
    /// Returns store errors; the value stays held.
    pub fn flush(&mut self) -> Result<bool, DraftError> {
        self.flush_at(Instant::now())
    }

    pub(crate) fn flush_at(&mut self, now: Instant) -> Result<bool, DraftError> {
        let Some(values) = self.pending.take() else {
            return Ok(false);
        };
        if let Err(e) = self.write(&values, now) {
            self.pending = Some(values);
            return Err(e);
        }
        Ok(true)
    }

    /// Write a held value if its throttle window has passed.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn tick_at(&mut self, now: Instant) -> Result<bool, DraftError> {
        let due = self
            .last_write
            .is_none_or(|last| now.saturating_duration_since(last) >= self.throttle);
        if due { self.flush_at(now) } else { Ok(false) }
    }

    /// The post was created; the draft is done.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    pub fn on_submit_success(&mut self) -> Result<(), DraftError> {
        self.pending = None;
        self.touched = false;
        self.last_write = None;
        if self.editing_existing {
            return Ok(());
        }
        self.restore = RestoreState::Idle;
        self.drafts.clear_draft(self.key)
    }

    /// The form is going away without submitting. The draft stays.
    ///
    /// # Errors
    ///
    /// Returns store errors from writing a held value.
    pub fn abandon(mut self) -> Result<(), DraftError> {
        self.flush().map(|_| ())
    }

    fn write(&mut self, values: &V, now: Instant) -> Result<(), DraftError> {
        self.drafts.save_draft(self.key, self.post_type, values)?;
        self.last_write = Some(now);
        Ok(())
    }
}
