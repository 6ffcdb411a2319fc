//! Emoji stickers on a post's sticker pad.
//!
//! DESIGN
//! ======
//! Stickers carry client-generated ids that the server adopts, so a new
//! sticker needs no id reconciliation. Only the current friend's own
//! stickers are draggable; everyone else's are read-only.
//!
//! Drag outcomes map onto mutations:
//!
//! ```text
//! drop from palette ──► POST   /posts/:id/stickers     (no revalidation)
//! drag end in bounds ─► PATCH  /post_stickers/:id      (revalidate)
//! drag end outside ───► DELETE /post_stickers/:id      (no revalidation)
//! ```
//!
//! Create, move, and delete of one sticker share a lane, so a drag that
//! ends before the create resolves waits for it. A failed delete rolls the
//! sticker back onto the pad.

#[cfg(test)]
#[path = "stickers_test.rs"]
mod stickers_test;

use serde_json::json;
use uuid::Uuid;

use crate::mutation::{Executor, InFlight, Mutation};
use crate::net::{Actor, ApiError, ErrorCode, PostSticker, Request, Route, RouteKey};
use crate::placement::{DragOutcome, ItemGeometry, PlacedItem, PlacementError, Point, RelativePosition, Size};

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StickerError {
    /// Only invited friends place stickers.
    #[error("only friends can place stickers")]
    NotInvited,

    #[error("sticker {0} belongs to someone else")]
    NotOwner(Uuid),

    #[error(transparent)]
    Placement(#[from] PlacementError),
}

impl ErrorCode for StickerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotInvited => "E_NOT_INVITED",
            Self::NotOwner(_) => "E_NOT_OWNER",
            Self::Placement(e) => e.error_code(),
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Clone)]
pub struct Stickers {
    executor: Executor<PostSticker>,
    actor: Actor,
}

impl Stickers {
    #[must_use]
    pub fn new(executor: Executor<PostSticker>, actor: Actor) -> Self {
        Self { executor, actor }
    }

    #[must_use]
    pub fn executor(&self) -> &Executor<PostSticker> {
        &self.executor
    }

    #[must_use]
    pub fn key(&self, post_id: Uuid) -> RouteKey {
        RouteKey::for_friend(Route::PostStickers { post_id }, self.actor.friend_token())
    }

    /// Fetch the post's stickers.
    ///
    /// # Errors
    ///
    /// Returns the transport error; cached items are kept.
    pub async fn load(&self, post_id: Uuid) -> Result<Vec<PostSticker>, ApiError> {
        let key = self.key(post_id);
        self.executor.cache().revalidate(&key).await?;
        Ok(self.executor.cache().items(&key))
    }

    #[must_use]
    pub fn stickers(&self, post_id: Uuid) -> Vec<PostSticker> {
        self.executor.cache().items(&self.key(post_id))
    }

    fn friend_id(&self) -> Option<Uuid> {
        match self.actor {
            Actor::Friend { id, .. } => Some(id),
            Actor::User { .. } => None,
        }
    }

    /// Split into (own, others). A non-friend owns nothing.
    #[must_use]
    pub fn partition(&self, post_id: Uuid) -> (Vec<PostSticker>, Vec<PostSticker>) {
        let friend_id = self.friend_id();
        self.stickers(post_id)
            .into_iter()
            .partition(|s| Some(s.friend_id) == friend_id)
    }

    fn lane(id: Uuid) -> String {
        format!("sticker:{id}")
    }

    /// Own stickers as draggable items.
    #[must_use]
    pub fn placed_items(&self, post_id: Uuid) -> Vec<PlacedItem> {
        self.partition(post_id)
            .0
            .into_iter()
            .map(|s| PlacedItem::committed(s.id, s.friend_id, ItemGeometry::STICKER, s.relative_position))
            .collect()
    }

    /// Place a new sticker dropped from the palette.
    ///
    /// # Errors
    ///
    /// Returns `StickerError::NotInvited` unless acting as a friend.
    pub fn drop_new(
        &self,
        post_id: Uuid,
        emoji: &str,
        pointer: Point,
        grab_offset: Point,
        container: Size,
    ) -> Result<InFlight<PostSticker>, StickerError> {
        let friend_id = self.friend_id().ok_or(StickerError::NotInvited)?;
        let mut item = PlacedItem::unplaced(friend_id, ItemGeometry::STICKER);
        let relative_position = item.drop_at(pointer, grab_offset, container)?;
        let sticker = PostSticker { id: item.id, emoji: emoji.to_owned(), relative_position, friend_id };

        let request = Request::post(
            Route::PostStickers { post_id }.path(),
            json!({ "sticker": { "id": sticker.id, "emoji": sticker.emoji, "relative_position": relative_position } }),
        )
        .with_friend_token(self.actor.friend_token())
        .with_descriptor("create sticker");

        let mutation = Mutation::<PostSticker>::new(self.key(post_id), request)
            .in_lane(Self::lane(sticker.id))
            .without_revalidation()
            .predict(move |items: &[PostSticker]| {
                let mut next = items.to_vec();
                // The server adopts our id, so a refetch may already hold it.
                if !items.iter().any(|s| s.id == sticker.id) {
                    next.push(sticker.clone());
                }
                next
            });
        Ok(self.executor.begin(mutation))
    }

    /// Resolve a drag of one of the actor's stickers.
    ///
    /// # Errors
    ///
    /// Fails if the item isn't the actor's or isn't being dragged.
    pub fn drag_end(
        &self,
        post_id: Uuid,
        item: &mut PlacedItem,
        top_left: Point,
        container: Size,
    ) -> Result<InFlight<PostSticker>, StickerError> {
        if self.friend_id() != Some(item.owner_id) {
            return Err(StickerError::NotOwner(item.id));
        }
        let id = item.id;
        let mutation = match item.end_drag(top_left, container)? {
            DragOutcome::Committed(position) => self.move_to(post_id, id, position),
            DragOutcome::Removed => self.delete(post_id, id),
        };
        Ok(self.executor.begin(mutation))
    }

    fn move_to(&self, post_id: Uuid, id: Uuid, position: RelativePosition) -> Mutation<PostSticker> {
        let request = Request::patch(Route::PostSticker { id }.path(), json!({ "sticker": { "relative_position": position } }))
            .with_friend_token(self.actor.friend_token())
            .with_descriptor("update sticker");
        Mutation::<PostSticker>::new(self.key(post_id), request)
            .in_lane(Self::lane(id))
            .predict(move |items: &[PostSticker]| {
                items
                    .iter()
                    .map(|s| if s.id == id { PostSticker { relative_position: position, ..s.clone() } } else { s.clone() })
                    .collect()
            })
    }

    fn delete(&self, post_id: Uuid, id: Uuid) -> Mutation<PostSticker> {
        let request = Request::delete(Route::PostSticker { id }.path())
            .with_friend_token(self.actor.friend_token())
            .with_descriptor("delete sticker");
        Mutation::<PostSticker>::new(self.key(post_id), request)
            .in_lane(Self::lane(id))
            .without_revalidation()
            .predict(move |items: &[PostSticker]| items.iter().filter(|s| s.id != id).cloned().collect())
    }
}
