//! Emoji reactions on a post.
//!
//! A reaction is added with a client-generated id and the server assigns
//! its own. `ids` maps the local id to the server id once the create
//! succeeds, so a removal queued behind the create can address the right
//! row. Add and remove for one (post, emoji) share a lane; removal finds
//! the reaction by actor and emoji, not by id, so it also hides the
//! server's copy after a revalidation lands mid-flight. For the same
//! reason an add predicts nothing once the server copy is visible.
//!
//! Map entries live while their local id is visible or a removal still
//! needs them; the rest are pruned on the next load, add, or remove.

#[cfg(test)]
#[path = "reactions_test.rs"]
mod reactions_test;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::mutation::{Executor, InFlight, Mutation};
use crate::net::types::decode_resource;
use crate::net::{Actor, ApiError, PostReaction, Request, Route, RouteKey};

/// Per-emoji tally for one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: usize,
    /// The local actor is among the reactors.
    pub reacted: bool,
}

/// What is known about the server row behind a predicted reaction.
#[derive(Debug, Clone, Copy)]
struct LocalReaction {
    post_id: Uuid,
    /// `None` until the create succeeds.
    server_id: Option<Uuid>,
    /// Removals holding the local id whose request isn't built yet.
    claims: usize,
}

/// Local id → server row.
type IdMap = Arc<Mutex<HashMap<Uuid, LocalReaction>>>;

/// A removal's hold on a local id. Released when dropped.
struct Claim {
    ids: IdMap,
    local_id: Uuid,
}

impl Claim {
    /// The server id, or `None` when the create never succeeded.
    fn server_id(&self) -> Option<Uuid> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.local_id)
            .and_then(|entry| entry.server_id)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = ids.get_mut(&self.local_id) {
            entry.claims = entry.claims.saturating_sub(1);
        }
    }
}

/// The row a removal deletes.
enum Target {
    Server(Uuid),
    Local(Claim),
}

#[derive(Clone)]
pub struct Reactions {
    executor: Executor<PostReaction>,
    actor: Actor,
    ids: IdMap,
}

impl Reactions {
    #[must_use]
    pub fn new(executor: Executor<PostReaction>, actor: Actor) -> Self {
        Self { executor, actor, ids: Arc::new(Mutex::new(HashMap::new())) }
    }

    #[must_use]
    pub fn executor(&self) -> &Executor<PostReaction> {
        &self.executor
    }

    #[must_use]
    pub fn key(&self, post_id: Uuid) -> RouteKey {
        RouteKey::for_friend(Route::PostReactions { post_id }, self.actor.friend_token())
    }

    /// Fetch the post's reactions.
    ///
    /// # Errors
    ///
    /// Returns the transport error; cached items are kept.
    pub async fn load(&self, post_id: Uuid) -> Result<Vec<PostReaction>, ApiError> {
        let key = self.key(post_id);
        self.executor.cache().revalidate(&key).await?;
        self.prune(post_id);
        Ok(self.executor.cache().items(&key))
    }

    #[must_use]
    pub fn reactions(&self, post_id: Uuid) -> Vec<PostReaction> {
        self.executor.cache().items(&self.key(post_id))
    }

    /// Tallies in first-seen order. Counts come from the visible list.
    #[must_use]
    pub fn summary(&self, post_id: Uuid) -> Vec<ReactionCount> {
        let mut tallies: Vec<ReactionCount> = Vec::new();
        for reaction in self.reactions(post_id) {
            let mine = reaction.is_by(&self.actor);
            match tallies.iter_mut().find(|t| t.emoji == reaction.emoji) {
                Some(tally) => {
                    tally.count += 1;
                    tally.reacted |= mine;
                }
                None => tallies.push(ReactionCount { emoji: reaction.emoji, count: 1, reacted: mine }),
            }
        }
        tallies
    }

    #[must_use]
    pub fn count(&self, post_id: Uuid, emoji: &str) -> usize {
        self.reactions(post_id).iter().filter(|r| r.emoji == emoji).count()
    }

    /// The local actor's visible reaction with `emoji`, if any.
    #[must_use]
    pub fn own_reaction(&self, post_id: Uuid, emoji: &str) -> Option<PostReaction> {
        self.reactions(post_id)
            .into_iter()
            .find(|r| r.emoji == emoji && r.is_by(&self.actor))
    }

    fn lane(post_id: Uuid, emoji: &str) -> String {
        format!("reaction:{post_id}:{emoji}")
    }

    fn lock_ids(&self) -> MutexGuard<'_, HashMap<Uuid, LocalReaction>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget local ids of `post_id` that are no longer visible or claimed.
    fn prune(&self, post_id: Uuid) {
        let mut ids = self.lock_ids();
        let visible: HashSet<Uuid> = self.reactions(post_id).into_iter().map(|r| r.id).collect();
        ids.retain(|local_id, entry| entry.post_id != post_id || entry.claims > 0 || visible.contains(local_id));
    }

    /// React with `emoji`. The reaction appears immediately.
    pub fn add(&self, post_id: Uuid, emoji: &str) -> InFlight<PostReaction> {
        self.prune(post_id);
        let local_id = Uuid::new_v4();
        let predicted = PostReaction {
            id: local_id,
            post_id,
            emoji: emoji.to_owned(),
            reactor_type: self.actor.reactor_type(),
            reactor_id: self.actor.id(),
        };
        let request = Request::post(Route::PostReactions { post_id }.path(), json!({ "reaction": { "emoji": emoji } }))
            .with_friend_token(self.actor.friend_token())
            .with_descriptor("react to post");
        let ids = Arc::clone(&self.ids);
        let actor = self.actor.clone();

        let mutation = Mutation::<PostReaction>::new(self.key(post_id), request)
            .in_lane(Self::lane(post_id, emoji))
            .predict(move |items: &[PostReaction]| {
                let mut next = items.to_vec();
                // The server's copy may already be here from a refetch.
                if !items.iter().any(|r| r.emoji == predicted.emoji && r.is_by(&actor)) {
                    next.push(predicted.clone());
                }
                next
            })
            .on_success(move |body| match decode_resource::<PostReaction>(body) {
                Ok(created) => {
                    // Pruned already if the local row was never shown.
                    if let Some(entry) = ids.lock().unwrap_or_else(PoisonError::into_inner).get_mut(&local_id) {
                        entry.server_id = Some(created.id);
                    }
                }
                Err(e) => warn!(%local_id, error = %e, "reaction created but response unreadable"),
            });

        // Registered and shown under one lock so a concurrent prune can't miss it.
        let mut ids = self.lock_ids();
        ids.insert(local_id, LocalReaction { post_id, server_id: None, claims: 0 });
        let in_flight = self.executor.begin(mutation);
        drop(ids);
        in_flight
    }

    /// Remove the local actor's `emoji` reaction. The reaction disappears
    /// immediately; the delete is sent once any queued add has resolved.
    pub fn remove(&self, post_id: Uuid, emoji: &str) -> InFlight<PostReaction> {
        self.prune(post_id);
        let target = {
            let mut ids = self.lock_ids();
            self.own_reaction(post_id, emoji).map(|r| match ids.get_mut(&r.id) {
                Some(entry) => {
                    entry.claims += 1;
                    Target::Local(Claim { ids: Arc::clone(&self.ids), local_id: r.id })
                }
                None => Target::Server(r.id),
            })
        };
        let token = self.actor.friend_token().map(str::to_owned);

        let actor = self.actor.clone();
        let owned_emoji = emoji.to_owned();
        let mutation = Mutation::<PostReaction>::deferred(self.key(post_id), "remove reaction", move || {
            let id = match target? {
                Target::Server(id) => id,
                Target::Local(claim) => claim.server_id()?,
            };
            Some(
                Request::delete(Route::PostReaction { id }.path())
                    .with_friend_token(token.as_deref())
                    .with_descriptor("remove reaction"),
            )
        })
        .in_lane(Self::lane(post_id, emoji))
        .predict(move |items: &[PostReaction]| {
            items
                .iter()
                .filter(|r| !(r.emoji == owned_emoji && r.is_by(&actor)))
                .cloned()
                .collect()
        });
        self.executor.begin(mutation)
    }

    /// Add if the local actor hasn't reacted with `emoji`, else remove.
    pub fn toggle(&self, post_id: Uuid, emoji: &str) -> InFlight<PostReaction> {
        if self.own_reaction(post_id, emoji).is_some() {
            self.remove(post_id, emoji)
        } else {
            self.add(post_id, emoji)
        }
    }
}
