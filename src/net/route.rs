//! Route table and cache keys.
//!
//! Each `Route` names one server endpoint; a `RouteKey` is a route rendered
//! to its path plus the query params that select the collection, and is the
//! identity of a cache entry.

#[cfg(test)]
#[path = "route_test.rs"]
mod route_test;

use std::fmt;

use uuid::Uuid;

use super::request::{FRIEND_TOKEN_PARAM, Query, Request};

/// Server endpoints used by the sync layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `GET|POST /posts/:post_id/reactions`
    PostReactions { post_id: Uuid },
    /// `DELETE /post_reactions/:id`
    PostReaction { id: Uuid },
    /// `GET|POST /posts/:post_id/stickers`
    PostStickers { post_id: Uuid },
    /// `PATCH|DELETE /post_stickers/:id`
    PostSticker { id: Uuid },
    /// `GET /world/friends`
    WorldFriends,
    /// `POST /world/friends/:id/pause`
    PauseFriend { id: Uuid },
    /// `POST /world/friends/:id/unpause`
    UnpauseFriend { id: Uuid },
    /// `GET /world/invitations`
    WorldInvitations,
    /// `DELETE /world/invitations/:id`
    WorldInvitation { id: Uuid },
    /// `POST /posts/:id/mark_seen`
    MarkPostSeen { post_id: Uuid },
}

impl Route {
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::PostReactions { post_id } => format!("/posts/{post_id}/reactions"),
            Self::PostReaction { id } => format!("/post_reactions/{id}"),
            Self::PostStickers { post_id } => format!("/posts/{post_id}/stickers"),
            Self::PostSticker { id } => format!("/post_stickers/{id}"),
            Self::WorldFriends => "/world/friends".to_owned(),
            Self::PauseFriend { id } => format!("/world/friends/{id}/pause"),
            Self::UnpauseFriend { id } => format!("/world/friends/{id}/unpause"),
            Self::WorldInvitations => "/world/invitations".to_owned(),
            Self::WorldInvitation { id } => format!("/world/invitations/{id}"),
            Self::MarkPostSeen { post_id } => format!("/posts/{post_id}/mark_seen"),
        }
    }
}

/// Identity of one cached collection: rendered path plus selecting query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey {
    pub path: String,
    pub query: Query,
}

impl RouteKey {
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self { path: route.path(), query: Query::new() }
    }

    /// Key scoped to a friend's view of the collection.
    #[must_use]
    pub fn for_friend(route: Route, token: Option<&str>) -> Self {
        let key = Self::new(route);
        match token {
            Some(token) => key.with_query(FRIEND_TOKEN_PARAM, token),
            None => key,
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// The GET request that revalidates this collection.
    #[must_use]
    pub fn fetch_request(&self) -> Request {
        Request::get(self.path.clone())
            .with_queries(&self.query)
            .with_descriptor(format!("load {}", self.path))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token values stay out of logs.
        f.write_str(&self.path)?;
        let mut first = true;
        for key in self.query.keys() {
            f.write_str(if first { "?" } else { "&" })?;
            f.write_str(key)?;
            first = false;
        }
        Ok(())
    }
}
