//! Client-side synchronization for a personal-world social app.
//!
//! Friends react to posts, place emoji stickers on them, and the world
//! owner pauses friends and withdraws invitations. Every write is applied
//! optimistically to a local cache of server collections, sent to the API,
//! and then confirmed from server truth or rolled back exactly.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`net`] | Routes, wire types, the [`net::Transport`] seam and its HTTP implementation |
//! | [`cache`] | Keyed collections with optimistic layers and sequenced revalidation |
//! | [`mutation`] | Optimistic mutation executor with per-lane ordering |
//! | [`draft`] | Draft persistence with a dirty gate and one-shot restore |
//! | [`placement`] | Drag/drop geometry, drag-end policy, group drags |
//! | [`features`] | Reactions, stickers, friends, invitations, seen tracking |
//! | [`poll`] | Visibility-gated polling revalidation |
//! | [`config`] | Environment configuration |

pub mod cache;
pub mod config;
pub mod draft;
pub mod features;
pub mod mutation;
pub mod net;
pub mod placement;
pub mod poll;
