//! Feature controllers: one per resource the client writes.
//!
//! Each controller composes an `Executor` over its collection with the
//! requests and predictions for that feature. Controllers are cheap
//! `Clone` handles and hold no state of their own beyond what the cache
//! holds, except reactions (local → server id map) and seen tracking
//! (dwell timers).

pub mod friends;
pub mod invitations;
pub mod reactions;
pub mod seen;
pub mod stickers;

pub use friends::Friends;
pub use invitations::Invitations;
pub use reactions::{ReactionCount, Reactions};
pub use seen::{DEFAULT_SEEN_DWELL, SeenTracker};
pub use stickers::{StickerError, Stickers};
