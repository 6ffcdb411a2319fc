//! Network boundary: requests, routes, wire types, and transports.
//!
//! ARCHITECTURE
//! ============
//! The cache and the mutation executor never build URLs or parse bodies
//! themselves. They hold an `Arc<dyn Transport>` and exchange `Request`s
//! for JSON bodies; `types` owns the envelope shapes and the `ApiError`
//! taxonomy, and `route` owns the endpoint table.

pub mod http;
pub mod request;
pub mod route;
pub mod transport;
pub mod types;

pub use http::HttpTransport;
pub use request::{ErrorCode, Method, Request};
pub use route::{Route, RouteKey};
pub use transport::Transport;
pub use types::{
    Actor, ApiError, FieldErrors, Friend, Invitation, PostReaction, PostSticker, ReactorType, Resource,
};
