//! World owner's friend list: pause and unpause.

#[cfg(test)]
#[path = "friends_test.rs"]
mod friends_test;

use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use uuid::Uuid;

use crate::mutation::{Executor, InFlight, Mutation};
use crate::net::{ApiError, Friend, Request, Route, RouteKey};

#[derive(Clone)]
pub struct Friends {
    executor: Executor<Friend>,
}

impl Friends {
    #[must_use]
    pub fn new(executor: Executor<Friend>) -> Self {
        Self { executor }
    }

    #[must_use]
    pub fn key() -> RouteKey {
        RouteKey::new(Route::WorldFriends)
    }

    /// Fetch the friend list.
    ///
    /// # Errors
    ///
    /// Returns the transport error; cached items are kept.
    pub async fn load(&self) -> Result<Vec<Friend>, ApiError> {
        self.executor.cache().revalidate(&Self::key()).await?;
        Ok(self.friends())
    }

    #[must_use]
    pub fn friends(&self) -> Vec<Friend> {
        self.executor.cache().items(&Self::key())
    }

    /// Stop notifying a friend about new posts.
    pub fn pause(&self, id: Uuid) -> InFlight<Friend> {
        let request = Request::post(Route::PauseFriend { id }.path(), json!({})).with_descriptor("pause friend");
        self.set_paused(id, Some(now_rfc3339()), request)
    }

    pub fn unpause(&self, id: Uuid) -> InFlight<Friend> {
        let request = Request::post(Route::UnpauseFriend { id }.path(), json!({})).with_descriptor("unpause friend");
        self.set_paused(id, None, request)
    }

    fn set_paused(&self, id: Uuid, paused_since: Option<String>, request: Request) -> InFlight<Friend> {
        let mutation = Mutation::<Friend>::new(Self::key(), request)
            .in_lane(format!("friend:{id}"))
            .predict(move |items: &[Friend]| {
                items
                    .iter()
                    .map(|f| if f.id == id { Friend { paused_since: paused_since.clone(), ..f.clone() } } else { f.clone() })
                    .collect()
            });
        self.executor.begin(mutation)
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339).unwrap_or_else(|e| {
        debug!(error = %e, "rfc3339 format failed");
        now.unix_timestamp().to_string()
    })
}
