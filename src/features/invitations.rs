//! Outstanding world invitations.

#[cfg(test)]
#[path = "invitations_test.rs"]
mod invitations_test;

use uuid::Uuid;

use crate::mutation::{Executor, InFlight, Mutation};
use crate::net::{ApiError, Invitation, Request, Route, RouteKey};

#[derive(Clone)]
pub struct Invitations {
    executor: Executor<Invitation>,
}

impl Invitations {
    #[must_use]
    pub fn new(executor: Executor<Invitation>) -> Self {
        Self { executor }
    }

    #[must_use]
    pub fn key() -> RouteKey {
        RouteKey::new(Route::WorldInvitations)
    }

    /// Fetch pending invitations.
    ///
    /// # Errors
    ///
    /// Returns the transport error; cached items are kept.
    pub async fn load(&self) -> Result<Vec<Invitation>, ApiError> {
        self.executor.cache().revalidate(&Self::key()).await?;
        Ok(self.invitations())
    }

    #[must_use]
    pub fn invitations(&self) -> Vec<Invitation> {
        self.executor.cache().items(&Self::key())
    }

    /// Withdraw an invitation. It disappears from the list immediately.
    pub fn cancel(&self, id: Uuid) -> InFlight<Invitation> {
        let request = Request::delete(Route::WorldInvitation { id }.path()).with_descriptor("delete invitation");
        let mutation = Mutation::<Invitation>::new(Self::key(), request)
            .predict(move |items: &[Invitation]| items.iter().filter(|i| i.id != id).cloned().collect());
        self.executor.begin(mutation)
    }
}
