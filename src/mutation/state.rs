//! Mutation lifecycle as a reducer.
//!
//! `Pending --Succeeded--> Confirmed`, `Pending --Failed--> RolledBack`.
//! Both resolved states are terminal; later events are ignored.

#[cfg(test)]
#[path = "state_test.rs"]
mod state_test;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Pending,
    Confirmed,
    RolledBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    Succeeded,
    Failed,
}

impl MutationState {
    #[must_use]
    pub fn apply(self, event: MutationEvent) -> Self {
        match (self, event) {
            (Self::Pending, MutationEvent::Succeeded) => Self::Confirmed,
            (Self::Pending, MutationEvent::Failed) => Self::RolledBack,
            (resolved, _) => resolved,
        }
    }

    #[must_use]
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}
