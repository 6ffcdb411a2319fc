//! Per-item placement state machine.
//!
//! `Unplaced -> Dragging -> {Committed | Removed}`. A committed item may be
//! dragged again; a removed item is terminal. A cancelled drag restores the
//! state it started from.

#[cfg(test)]
#[path = "item_test.rs"]
mod item_test;

use uuid::Uuid;

use super::geometry::{DragOutcome, ItemGeometry, Point, RelativePosition, Size, on_drag_end, on_drop};
use crate::net::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error("item {0} was removed")]
    Removed(Uuid),
    #[error("item {0} is not being dragged")]
    NotDragging(Uuid),
    #[error("item {0} is already being dragged")]
    AlreadyDragging(Uuid),
}

impl ErrorCode for PlacementError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Removed(_) => "E_ITEM_REMOVED",
            Self::NotDragging(_) => "E_NOT_DRAGGING",
            Self::AlreadyDragging(_) => "E_ALREADY_DRAGGING",
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlacementState {
    Unplaced,
    /// `origin` is the committed position to snap back to, if any.
    Dragging { origin: Option<RelativePosition> },
    Committed(RelativePosition),
    Removed,
}

/// A draggable item with an owner.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedItem {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub geometry: ItemGeometry,
    state: PlacementState,
}

impl PlacedItem {
    /// A new item with a client-generated id, not yet on the container.
    #[must_use]
    pub fn unplaced(owner_id: Uuid, geometry: ItemGeometry) -> Self {
        Self { id: Uuid::new_v4(), owner_id, geometry, state: PlacementState::Unplaced }
    }

    /// An item already placed at a known position.
    #[must_use]
    pub fn committed(id: Uuid, owner_id: Uuid, geometry: ItemGeometry, position: RelativePosition) -> Self {
        Self { id, owner_id, geometry, state: PlacementState::Committed(position) }
    }

    #[must_use]
    pub fn state(&self) -> PlacementState {
        self.state
    }

    /// Last committed position.
    #[must_use]
    pub fn position(&self) -> Option<RelativePosition> {
        match self.state {
            PlacementState::Committed(p) | PlacementState::Dragging { origin: Some(p) } => Some(p),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.state == PlacementState::Removed
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, PlacementState::Dragging { .. })
    }

    /// Pick the item up.
    ///
    /// # Errors
    ///
    /// Fails if the item is removed or already being dragged.
    pub fn begin_drag(&mut self) -> Result<(), PlacementError> {
        let origin = match self.state {
            PlacementState::Unplaced => None,
            PlacementState::Committed(p) => Some(p),
            PlacementState::Dragging { .. } => return Err(PlacementError::AlreadyDragging(self.id)),
            PlacementState::Removed => return Err(PlacementError::Removed(self.id)),
        };
        self.state = PlacementState::Dragging { origin };
        Ok(())
    }

    /// Drop an item dragged in from outside the container.
    ///
    /// # Errors
    ///
    /// Fails if the item is removed or already committed and not being dragged.
    pub fn drop_at(
        &mut self,
        pointer: Point,
        grab_offset: Point,
        container: Size,
    ) -> Result<RelativePosition, PlacementError> {
        match self.state {
            PlacementState::Unplaced | PlacementState::Dragging { .. } => {}
            PlacementState::Committed(_) => return Err(PlacementError::NotDragging(self.id)),
            PlacementState::Removed => return Err(PlacementError::Removed(self.id)),
        }
        let position = on_drop(pointer, grab_offset, container, self.geometry);
        self.state = PlacementState::Committed(position);
        Ok(position)
    }

    /// Release a drag with the item's final top-left in container pixels.
    ///
    /// # Errors
    ///
    /// Fails if no drag is in progress.
    pub fn end_drag(&mut self, top_left: Point, container: Size) -> Result<DragOutcome, PlacementError> {
        if !self.is_dragging() {
            return Err(self.not_dragging());
        }
        let outcome = on_drag_end(top_left, container, self.geometry);
        self.state = match outcome {
            DragOutcome::Committed(p) => PlacementState::Committed(p),
            DragOutcome::Removed => PlacementState::Removed,
        };
        Ok(outcome)
    }

    /// Abandon a drag, returning to the last committed position.
    ///
    /// # Errors
    ///
    /// Fails if no drag is in progress.
    pub fn cancel_drag(&mut self) -> Result<Option<RelativePosition>, PlacementError> {
        let PlacementState::Dragging { origin } = self.state else {
            return Err(self.not_dragging());
        };
        self.state = match origin {
            Some(p) => PlacementState::Committed(p),
            None => PlacementState::Unplaced,
        };
        Ok(origin)
    }

    /// Adopt a server position for an item that isn't mid-drag.
    pub fn sync_position(&mut self, position: RelativePosition) {
        if matches!(self.state, PlacementState::Committed(_) | PlacementState::Unplaced) {
            self.state = PlacementState::Committed(position);
        }
    }

    fn not_dragging(&self) -> PlacementError {
        if self.is_removed() {
            PlacementError::Removed(self.id)
        } else {
            PlacementError::NotDragging(self.id)
        }
    }
}
