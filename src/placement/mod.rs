//! Drag/drop placement: pointer math, drag-end policy, and group drags.
//!
//! Positions are stored relative to the container's free track so they
//! survive resizes: `relative = top_left / (container - item)`. Nothing is
//! clamped while dragging; the drag-end policy either commits an in-bounds
//! position or removes the item.

pub mod geometry;
pub mod group;
pub mod item;

pub use geometry::{
    DragOutcome, EMOJI_STICKER_BORDER, EMOJI_STICKER_SIZE, ItemGeometry, Point, RelativePosition, STICKER_PAD_ASPECT,
    Size, in_bounds, on_drag_end, on_drop, to_pixel, to_relative,
};
pub use group::{GroupDrag, PuzzleBoard, SnapGraph};
pub use item::{PlacedItem, PlacementError, PlacementState};
