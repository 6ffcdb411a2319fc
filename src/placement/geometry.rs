#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

/// Border drawn around an emoji sticker, in pixels.
pub const EMOJI_STICKER_BORDER: f64 = 4.4;

/// Rendered sticker side: 44 px emoji plus the border on both sides.
pub const EMOJI_STICKER_SIZE: f64 = 44.0 + EMOJI_STICKER_BORDER * 2.0;

/// Width-to-height ratio of a sticker pad.
pub const STICKER_PAD_ASPECT: f64 = 16.0 / 9.0;

/// A point in container pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }

    #[must_use]
    pub fn distance_to(self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Container dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A sticker pad of the given width at the 16:9 pad aspect.
    #[must_use]
    pub fn sticker_pad(width: f64) -> Self {
        Self { width, height: width / STICKER_PAD_ASPECT }
    }
}

/// Position normalized to the container's free track, in `[0, 1]` when in bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RelativePosition {
    pub x: f64,
    pub y: f64,
}

/// Footprint of a draggable item: square side and the inset between the
/// drag image's edge and the rendered item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemGeometry {
    pub size: f64,
    pub inset: f64,
}

impl ItemGeometry {
    pub const STICKER: Self = Self { size: EMOJI_STICKER_SIZE, inset: EMOJI_STICKER_BORDER };

    /// Free track along each axis: how far the item's top-left can travel.
    #[must_use]
    pub fn track(self, container: Size) -> Size {
        Size { width: container.width - self.size, height: container.height - self.size }
    }
}

/// Divide by the track, yielding 0 when the item doesn't fit.
fn normalize(offset: f64, track: f64) -> f64 {
    if track > 0.0 { offset / track } else { 0.0 }
}

/// Item top-left in pixels → relative position.
#[must_use]
pub fn to_relative(top_left: Point, container: Size, item: ItemGeometry) -> RelativePosition {
    let track = item.track(container);
    RelativePosition { x: normalize(top_left.x, track.width), y: normalize(top_left.y, track.height) }
}

/// Relative position → item top-left in pixels.
#[must_use]
pub fn to_pixel(position: RelativePosition, container: Size, item: ItemGeometry) -> Point {
    let track = item.track(container);
    Point { x: position.x * track.width.max(0.0), y: position.y * track.height.max(0.0) }
}

/// Position for an item dropped from outside the container.
///
/// `grab_offset` is where the pointer held the drag image, relative to its
/// top-left. The result is not clamped.
#[must_use]
pub fn on_drop(pointer: Point, grab_offset: Point, container: Size, item: ItemGeometry) -> RelativePosition {
    let top_left = Point {
        x: pointer.x - grab_offset.x - item.inset,
        y: pointer.y - grab_offset.y - item.inset,
    };
    to_relative(top_left, container, item)
}

/// Whether the item box lies within `[0, container - item]` on both axes.
#[must_use]
pub fn in_bounds(top_left: Point, container: Size, item: ItemGeometry) -> bool {
    let track = item.track(container);
    (0.0..=track.width).contains(&top_left.x) && (0.0..=track.height).contains(&top_left.y)
}

/// How a drag resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    /// The item stays at this position.
    Committed(RelativePosition),
    /// The item left the container and should be deleted.
    Removed,
}

/// Resolve the final top-left of a dragged item.
#[must_use]
pub fn on_drag_end(top_left: Point, container: Size, item: ItemGeometry) -> DragOutcome {
    if in_bounds(top_left, container, item) {
        DragOutcome::Committed(to_relative(top_left, container, item))
    } else {
        DragOutcome::Removed
    }
}
