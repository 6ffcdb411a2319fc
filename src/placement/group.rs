//! Connected-group multi-drag.
//!
//! DESIGN
//! ======
//! Pieces are indexed `0..n`. `SnapGraph` is an adjacency arena: each
//! piece lists its declared neighbors. Two neighbors are *snapped* when
//! their translations are within a tolerance of each other. Dragging a
//! piece moves its whole snapped component, found breadth-first, by the
//! leader's pixel delta. On release every member is committed on its own
//! and aligned exactly onto its first snapped neighbor.

#[cfg(test)]
#[path = "group_test.rs"]
mod group_test;

use std::collections::VecDeque;

use super::geometry::Point;

/// Snap tolerance in screen pixels; divided by the board scale.
pub const DEFAULT_SNAP_TOLERANCE_PX: f64 = 8.0;

// =============================================================================
// GRAPH
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct SnapGraph {
    neighbors: Vec<Vec<usize>>,
}

impl SnapGraph {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self { neighbors: vec![Vec::new(); count] }
    }

    /// Build from explicit neighbor lists. Out-of-range entries are dropped.
    #[must_use]
    pub fn from_neighbors(neighbors: Vec<Vec<usize>>) -> Self {
        let count = neighbors.len();
        let neighbors = neighbors
            .into_iter()
            .enumerate()
            .map(|(i, list)| list.into_iter().filter(|&n| n < count && n != i).collect())
            .collect();
        Self { neighbors }
    }

    /// Every piece neighbors every other piece.
    #[must_use]
    pub fn complete(count: usize) -> Self {
        Self::from_neighbors((0..count).map(|i| (0..count).filter(|&j| j != i).collect()).collect())
    }

    /// Declare `a` and `b` as neighbors of each other.
    pub fn connect(&mut self, a: usize, b: usize) {
        if a == b || a >= self.len() || b >= self.len() {
            return;
        }
        if !self.neighbors[a].contains(&b) {
            self.neighbors[a].push(b);
        }
        if !self.neighbors[b].contains(&a) {
            self.neighbors[b].push(a);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    #[must_use]
    pub fn neighbors(&self, piece: usize) -> &[usize] {
        self.neighbors.get(piece).map_or(&[], Vec::as_slice)
    }

    /// Declared neighbors whose translations are within `tolerance`.
    #[must_use]
    pub fn are_snapped(&self, a: usize, b: usize, translations: &[Point], tolerance: f64) -> bool {
        if !self.neighbors(a).contains(&b) {
            return false;
        }
        let (Some(&ta), Some(&tb)) = (translations.get(a), translations.get(b)) else {
            return false;
        };
        ta.distance_to(tb) <= tolerance
    }

    /// Snapped component containing `start`, in breadth-first order.
    #[must_use]
    pub fn connected_group(&self, start: usize, translations: &[Point], tolerance: f64) -> Vec<usize> {
        if start >= self.len() {
            return Vec::new();
        }
        let mut visited = vec![false; self.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &next in self.neighbors(current) {
                if !visited[next] && self.are_snapped(current, next, translations, tolerance) {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        order
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Pieces with translations, a snap graph, and a display scale.
#[derive(Debug, Clone)]
pub struct PuzzleBoard {
    pub graph: SnapGraph,
    translations: Vec<Point>,
    scale: f64,
    tolerance_px: f64,
}

/// An in-progress group drag. `starts[i]` is `members[i]`'s translation at pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDrag {
    pub leader: usize,
    pub members: Vec<usize>,
    starts: Vec<Point>,
}

impl PuzzleBoard {
    /// Translations are offsets from each piece's home position; a short
    /// list is padded with the origin.
    #[must_use]
    pub fn new(graph: SnapGraph, mut translations: Vec<Point>) -> Self {
        translations.resize(graph.len(), Point::default());
        Self { graph, translations, scale: 1.0, tolerance_px: DEFAULT_SNAP_TOLERANCE_PX }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        if scale > 0.0 {
            self.scale = scale;
        }
        self
    }

    #[must_use]
    pub fn with_tolerance_px(mut self, tolerance_px: f64) -> Self {
        self.tolerance_px = tolerance_px;
        self
    }

    /// Tolerance in board units.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance_px / self.scale
    }

    #[must_use]
    pub fn translation(&self, piece: usize) -> Option<Point> {
        self.translations.get(piece).copied()
    }

    #[must_use]
    pub fn translations(&self) -> &[Point] {
        &self.translations
    }

    #[must_use]
    pub fn is_snapped(&self, a: usize, b: usize) -> bool {
        self.graph.are_snapped(a, b, &self.translations, self.tolerance())
    }

    /// Pick up `leader` and its snapped component.
    #[must_use]
    pub fn begin_drag(&self, leader: usize) -> Option<GroupDrag> {
        let members = self.graph.connected_group(leader, &self.translations, self.tolerance());
        if members.is_empty() {
            return None;
        }
        let starts = members.iter().map(|&m| self.translations[m]).collect();
        Some(GroupDrag { leader, members, starts })
    }

    /// Move the leader to `leader_at` and every member by the same delta.
    pub fn drag_to(&mut self, drag: &GroupDrag, leader_at: Point) {
        let Some(&leader_start) = drag.starts.first() else {
            return;
        };
        let dx = leader_at.x - leader_start.x;
        let dy = leader_at.y - leader_start.y;
        for (&member, &start) in drag.members.iter().zip(&drag.starts) {
            if let Some(slot) = self.translations.get_mut(member) {
                *slot = start.offset(dx, dy);
            }
        }
    }

    /// Release the group. Returns each member's committed translation.
    pub fn end_drag(&mut self, drag: GroupDrag) -> Vec<(usize, Point)> {
        drag.members
            .into_iter()
            .map(|member| (member, self.auto_align(member)))
            .collect()
    }

    /// Put the pieces back where the drag found them.
    pub fn cancel_drag(&mut self, drag: GroupDrag) {
        for (member, start) in drag.members.into_iter().zip(drag.starts) {
            if let Some(slot) = self.translations.get_mut(member) {
                *slot = start;
            }
        }
    }

    /// Align `piece` exactly onto its first snapped neighbor, if any.
    pub fn auto_align(&mut self, piece: usize) -> Point {
        let Some(current) = self.translation(piece) else {
            return Point::default();
        };
        let target = self
            .graph
            .neighbors(piece)
            .iter()
            .find(|&&n| self.is_snapped(piece, n))
            .and_then(|&n| self.translation(n));
        match target {
            Some(aligned) => {
                self.translations[piece] = aligned;
                aligned
            }
            None => current,
        }
    }
}
