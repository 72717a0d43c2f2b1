//! Selection handling for the crop step.
//!
//! A selection is dragged over the *displayed* image, so every coordinate
//! here is in display space. Mapping to native pixels happens in
//! [`crate::encoding::extract_region`].

use serde::{Deserialize, Serialize};

/// Minimum size (in display pixels) on both axes for a selection to count.
///
/// Anything at or below this on either axis routes to full-image restoration.
pub const MIN_SELECTION_SIZE: f32 = 10.0;

/// A point in display coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Input device that produced a pointer sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerDevice {
    Mouse,
    Touch,
}

/// A raw pointer position as reported by the front-end, in client space.
///
/// For touch input the front-end reports the first touch point only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub device: PointerDevice,
    pub client: Point,
}

impl PointerSample {
    pub fn mouse(x: f32, y: f32) -> Self {
        Self { device: PointerDevice::Mouse, client: Point::new(x, y) }
    }

    pub fn touch(x: f32, y: f32) -> Self {
        Self { device: PointerDevice::Touch, client: Point::new(x, y) }
    }

    /// Converts the sample to a position relative to the top-left corner of
    /// the image display surface. The device makes no difference.
    pub fn local_to(&self, surface_origin: Point) -> Point {
        Point::new(
            self.client.x - surface_origin.x,
            self.client.y - surface_origin.y,
        )
    }
}

/// Axis-aligned selection rectangle in display coordinates.
///
/// `width` and `height` are never negative. The rectangle is not clamped to
/// the image and may extend past its edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl SelectionRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Normalizes two corners into a rectangle with positive width/height.
    ///
    /// Users can drag in any direction, so either point may be the
    /// top-left corner.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    /// A zero-size rectangle at `point`.
    pub fn at(point: Point) -> Self {
        Self::new(point.x, point.y, 0.0, 0.0)
    }

    /// True when the rectangle is too small to be treated as a selection.
    pub fn is_degenerate(&self) -> bool {
        self.width <= MIN_SELECTION_SIZE || self.height <= MIN_SELECTION_SIZE
    }
}

/// Tracks the drag gesture that produces a [`SelectionRect`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionTracker {
    anchor: Option<Point>,
    rect: SelectionRect,
    dragging: bool,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new drag at `pos`, replacing any previous selection.
    pub fn begin(&mut self, pos: Point) {
        self.anchor = Some(pos);
        self.rect = SelectionRect::at(pos);
        self.dragging = true;
    }

    /// Stretches the rectangle between the anchor and `pos`.
    ///
    /// Returns false (and does nothing) unless a drag is active.
    pub fn update(&mut self, pos: Point) -> bool {
        match (self.dragging, self.anchor) {
            (true, Some(anchor)) => {
                self.rect = SelectionRect::from_corners(anchor, pos);
                true
            }
            _ => false,
        }
    }

    /// Ends the drag. The rectangle is kept as-is.
    pub fn end(&mut self) {
        self.dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn rect(&self) -> SelectionRect {
        self.rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag(points: &[(f32, f32)]) -> Vec<SelectionRect> {
        let mut tracker = SelectionTracker::new();
        let (first, rest) = points.split_first().unwrap();
        tracker.begin(Point::new(first.0, first.1));
        let mut seen = vec![tracker.rect()];
        for &(x, y) in rest {
            assert!(tracker.update(Point::new(x, y)));
            seen.push(tracker.rect());
        }
        tracker.end();
        seen
    }

    #[test]
    fn begin_gives_zero_size_rect_at_anchor() {
        let rects = drag(&[(12.0, 34.0)]);
        assert_eq!(rects[0], SelectionRect::new(12.0, 34.0, 0.0, 0.0));
    }

    #[test]
    fn drag_in_every_direction_keeps_min_corner_and_abs_size() {
        let anchor = (50.0, 50.0);
        let targets = [(80.0, 90.0), (10.0, 20.0), (70.0, 5.0), (0.0, 95.5)];

        for (tx, ty) in targets {
            let rects = drag(&[anchor, (tx, ty)]);
            let rect = rects[1];
            assert_eq!(rect.x, anchor.0.min(tx));
            assert_eq!(rect.y, anchor.1.min(ty));
            assert_eq!(rect.width, (tx - anchor.0).abs());
            assert_eq!(rect.height, (ty - anchor.1).abs());
        }
    }

    #[test]
    fn size_never_negative_during_a_wandering_drag() {
        let path = [
            (30.0, 30.0),
            (40.0, 10.0),
            (-5.0, 12.0),
            (29.0, 31.0),
            (30.0, 30.0),
            (120.0, -40.0),
        ];
        for rect in drag(&path) {
            assert!(rect.width >= 0.0);
            assert!(rect.height >= 0.0);
        }
    }

    #[test]
    fn update_without_begin_is_ignored() {
        let mut tracker = SelectionTracker::new();
        assert!(!tracker.update(Point::new(40.0, 40.0)));
        assert_eq!(tracker.rect(), SelectionRect::default());
    }

    #[test]
    fn rect_survives_end_and_later_moves() {
        let mut tracker = SelectionTracker::new();
        tracker.begin(Point::new(10.0, 10.0));
        tracker.update(Point::new(50.0, 50.0));
        tracker.end();

        assert!(!tracker.is_dragging());
        assert!(!tracker.update(Point::new(90.0, 90.0)));
        assert_eq!(tracker.rect(), SelectionRect::new(10.0, 10.0, 40.0, 40.0));
    }

    #[test]
    fn degenerate_threshold_is_inclusive() {
        assert!(SelectionRect::new(0.0, 0.0, 10.0, 50.0).is_degenerate());
        assert!(SelectionRect::new(0.0, 0.0, 50.0, 10.0).is_degenerate());
        assert!(SelectionRect::default().is_degenerate());
        assert!(!SelectionRect::new(0.0, 0.0, 10.5, 11.0).is_degenerate());
    }

    #[test]
    fn mouse_and_touch_map_to_the_same_local_point() {
        let origin = Point::new(100.0, 40.0);
        let mouse = PointerSample::mouse(130.0, 95.0).local_to(origin);
        let touch = PointerSample::touch(130.0, 95.0).local_to(origin);
        assert_eq!(mouse, Point::new(30.0, 55.0));
        assert_eq!(mouse, touch);
    }
}
