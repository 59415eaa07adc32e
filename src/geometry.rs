//! Geometric primitives for on-screen controller layout.
//!
//! Pixel coordinates with the origin at the top-left of the window. Offsets
//! may be negative, so everything is signed. Arithmetic saturates at the
//! `i32` limits instead of wrapping.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// Vector from `other` to `self`.
    #[inline]
    pub const fn minus(&self, other: Point) -> Point {
        Point::new(self.x.saturating_sub(other.x), self.y.saturating_sub(other.y))
    }

    /// Squared distance, to compare without a square root. Saturates at
    /// `i64::MAX` for points near opposite corners of the `i32` plane.
    pub fn distance_sq(&self, other: Point) -> i64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }
}

fn saturate(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    #[inline]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub const fn square(side: i32) -> Self {
        Self::new(side, side)
    }
}

/// A rectangle used for layout bounds and hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge (inclusive).
    pub x: i32,
    /// Top edge (inclusive).
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of `size` whose center is `center`.
    pub const fn from_center(center: Point, size: Size) -> Self {
        Self::new(
            center.x.saturating_sub(size.width / 2),
            center.y.saturating_sub(size.height / 2),
            size.width,
            size.height,
        )
    }

    /// Right edge (exclusive).
    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Size is non-negative and both far edges fit in `i32`.
    pub const fn is_well_formed(&self) -> bool {
        self.width >= 0
            && self.height >= 0
            && self.x.checked_add(self.width).is_some()
            && self.y.checked_add(self.height).is_some()
    }

    #[inline]
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub const fn center(&self) -> Point {
        Point::new(
            self.x.saturating_add(self.width / 2),
            self.y.saturating_add(self.height / 2),
        )
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    #[inline]
    pub const fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Nearest point to `p` within the rectangle, far edges included.
    pub fn clamp_point(&self, p: Point) -> Point {
        Point::new(
            p.x.clamp(self.x, self.right().max(self.x)),
            p.y.clamp(self.y, self.bottom().max(self.y)),
        )
    }

    /// Grow by `dx` on the left and right and `dy` on the top and bottom.
    pub const fn expand(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.x.saturating_sub(dx),
            self.y.saturating_sub(dy),
            self.width.saturating_add(dx.saturating_mul(2)),
            self.height.saturating_add(dy.saturating_mul(2)),
        )
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    pub fn intersection_opt(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        if x < right && y < bottom {
            Some(Rect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y)))
        } else {
            None
        }
    }

    /// Shift the rectangle the least distance that puts it inside `bounds`.
    /// A rectangle larger than `bounds` is aligned to its top-left edge.
    pub fn clamp_inside(&self, bounds: &Rect) -> Rect {
        let x = self.x.min(bounds.right().saturating_sub(self.width)).max(bounds.x);
        let y = self.y.min(bounds.bottom().saturating_sub(self.height)).max(bounds.y);
        Rect::new(x, y, self.width, self.height)
    }
}

/// Nine reference points of a window that element positions are relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::Top,
        Anchor::TopRight,
        Anchor::Left,
        Anchor::Center,
        Anchor::Right,
        Anchor::BottomLeft,
        Anchor::Bottom,
        Anchor::BottomRight,
    ];

    /// Location of this anchor on `rect`.
    pub fn point_in(self, rect: &Rect) -> Point {
        let (fx, fy) = match self {
            Anchor::TopLeft => (0, 0),
            Anchor::Top => (1, 0),
            Anchor::TopRight => (2, 0),
            Anchor::Left => (0, 1),
            Anchor::Center => (1, 1),
            Anchor::Right => (2, 1),
            Anchor::BottomLeft => (0, 2),
            Anchor::Bottom => (1, 2),
            Anchor::BottomRight => (2, 2),
        };
        Point::new(
            saturate(i64::from(rect.x) + i64::from(rect.width) * fx / 2),
            saturate(i64::from(rect.y) + i64::from(rect.height) * fy / 2),
        )
    }

    /// Anchor of `rect` closest to `p`. Ties go to the earlier anchor in
    /// [`Anchor::ALL`].
    pub fn nearest(rect: &Rect, p: Point) -> Anchor {
        let mut best = Anchor::TopLeft;
        let mut best_dist = i64::MAX;
        for anchor in Anchor::ALL {
            let dist = anchor.point_in(rect).distance_sq(p);
            if dist < best_dist {
                best = anchor;
                best_dist = dist;
            }
        }
        best
    }
}

/// Converts physical lengths to pixels.
pub trait Density {
    fn mm_to_px(&self, mm: f64) -> i32;
}

/// Fixed dots-per-inch density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dpi(pub f64);

impl Default for Dpi {
    fn default() -> Self {
        Dpi(160.0)
    }
}

impl Density for Dpi {
    fn mm_to_px(&self, mm: f64) -> i32 {
        (mm / 25.4 * self.0).round() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_edges_and_center() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.right(), 40);
        assert_eq!(r.bottom(), 60);
        assert_eq!(r.center(), Point::new(25, 40));
        assert_eq!(Rect::from_center(Point::new(25, 40), Size::new(30, 40)), r);
        assert!(r.contains(Point::new(10, 20)));
        assert!(!r.contains(Point::new(40, 20)));
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 5, 10, 10);
        assert_eq!(a.union(&b), Rect::new(0, 0, 30, 15));
        assert_eq!(Rect::default().union(&b), b);
    }

    #[test]
    fn test_expand_and_clamp() {
        let r = Rect::new(0, 0, 10, 10).expand(2, 3);
        assert_eq!(r, Rect::new(-2, -3, 14, 16));

        let bounds = Rect::new(0, 0, 100, 50);
        assert_eq!(
            Rect::new(-5, 45, 10, 10).clamp_inside(&bounds),
            Rect::new(0, 40, 10, 10)
        );
        assert_eq!(
            Rect::new(95, -3, 10, 10).clamp_inside(&bounds),
            Rect::new(90, 0, 10, 10)
        );
    }

    #[test]
    fn test_anchor_points_and_nearest() {
        let window = Rect::new(0, 0, 800, 480);
        assert_eq!(Anchor::Center.point_in(&window), Point::new(400, 240));
        assert_eq!(Anchor::BottomRight.point_in(&window), Point::new(800, 480));
        assert_eq!(Anchor::nearest(&window, Point::new(700, 450)), Anchor::BottomRight);
        assert_eq!(Anchor::nearest(&window, Point::new(380, 10)), Anchor::Top);
        assert_eq!(Anchor::nearest(&window, Point::new(90, 250)), Anchor::Left);
    }

    #[test]
    fn test_extreme_points_do_not_overflow() {
        let far = Point::new(i32::MIN, i32::MIN);
        let near = Point::new(i32::MAX, i32::MAX);
        assert_eq!(far.distance_sq(near), i64::MAX);
        assert_eq!(Point::new(i32::MIN, 0).distance_sq(Point::new(0, 0)), 1i64 << 62);
        assert_eq!(far.minus(near), Point::new(i32::MIN, i32::MIN));
        assert_eq!(near.offset(1, -1), Point::new(i32::MAX, i32::MAX - 1));
        assert_eq!(
            Rect::from_center(Point::new(i32::MIN, 0), Size::square(10)).x,
            i32::MIN
        );

        let window = Rect::new(0, 0, 800, 480);
        assert_eq!(Anchor::nearest(&window, Point::new(i32::MIN, 0)), Anchor::TopLeft);
        assert_eq!(Anchor::nearest(&window, near), Anchor::BottomRight);

        let huge = Rect::new(i32::MAX - 10, 0, i32::MAX, 10);
        assert_eq!(Anchor::BottomRight.point_in(&huge).x, i32::MAX);
        assert_eq!(huge.right(), i32::MAX);
    }

    #[test]
    fn test_clamp_point_and_well_formed() {
        let r = Rect::new(10, 20, 30, 40);
        assert_eq!(r.clamp_point(Point::new(i32::MIN, i32::MAX)), Point::new(10, 60));
        assert_eq!(r.clamp_point(Point::new(15, 25)), Point::new(15, 25));

        assert!(r.is_well_formed());
        assert!(Rect::default().is_well_formed());
        assert!(!Rect::new(0, 0, -1, 10).is_well_formed());
        assert!(!Rect::new(i32::MAX, 0, 1, 10).is_well_formed());
        assert!(!Rect::new(0, 1, 10, i32::MAX).is_well_formed());
    }

    #[test]
    fn test_dpi_conversion() {
        let dpi = Dpi(254.0);
        assert_eq!(dpi.mm_to_px(10.0), 100);
        assert_eq!(dpi.mm_to_px(0.0), 0);
    }
}
