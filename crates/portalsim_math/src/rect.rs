//! Axis-aligned 2D rectangles
//!
//! Used for portal-plane work: hole bounds, wall footprints and cutting a
//! hole out of a wall.

use serde::{Serialize, Deserialize};

/// Rectangle in a plane's local (u, v) coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min_u: f32,
    pub min_v: f32,
    pub max_u: f32,
    pub max_v: f32,
}

impl Rect {
    pub fn new(min_u: f32, min_v: f32, max_u: f32, max_v: f32) -> Self {
        Self {
            min_u: min_u.min(max_u),
            min_v: min_v.min(max_v),
            max_u: min_u.max(max_u),
            max_v: min_v.max(max_v),
        }
    }

    /// Rectangle centered at (u, v)
    pub fn from_center_half(u: f32, v: f32, half_u: f32, half_v: f32) -> Self {
        Self::new(u - half_u, v - half_v, u + half_u, v + half_v)
    }

    pub fn width(&self) -> f32 {
        self.max_u - self.min_u
    }

    pub fn height(&self) -> f32 {
        self.max_v - self.min_v
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.min_u + self.max_u) * 0.5, (self.min_v + self.max_v) * 0.5)
    }

    /// True if the rectangle has no area
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Point containment (edges included)
    pub fn contains(&self, u: f32, v: f32) -> bool {
        u >= self.min_u && u <= self.max_u && v >= self.min_v && v <= self.max_v
    }

    /// True if `other` lies entirely inside this rectangle
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.min_u >= self.min_u
            && other.max_u <= self.max_u
            && other.min_v >= self.min_v
            && other.max_v <= self.max_v
    }

    /// Overlap with positive area
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_u < other.max_u
            && self.max_u > other.min_u
            && self.min_v < other.max_v
            && self.max_v > other.min_v
    }

    /// The overlapping region, if any
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect {
            min_u: self.min_u.max(other.min_u),
            min_v: self.min_v.max(other.min_v),
            max_u: self.max_u.min(other.max_u),
            max_v: self.max_v.min(other.max_v),
        })
    }

    /// This rectangle minus `hole`, as up to four non-overlapping pieces
    ///
    /// Pieces come out in a fixed order: the full-width bands below and above
    /// the hole, then the left and right pieces beside it.
    pub fn subtract(&self, hole: &Rect) -> Vec<Rect> {
        let Some(cut) = self.intersection(hole) else {
            return vec![*self];
        };

        let pieces = [
            Rect { min_u: self.min_u, min_v: self.min_v, max_u: self.max_u, max_v: cut.min_v },
            Rect { min_u: self.min_u, min_v: cut.max_v, max_u: self.max_u, max_v: self.max_v },
            Rect { min_u: self.min_u, min_v: cut.min_v, max_u: cut.min_u, max_v: cut.max_v },
            Rect { min_u: cut.max_u, min_v: cut.min_v, max_u: self.max_u, max_v: cut.max_v },
        ];
        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }

    /// Grow by `amount` on every side
    pub fn expanded(&self, amount: f32) -> Self {
        Self::new(self.min_u - amount, self.min_v - amount, self.max_u + amount, self.max_v + amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(rects: &[Rect]) -> f32 {
        rects.iter().map(|r| r.width() * r.height()).sum()
    }

    #[test]
    fn test_new_orders_corners() {
        let r = Rect::new(2.0, 3.0, -2.0, -3.0);
        assert_eq!(r, Rect { min_u: -2.0, min_v: -3.0, max_u: 2.0, max_v: 3.0 });
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 0.0, 1.0, 1.0);
        let b = Rect::new(1.0, 0.0, 2.0, 1.0);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_subtract_centered_hole() {
        let wall = Rect::from_center_half(0.0, 0.0, 100.0, 100.0);
        let hole = Rect::from_center_half(0.0, 0.0, 32.0, 54.0);
        let pieces = wall.subtract(&hole);
        assert_eq!(pieces.len(), 4);
        let expected = 200.0 * 200.0 - 64.0 * 108.0;
        assert!((area(&pieces) - expected).abs() < 0.01);
        for p in &pieces {
            assert!(!p.intersects(&hole));
        }
    }

    #[test]
    fn test_subtract_hole_at_edge() {
        let wall = Rect::new(0.0, 0.0, 100.0, 100.0);
        let hole = Rect::new(-10.0, 20.0, 30.0, 60.0);
        let pieces = wall.subtract(&hole);
        // No left piece
        assert_eq!(pieces.len(), 3);
        assert!((area(&pieces) - (10000.0 - 30.0 * 40.0)).abs() < 0.01);
    }

    #[test]
    fn test_subtract_disjoint_hole() {
        let wall = Rect::new(0.0, 0.0, 10.0, 10.0);
        let hole = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(wall.subtract(&hole), vec![wall]);
    }

    #[test]
    fn test_contains_rect() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(outer.contains_rect(&Rect::new(1.0, 1.0, 9.0, 9.0)));
        assert!(!outer.contains_rect(&Rect::new(-1.0, 1.0, 9.0, 9.0)));
    }
}
