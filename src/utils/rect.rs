use std::cmp;

use serde::{Deserialize, Serialize};

/// A pixel rectangle, with top-left corner at `(x, y)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    #[inline]
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Rect { x, y, w, h }
    }

    /// Creates a rectangle that starts at the origin.
    #[inline]
    pub fn with_size(w: u32, h: u32) -> Self {
        Rect { x: 0, y: 0, w, h }
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.w) * u64::from(self.h)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Returns the smallest rectangle containing both `self` and `rhs`. Empty
    /// rectangles do not contribute.
    pub fn union(&self, rhs: &Self) -> Self {
        if self.is_empty() {
            return *rhs;
        }

        if rhs.is_empty() {
            return *self;
        }

        let x = cmp::min(self.x, rhs.x);
        let y = cmp::min(self.y, rhs.y);
        let right = cmp::max(self.right(), rhs.right());
        let bottom = cmp::max(self.bottom(), rhs.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Returns the overlapping area of two rectangles, or an empty one.
    pub fn intersect(&self, rhs: &Self) -> Self {
        let x = cmp::max(self.x, rhs.x);
        let y = cmp::max(self.y, rhs.y);
        let right = cmp::min(self.right(), rhs.right());
        let bottom = cmp::min(self.bottom(), rhs.bottom());

        if right <= x || bottom <= y {
            Rect::default()
        } else {
            Rect::new(x, y, right - x, bottom - y)
        }
    }

    /// Returns true if `rhs` lies completely inside of `self`.
    #[inline]
    pub fn contains(&self, rhs: &Self) -> bool {
        rhs.x >= self.x && rhs.y >= self.y && rhs.right() <= self.right()
            && rhs.bottom() <= self.bottom()
    }
}
