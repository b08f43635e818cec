use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

/// Left-top-width-height box in frame pixels.
///
/// Boxes are values: every pipeline stage that changes geometry produces a new
/// `BBox` instead of mutating the one it was given.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BBox {
    #[inline]
    pub fn ltwh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Builds a box from its left-top and right-bottom corners (right/bottom exclusive)
    #[inline]
    pub fn ltrb(l: i32, t: i32, r: i32, b: i32) -> Self {
        Self {
            x: l,
            y: t,
            w: r - l,
            h: b - t,
        }
    }

    #[inline(always)]
    pub fn left(&self) -> i32 {
        self.x
    }

    #[inline(always)]
    pub fn top(&self) -> i32 {
        self.y
    }

    #[inline(always)]
    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    #[inline(always)]
    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.w
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.h
    }

    #[inline]
    pub fn as_ltrb(&self) -> [i32; 4] {
        [self.left(), self.top(), self.right(), self.bottom()]
    }

    #[inline]
    pub fn area(&self) -> i64 {
        self.w as i64 * self.h as i64
    }

    #[inline]
    pub fn center(&self) -> na::Point2<i32> {
        na::Point2::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.w as f32 / self.h as f32
    }

    pub fn intersection_area(&self, other: &BBox) -> i64 {
        let iw = (self.right().min(other.right()) - self.left().max(other.left())).max(0);
        let ih = (self.bottom().min(other.bottom()) - self.top().max(other.top())).max(0);

        iw as i64 * ih as i64
    }

    /// Intersection over union, `0.0` when the union is empty
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;

        if union > 0 {
            (inter as f64 / union as f64) as f32
        } else {
            0.0
        }
    }

    /// Smallest box containing both `self` and `other`
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::ltrb(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    /// Weighted blend `keep/10 * self + (10 - keep)/10 * next` per coordinate.
    ///
    /// Done in integer tenths so the result truncates exactly like the real
    /// valued formula would.
    pub fn blend(&self, next: &BBox, keep: i64) -> BBox {
        let mix = |a: i32, b: i32| ((keep * a as i64 + (10 - keep) * b as i64) / 10) as i32;

        BBox {
            x: mix(self.x, next.x),
            y: mix(self.y, next.y),
            w: mix(self.w, next.w),
            h: mix(self.h, next.h),
        }
    }
}

impl From<BBox> for [i32; 4] {
    fn from(bbox: BBox) -> Self {
        [bbox.x, bbox.y, bbox.w, bbox.h]
    }
}

impl From<[i32; 4]> for BBox {
    fn from(v: [i32; 4]) -> Self {
        BBox::ltwh(v[0], v[1], v[2], v[3])
    }
}
