use crate::bbox::BBox;
use crate::circular_queue::CircularQueue;
use nalgebra as na;

/// Share of the old box kept on every matched update, in tenths
const SMOOTH_KEEP: i64 = 7;

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub bbox: BBox,

    // frames this track has been matched in
    pub hits: u32,

    // consecutive frames since the last match
    pub age: u32,

    trail: CircularQueue<na::Point2<i32>>,
}

impl Track {
    pub(crate) fn new(id: u32, bbox: BBox, trail_len: usize) -> Self {
        let mut trail = CircularQueue::with_capacity(trail_len);
        trail.push(bbox.center());

        Self {
            id,
            bbox,
            hits: 1,
            age: 0,
            trail,
        }
    }

    pub(crate) fn update(&mut self, det: &BBox) {
        self.bbox = self.bbox.blend(det, SMOOTH_KEEP);
        self.hits += 1;
        self.age = 0;
        self.trail.push(self.bbox.center());
    }

    #[inline]
    pub fn is_confirmed(&self, min_hits: u32) -> bool {
        self.hits >= min_hits
    }

    /// Recent centers, oldest first
    #[inline]
    pub fn trail(&self) -> impl Iterator<Item = &'_ na::Point2<i32>> {
        self.trail.asc_iter()
    }

    #[inline]
    pub fn last_center(&self) -> Option<&na::Point2<i32>> {
        self.trail.latest()
    }
}
