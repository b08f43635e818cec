use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::track::Track;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// minimal iou between a track and a detection to count as a match
    pub match_iou: f32,
    /// unmatched frames a track survives
    pub max_age: u32,
    /// matched frames needed before a track is reported
    pub min_hits: u32,
    pub trail_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_iou: 0.3,
            max_age: 20,
            min_hits: 6,
            trail_len: 24,
        }
    }
}

/// Greedy IOU tracker.
///
/// Tracks are matched in creation order, each one taking the free detection it
/// overlaps most. This is `O(tracks * detections)` and deterministic; it is not
/// a globally optimal assignment.
#[derive(Debug)]
pub struct TrackManager {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Every active track, tentative ones included, in creation order
    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &'_ Track> {
        let min_hits = self.config.min_hits;
        self.tracks.iter().filter(move |t| t.is_confirmed(min_hits))
    }

    fn spawn(&mut self, det: &BBox) {
        let id = self.next_id;
        self.next_id += 1;

        tracing::debug!(id, ?det, "new track");
        self.tracks.push(Track::new(id, *det, self.config.trail_len));
    }

    /// Runs one frame of association and returns the confirmed tracks.
    pub fn step(&mut self, detections: &[BBox]) -> Vec<&Track> {
        for t in &mut self.tracks {
            t.age += 1;
        }

        let mut matched = vec![false; detections.len()];

        for t in &mut self.tracks {
            let mut best: Option<(usize, f32)> = None;

            for (j, det) in detections.iter().enumerate() {
                if matched[j] {
                    continue;
                }

                let iou = t.bbox.iou(det);
                if iou > best.map_or(0.0, |(_, b)| b) {
                    best = Some((j, iou));
                }
            }

            if let Some((j, iou)) = best {
                if iou >= self.config.match_iou {
                    matched[j] = true;
                    t.update(&detections[j]);
                }
            }
        }

        for (det, _) in detections.iter().zip(matched).filter(|(_, m)| !m) {
            self.spawn(det);
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| {
            if t.age > max_age {
                tracing::debug!(id = t.id, hits = t.hits, "track lost");
                return false;
            }
            true
        });

        self.confirmed().collect()
    }

    /// Drops every track and restarts the id sequence
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl crate::Tracking for TrackManager {
    #[inline]
    fn step(&mut self, detections: &[BBox]) -> Vec<&Track> {
        TrackManager::step(self, detections)
    }

    #[inline]
    fn reset(&mut self) {
        TrackManager::reset(self)
    }
}
