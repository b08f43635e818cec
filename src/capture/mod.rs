use std::time::{Duration, Instant};

use ndarray::{s, Array2};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::error::Error;
use crate::frame::Frame;

#[cfg(feature = "opencv")]
mod camera;

#[cfg(feature = "opencv")]
pub use camera::Camera;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_index: i32,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1280,
            height: 720,
            fps: 60.0,
        }
    }
}

/// Producer of grayscale frames
pub trait FrameSource {
    /// Next frame, `Ok(None)` once the stream has ended
    fn read(&mut self) -> Result<Option<Frame>, Error>;

    /// Releases the underlying device; called once when the owning loop stops
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        (**self).read()
    }

    #[inline]
    fn release(&mut self) {
        (**self).release()
    }
}

#[derive(Debug, Clone, Copy)]
struct MovingRect {
    bbox: BBox,
    dx: i32,
    dy: i32,
}

/// Deterministic frames with bright rectangles moving over a dark background
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: usize,
    height: usize,
    objects: Vec<MovingRect>,
    limit: Option<u64>,
    interval: Option<Duration>,
    last_read: Option<Instant>,
    next_id: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            objects: Vec::new(),
            limit: None,
            interval: None,
            last_read: None,
            next_id: 0,
        }
    }

    /// Adds a rectangle moving by `(dx, dy)` pixels per frame
    pub fn with_object(mut self, bbox: BBox, dx: i32, dy: i32) -> Self {
        self.objects.push(MovingRect { bbox, dx, dy });
        self
    }

    /// Ends the stream after `frames` frames
    pub fn limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Makes `read` block like a camera running at `fps`
    pub fn paced(mut self, fps: f64) -> Self {
        self.interval = (fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        self
    }

    fn wait_next(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_read) {
            if let Some(left) = interval.checked_sub(last.elapsed()) {
                std::thread::sleep(left);
            }
        }

        self.last_read = Some(Instant::now());
    }

    fn render(&self, idx: u64) -> Array2<u8> {
        let mut image = Array2::zeros((self.height, self.width));
        let (w, h) = (self.width as i32, self.height as i32);

        for o in &self.objects {
            let shift = idx as i32;
            let l = (o.bbox.left() + o.dx * shift).clamp(0, w);
            let r = (o.bbox.right() + o.dx * shift).clamp(0, w);
            let t = (o.bbox.top() + o.dy * shift).clamp(0, h);
            let b = (o.bbox.bottom() + o.dy * shift).clamp(0, h);

            if l < r && t < b {
                image
                    .slice_mut(s![t as usize..b as usize, l as usize..r as usize])
                    .fill(255);
            }
        }

        image
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        if matches!(self.limit, Some(limit) if self.next_id >= limit) {
            return Ok(None);
        }

        self.wait_next();

        let id = self.next_id;
        self.next_id += 1;

        Ok(Some(Frame::new(id, self.render(id))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frames_move_and_end() {
        let mut source = SyntheticSource::new(64, 48)
            .with_object(BBox::ltwh(0, 10, 8, 8), 4, 0)
            .limit(2);

        let f0 = source.read().unwrap().unwrap();
        assert_eq!(f0.id, 0);
        assert_eq!(f0.dims(), (64, 48));
        assert_eq!(f0.image[[10, 0]], 255);
        assert_eq!(f0.image[[10, 8]], 0);

        let f1 = source.read().unwrap().unwrap();
        assert_eq!(f1.id, 1);
        assert_eq!(f1.image[[10, 0]], 0);
        assert_eq!(f1.image[[10, 11]], 255);

        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn objects_leaving_the_frame_are_clipped() {
        let mut source = SyntheticSource::new(16, 16).with_object(BBox::ltwh(12, 0, 8, 8), 10, 0);

        let f0 = source.read().unwrap().unwrap();
        assert_eq!(f0.image.iter().filter(|&&p| p > 0).count(), 4 * 8);

        let f1 = source.read().unwrap().unwrap();
        assert!(f1.image.iter().all(|&p| p == 0));
    }
}
