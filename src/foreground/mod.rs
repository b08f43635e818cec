use ndarray::{Array2, Zip};
use serde_derive::{Deserialize, Serialize};

use crate::error::Error;
use crate::frame::Frame;

#[cfg(feature = "opencv")]
mod mog2;

#[cfg(feature = "opencv")]
pub use mog2::{Mog2, Mog2Settings};

/// Binary occupancy mask, same shape as the frame; non-zero is foreground
pub type Mask = Array2<u8>;

pub const FOREGROUND: u8 = 255;

/// Background model producing a foreground mask per frame
pub trait BackgroundModel {
    fn apply(&mut self, frame: &Frame) -> Result<Mask, Error>;
    fn reset(&mut self);
}

impl<B: BackgroundModel + ?Sized> BackgroundModel for Box<B> {
    #[inline]
    fn apply(&mut self, frame: &Frame) -> Result<Mask, Error> {
        (**self).apply(frame)
    }

    #[inline]
    fn reset(&mut self) {
        (**self).reset()
    }
}

fn threshold_diff(image: &Array2<u8>, reference: &Array2<u8>, threshold: u8) -> Mask {
    let mut mask = Mask::zeros(image.dim());

    Zip::from(&mut mask)
        .and(image)
        .and(reference)
        .for_each(|m, &a, &b| {
            if a.abs_diff(b) > threshold {
                *m = FOREGROUND;
            }
        });

    mask
}

/// Thresholded absolute difference against the previous frame
#[derive(Debug, Clone)]
pub struct FrameDifference {
    threshold: u8,
    prev: Option<Array2<u8>>,
}

impl FrameDifference {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            prev: None,
        }
    }
}

impl Default for FrameDifference {
    fn default() -> Self {
        Self::new(25)
    }
}

impl BackgroundModel for FrameDifference {
    fn apply(&mut self, frame: &Frame) -> Result<Mask, Error> {
        let mask = match &self.prev {
            Some(prev) if prev.dim() == frame.image.dim() => {
                threshold_diff(&frame.image, prev, self.threshold)
            }
            _ => Mask::zeros(frame.image.dim()),
        };

        self.prev = Some(frame.image.clone());

        Ok(mask)
    }

    fn reset(&mut self) {
        self.prev = None;
    }
}

/// Thresholded absolute difference against a fixed background frame.
///
/// The first frame after construction or [`reset`](BackgroundModel::reset)
/// becomes the background.
#[derive(Debug, Clone)]
pub struct ReferenceFrame {
    threshold: u8,
    background: Option<Array2<u8>>,
}

impl ReferenceFrame {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold,
            background: None,
        }
    }

    pub fn with_background(threshold: u8, background: Array2<u8>) -> Self {
        Self {
            threshold,
            background: Some(background),
        }
    }
}

impl Default for ReferenceFrame {
    fn default() -> Self {
        Self::new(25)
    }
}

impl BackgroundModel for ReferenceFrame {
    fn apply(&mut self, frame: &Frame) -> Result<Mask, Error> {
        match &self.background {
            Some(bg) if bg.dim() == frame.image.dim() => {
                Ok(threshold_diff(&frame.image, bg, self.threshold))
            }
            _ => {
                self.background = Some(frame.image.clone());
                Ok(Mask::zeros(frame.image.dim()))
            }
        }
    }

    fn reset(&mut self) {
        self.background = None;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Reference,
    Difference,
    /// OpenCV MOG2, needs the `opencv` feature
    Mog2,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ForegroundConfig {
    pub model: ModelKind,
    /// per pixel difference above which a pixel is foreground
    pub threshold: u8,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Difference,
            threshold: 25,
        }
    }
}

/// Instantiates the configured background model
pub fn build_model(config: &ForegroundConfig) -> Result<Box<dyn BackgroundModel + Send>, Error> {
    match config.model {
        ModelKind::Reference => Ok(Box::new(ReferenceFrame::new(config.threshold))),
        ModelKind::Difference => Ok(Box::new(FrameDifference::new(config.threshold))),

        #[cfg(feature = "opencv")]
        ModelKind::Mog2 => Ok(Box::new(Mog2::new(Mog2Settings::default())?)),

        #[cfg(not(feature = "opencv"))]
        ModelKind::Mog2 => Err(Error::Foreground(
            "mog2 background model requires the `opencv` feature".into(),
        )),
    }
}

/// Runs a background model and checks the mask it hands back
pub struct ForegroundExtractor<B> {
    model: B,
}

impl<B: BackgroundModel> ForegroundExtractor<B> {
    pub fn new(model: B) -> Self {
        Self { model }
    }

    pub fn extract(&mut self, frame: &Frame) -> Result<Mask, Error> {
        let mask = self.model.apply(frame)?;

        if mask.dim() != frame.image.dim() {
            return Err(Error::Foreground(format!(
                "mask shape {:?} does not match frame shape {:?}",
                mask.dim(),
                frame.image.dim()
            )));
        }

        Ok(mask)
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn frame(id: u64, lit: Option<(usize, usize, usize, usize)>) -> Frame {
        let mut image = Array2::from_elem((20, 30), 10u8);
        if let Some((x, y, w, h)) = lit {
            image.slice_mut(s![y..y + h, x..x + w]).fill(200);
        }
        Frame::new(id, image)
    }

    fn count(mask: &Mask) -> usize {
        mask.iter().filter(|&&p| p == FOREGROUND).count()
    }

    #[test]
    fn frame_difference_marks_changes_only() {
        let mut model = FrameDifference::default();

        assert_eq!(count(&model.apply(&frame(0, None)).unwrap()), 0);
        assert_eq!(count(&model.apply(&frame(1, Some((2, 2, 4, 3)))).unwrap()), 12);
        // unchanged frame
        assert_eq!(count(&model.apply(&frame(2, Some((2, 2, 4, 3)))).unwrap()), 0);
    }

    #[test]
    fn reference_frame_keeps_first_background() {
        let mut model = ReferenceFrame::default();

        assert_eq!(count(&model.apply(&frame(0, None)).unwrap()), 0);
        assert_eq!(count(&model.apply(&frame(1, Some((0, 0, 5, 5)))).unwrap()), 25);
        assert_eq!(count(&model.apply(&frame(2, Some((0, 0, 5, 5)))).unwrap()), 25);

        model.reset();
        assert_eq!(count(&model.apply(&frame(3, Some((0, 0, 5, 5)))).unwrap()), 0);
        assert_eq!(count(&model.apply(&frame(4, Some((0, 0, 5, 5)))).unwrap()), 0);
    }

    struct BadModel;

    impl BackgroundModel for BadModel {
        fn apply(&mut self, _frame: &Frame) -> Result<Mask, Error> {
            Ok(Mask::zeros((1, 1)))
        }

        fn reset(&mut self) {}
    }

    #[test]
    fn builds_configured_model() {
        let config = ForegroundConfig {
            model: ModelKind::Reference,
            threshold: 25,
        };
        let mut model = build_model(&config).unwrap();

        assert_eq!(count(&model.apply(&frame(0, None)).unwrap()), 0);
        assert_eq!(count(&model.apply(&frame(1, Some((1, 1, 2, 2)))).unwrap()), 4);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn mog2_needs_opencv() {
        let config = ForegroundConfig {
            model: ModelKind::Mog2,
            ..Default::default()
        };

        assert!(matches!(build_model(&config), Err(Error::Foreground(_))));
    }

    #[test]
    fn extractor_rejects_mismatched_mask() {
        let mut extractor = ForegroundExtractor::new(BadModel);

        assert!(matches!(
            extractor.extract(&frame(0, None)),
            Err(Error::Foreground(_))
        ));
    }
}
