use opencv::{
    core::{self, Mat, Ptr},
    imgproc,
    prelude::*,
    video,
};
use serde_derive::{Deserialize, Serialize};

use super::{BackgroundModel, Mask};
use crate::cv::{array_to_mat, mat_to_array};
use crate::error::Error;
use crate::frame::Frame;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Mog2Settings {
    pub history: i32,
    pub var_threshold: f64,
    pub detect_shadows: bool,
    pub learning_rate: f64,
    /// mask level above which a pixel counts as foreground, drops shadows
    pub threshold: f64,
}

impl Default for Mog2Settings {
    fn default() -> Self {
        Self {
            history: 300,
            var_threshold: 10.0,
            detect_shadows: false,
            learning_rate: 0.004,
            threshold: 200.0,
        }
    }
}

fn mog2_from_settings(settings: &Mog2Settings) -> Result<Ptr<dyn video::BackgroundSubtractorMOG2>, Error> {
    Ok(video::create_background_subtractor_mog2(
        settings.history,
        settings.var_threshold,
        settings.detect_shadows,
    )?)
}

/// OpenCV MOG2 followed by thresholding and a 3x3 open / 5x5 close cleanup
pub struct Mog2 {
    subtractor: Ptr<dyn video::BackgroundSubtractorMOG2>,
    settings: Mog2Settings,
    open_kernel: Mat,
    close_kernel: Mat,
}

impl Mog2 {
    pub fn new(settings: Mog2Settings) -> Result<Self, Error> {
        Ok(Self {
            subtractor: mog2_from_settings(&settings)?,
            settings,
            open_kernel: Mat::ones(3, 3, core::CV_8U)?.to_mat()?,
            close_kernel: Mat::ones(5, 5, core::CV_8U)?.to_mat()?,
        })
    }

    fn morphology(&self, src: &Mat, op: i32, kernel: &Mat) -> Result<Mat, Error> {
        let mut dst = Mat::default();
        imgproc::morphology_ex(
            src,
            &mut dst,
            op,
            kernel,
            core::Point::new(-1, -1),
            1,
            core::BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;

        Ok(dst)
    }
}

impl BackgroundModel for Mog2 {
    fn apply(&mut self, frame: &Frame) -> Result<Mask, Error> {
        let input = array_to_mat(&frame.image)?;

        let mut raw = Mat::default();
        self.subtractor
            .apply(&input, &mut raw, self.settings.learning_rate)?;

        let mut binary = Mat::default();
        imgproc::threshold(
            &raw,
            &mut binary,
            self.settings.threshold,
            255.0,
            imgproc::THRESH_BINARY,
        )?;

        let opened = self.morphology(&binary, imgproc::MORPH_OPEN, &self.open_kernel)?;
        let closed = self.morphology(&opened, imgproc::MORPH_CLOSE, &self.close_kernel)?;

        mat_to_array(&closed)
    }

    fn reset(&mut self) {
        match mog2_from_settings(&self.settings) {
            Ok(subtractor) => self.subtractor = subtractor,
            Err(err) => tracing::error!(%err, "could not reset mog2 background subtractor"),
        }
    }
}
