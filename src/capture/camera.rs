use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio,
};

use super::{CaptureConfig, FrameSource};
use crate::cv::mat_to_array;
use crate::error::Error;
use crate::frame::Frame;

/// Camera device read through OpenCV, converted to blurred grayscale
pub struct Camera {
    cam: videoio::VideoCapture,
    next_id: u64,
}

impl Camera {
    pub fn open(config: &CaptureConfig) -> Result<Self, Error> {
        let mut cam = videoio::VideoCapture::new(config.device_index, videoio::CAP_ANY)?;

        cam.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        cam.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        cam.set(videoio::CAP_PROP_FPS, config.fps)?;

        if !cam.is_opened()? {
            return Err(Error::Capture(format!(
                "unable to open camera {}",
                config.device_index
            )));
        }

        let width = cam.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = cam.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        tracing::info!(
            device = config.device_index,
            width,
            height,
            "camera opened"
        );

        Ok(Self { cam, next_id: 0 })
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Option<Frame>, Error> {
        let mut frame = Mat::default();
        if !self.cam.read(&mut frame)? || frame.rows() == 0 {
            return Err(Error::Capture("failed to read camera frame".into()));
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

        let mut blurred = Mat::default();
        imgproc::gaussian_blur(
            &gray,
            &mut blurred,
            core::Size::new(5, 5),
            0.0,
            0.0,
            core::BORDER_DEFAULT,
        )?;

        let id = self.next_id;
        self.next_id += 1;

        Ok(Some(Frame::new(id, mat_to_array(&blurred)?)))
    }

    fn release(&mut self) {
        if let Err(err) = self.cam.release() {
            tracing::warn!(%err, "failed to release camera");
        }
    }
}
