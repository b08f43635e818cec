use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::capture::FrameSource;
use crate::envelope::{Envelope, Payload};
use crate::error::Error;
use crate::frame::Frame;
use crate::shutdown::Shutdown;

pub const HAND_LANDMARKS: usize = 21;

/// Landmark as returned by an estimator, coordinates normalized to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    /// "Left" / "Right"
    pub label: String,
    pub score: f32,
    pub landmarks: Vec<NormalizedLandmark>,
}

/// Black-box hand pose estimator
pub trait HandLandmarker {
    fn process(&mut self, frame: &Frame) -> Result<Vec<HandDetection>, Error>;

    fn close(&mut self) {}
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub i: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub px: i32,
    pub py: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hand {
    pub id: u32,
    pub label: String,
    pub score: f32,
    pub landmarks: Vec<Landmark>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HandsPayload {
    pub image: ImageSize,
    pub hands: Vec<Hand>,
}

impl HandsPayload {
    /// Pixel coordinates are taken against `width` x `height`
    pub fn build(detections: &[HandDetection], width: u32, height: u32) -> Self {
        let hands = detections
            .iter()
            .enumerate()
            .map(|(id, det)| Hand {
                id: id as u32,
                label: det.label.clone(),
                score: det.score,
                landmarks: det
                    .landmarks
                    .iter()
                    .enumerate()
                    .map(|(i, lm)| Landmark {
                        i: i as u32,
                        x: lm.x,
                        y: lm.y,
                        z: lm.z,
                        px: (lm.x * width as f32) as i32,
                        py: (lm.y * height as f32) as i32,
                    })
                    .collect(),
            })
            .collect();

        Self {
            image: ImageSize { width, height },
            hands,
        }
    }
}

/// Runs the landmarker on every frame and publishes one `hands` envelope per frame.
///
/// Stops on shutdown, end of stream, or the first capture / estimator error.
pub async fn hands_loop<S: FrameSource, L: HandLandmarker>(
    bridge: Arc<Bridge>,
    mut source: S,
    mut landmarker: L,
    source_name: String,
    shutdown: Shutdown,
) -> Result<(), Error> {
    tracing::info!(source = %source_name, "hands loop started");

    let res = loop {
        if shutdown.is_triggered() {
            break Ok(());
        }

        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("end of stream");
                break Ok(());
            }
            Err(err) => {
                tracing::error!(%err, "failed to read frame, stopping hands loop");
                break Err(err);
            }
        };

        let detections = match landmarker.process(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                tracing::error!(%err, "hand landmarker failed, stopping hands loop");
                break Err(err);
            }
        };

        let (width, height) = frame.dims();
        let payload = HandsPayload::build(&detections, width, height);
        let envelope = Envelope::new(Payload::Hands(payload), Some(frame.id), &source_name);

        if let Err(err) = bridge.publish(&envelope) {
            tracing::error!(%err, "failed to publish hands");
            break Err(err);
        }

        tokio::task::yield_now().await;
    };

    landmarker.close();
    source.release();
    tracing::info!("hands loop finished");

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str) -> HandDetection {
        HandDetection {
            label: label.into(),
            score: 0.9,
            landmarks: (0..HAND_LANDMARKS)
                .map(|i| NormalizedLandmark {
                    x: i as f32 / 20.0,
                    y: 0.5,
                    z: -0.01,
                })
                .collect(),
        }
    }

    #[test]
    fn builds_pixel_coordinates() {
        let payload = HandsPayload::build(&[detection("Right"), detection("Left")], 1280, 720);

        assert_eq!(payload.image, ImageSize { width: 1280, height: 720 });
        assert_eq!(payload.hands.len(), 2);
        assert_eq!(payload.hands[1].id, 1);
        assert_eq!(payload.hands[1].label, "Left");

        let lms = &payload.hands[0].landmarks;
        assert_eq!(lms.len(), HAND_LANDMARKS);
        assert_eq!(lms[10].i, 10);
        assert_eq!(lms[10].px, 640);
        assert_eq!(lms[10].py, 360);
        assert_eq!(lms[20].px, 1280);
    }

    struct OneHand {
        closed: bool,
    }

    impl HandLandmarker for &mut OneHand {
        fn process(&mut self, _frame: &Frame) -> Result<Vec<HandDetection>, Error> {
            Ok(vec![detection("Right")])
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[tokio::test]
    async fn hands_loop_publishes_one_envelope_per_frame() {
        let bridge = Arc::new(crate::bridge::Bridge::default());
        let (_trigger, shutdown) = crate::shutdown::channel();
        let source = crate::capture::SyntheticSource::new(64, 48).limit(3);
        let mut landmarker = OneHand { closed: false };

        hands_loop(
            bridge.clone(),
            source,
            &mut landmarker,
            "mediapipe_hands".into(),
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(bridge.pending(), 3);
        assert!(landmarker.closed);
    }

    #[test]
    fn no_hands_is_an_empty_list() {
        let payload = HandsPayload::build(&[], 640, 360);
        let v = serde_json::to_value(&payload).unwrap();

        assert_eq!(
            v,
            serde_json::json!({"image": {"width": 640, "height": 360}, "hands": []})
        );
    }
}
