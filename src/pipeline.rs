use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::blob::{BlobFilter, BlobFilterConfig};
use crate::bridge::Bridge;
use crate::capture::FrameSource;
use crate::envelope::{Envelope, Payload, TracksPayload};
use crate::error::Error;
use crate::foreground::{BackgroundModel, ForegroundConfig, ForegroundExtractor};
use crate::frame::Frame;
use crate::merge::merge_boxes;
use crate::shutdown::Shutdown;
use crate::tracker::{TrackManager, TrackerConfig};
use crate::Tracking;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub foreground: ForegroundConfig,
    pub blob: BlobFilterConfig,
    pub merge_iou: f32,
    pub tracker: TrackerConfig,
    pub source: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            foreground: ForegroundConfig::default(),
            blob: BlobFilterConfig::default(),
            merge_iou: 0.3,
            tracker: TrackerConfig::default(),
            source: "motion".into(),
        }
    }
}

/// Foreground mask -> blobs -> merged boxes -> tracks, one frame at a time
pub struct MotionPipeline<B, T = TrackManager> {
    foreground: ForegroundExtractor<B>,
    blobs: BlobFilter,
    merge_iou: f32,
    tracker: T,
    source: String,
}

impl<B: BackgroundModel> MotionPipeline<B, TrackManager> {
    pub fn new(model: B, config: PipelineConfig) -> Self {
        let tracker = TrackManager::new(config.tracker);
        Self::with_tracker(model, tracker, config)
    }
}

impl<B: BackgroundModel, T: Tracking> MotionPipeline<B, T> {
    /// `config.tracker` is ignored, `tracker` is used as given
    pub fn with_tracker(model: B, tracker: T, config: PipelineConfig) -> Self {
        Self {
            foreground: ForegroundExtractor::new(model),
            blobs: BlobFilter::new(config.blob),
            merge_iou: config.merge_iou,
            tracker,
            source: config.source,
        }
    }

    #[inline]
    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    /// Candidate boxes of one frame, after filtering and merging
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<BBox>, Error> {
        let mask = self.foreground.extract(frame)?;
        let boxes = self.blobs.apply(mask.view());

        Ok(merge_boxes(&boxes, self.merge_iou))
    }

    /// Runs the whole chain on `frame` and wraps the confirmed tracks
    pub fn process(&mut self, frame: &Frame) -> Result<Envelope, Error> {
        let boxes = self.detect(frame)?;
        let payload = TracksPayload::from_tracks(self.tracker.step(&boxes));

        tracing::trace!(
            frame = frame.id,
            boxes = boxes.len(),
            confirmed = payload.tracks.len(),
            "frame processed"
        );

        Ok(Envelope::new(
            Payload::Tracks(payload),
            Some(frame.id),
            self.source.as_str(),
        ))
    }

    /// Forgets the background and every track
    pub fn reset(&mut self) {
        self.foreground.reset();
        self.tracker.reset();
        tracing::info!("background and tracks reset");
    }
}

/// Publishes one `tracks` envelope per captured frame.
///
/// A capture failure is logged once and ends the loop; the source is released
/// on every exit path.
pub async fn detect_loop<S, B, T>(
    bridge: Arc<Bridge>,
    mut source: S,
    mut pipeline: MotionPipeline<B, T>,
    shutdown: Shutdown,
) -> Result<(), Error>
where
    S: FrameSource,
    B: BackgroundModel,
    T: Tracking,
{
    tracing::info!(source = %pipeline.source, "detect loop started");

    let mut frames = 0u64;
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
                tracing::error!(%err, "failed to read frame, stopping detect loop");
                break Err(err);
            }
        };

        let envelope = match pipeline.process(&frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::error!(frame = frame.id, %err, "failed to process frame");
                break Err(err);
            }
        };

        if let Err(err) = bridge.publish(&envelope) {
            tracing::error!(%err, "failed to publish tracks");
            break Err(err);
        }

        frames += 1;
        tokio::task::yield_now().await;
    };

    source.release();
    tracing::info!(frames, "detect loop finished");

    res
}
