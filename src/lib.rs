pub mod audio;
pub mod bbox;
pub mod blob;
pub mod bridge;
pub mod capture;
pub mod config;
pub mod envelope;
pub mod error;
pub mod foreground;
pub mod frame;
pub mod hands;
pub mod merge;
pub mod pipeline;
pub mod shutdown;
pub mod tracker;

mod circular_queue;
mod track;

#[cfg(feature = "opencv")]
mod cv;

pub use bbox::BBox;
pub use bridge::Bridge;
pub use config::{load_config, Config};
pub use envelope::{Envelope, Payload};
pub use error::Error;
pub use frame::Frame;
pub use pipeline::MotionPipeline;
pub use track::Track;
pub use tracker::TrackManager;

/// Frame to frame association of candidate boxes into persistent tracks
pub trait Tracking {
    /// Consumes one frame of detections, returns the confirmed tracks
    fn step(&mut self, detections: &[BBox]) -> Vec<&Track>;

    /// Drops every track and restarts the id sequence
    fn reset(&mut self);
}
