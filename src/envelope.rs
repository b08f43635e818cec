use std::time::{SystemTime, UNIX_EPOCH};

use serde_derive::{Deserialize, Serialize};

use crate::audio::AudioPayload;
use crate::bbox::BBox;
use crate::error::Error;
use crate::hands::HandsPayload;
use crate::track::Track;

pub const ENVELOPE_VERSION: u32 = 1;

/// Seconds since unix epoch
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub id: u32,
    #[serde(rename = "box")]
    pub bbox: BBox,
    pub hits: u32,
    pub age: u32,
    /// recent centers, oldest first
    pub trail: Vec<[i32; 2]>,
}

impl From<&Track> for TrackInfo {
    fn from(t: &Track) -> TrackInfo {
        TrackInfo {
            id: t.id,
            bbox: t.bbox,
            hits: t.hits,
            age: t.age,
            trail: t.trail().map(|p| [p.x, p.y]).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TracksPayload {
    pub tracks: Vec<TrackInfo>,
}

impl TracksPayload {
    pub fn from_tracks<'a, I: IntoIterator<Item = &'a Track>>(tracks: I) -> Self {
        Self {
            tracks: tracks.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    Tracks(TracksPayload),
    Hands(HandsPayload),
    AudioLevel(AudioPayload),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Tracks(_) => "tracks",
            Payload::Hands(_) => "hands",
            Payload::AudioLevel(_) => "audio_level",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    pub version: u32,
    pub timestamp: f64,
    pub frame_id: Option<u64>,
    pub source: String,
}

impl Envelope {
    pub fn new<S: Into<String>>(payload: Payload, frame_id: Option<u64>, source: S) -> Self {
        Self {
            payload,
            version: ENVELOPE_VERSION,
            timestamp: now_secs(),
            frame_id,
            source: source.into(),
        }
    }

    #[inline]
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}
