use std::path::Path;

use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};

use crate::audio::AudioConfig;
use crate::bridge::BridgeConfig;
use crate::capture::CaptureConfig;
use crate::error::Error;
use crate::pipeline::PipelineConfig;

/// Whole process configuration, every section optional
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub bridge: BridgeConfig,
    pub audio: AudioConfig,
}

impl Config {
    #[inline]
    pub fn from_toml(contents: &str) -> Result<Self, Error> {
        parse(contents)
    }
}

fn parse<T: DeserializeOwned>(contents: &str) -> Result<T, Error> {
    Ok(toml::from_str(contents)?)
}

pub fn load_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, Error> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|err| {
        tracing::error!(path = %path.display(), %err, "could not load config");
        err
    })?;

    parse(&contents)
}
