use std::sync::Arc;

use num_traits::Float;
use serde_derive::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::envelope::{Envelope, Payload};
use crate::error::Error;
use crate::shutdown::Shutdown;

const MIN_RMS: f64 = 1e-8;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AudioLevel {
    /// level relative to full scale, 0 dBFS at |sample| == 1
    pub dbfs: f64,
    pub rms: f64,
}

impl AudioLevel {
    /// RMS of normalized samples (clamped to 1e-8) and its level in dBFS
    pub fn from_samples<T: Float>(samples: &[T]) -> Self {
        let sum = samples
            .iter()
            .map(|s| s.to_f64().unwrap_or(0.0))
            .map(|s| s * s)
            .sum::<f64>();

        let mean = if samples.is_empty() {
            0.0
        } else {
            sum / samples.len() as f64
        };

        let rms = mean.sqrt().max(MIN_RMS);

        Self {
            dbfs: 20.0 * rms.log10(),
            rms,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioDevice {
    pub name: Option<String>,
    pub sample_rate: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioWindow {
    pub duration_sec: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AudioPayload {
    pub device: AudioDevice,
    pub window: AudioWindow,
    pub level: AudioLevel,
}

impl AudioPayload {
    pub fn new(
        level: AudioLevel,
        device_name: Option<String>,
        sample_rate: Option<u32>,
        block_duration: Option<f64>,
    ) -> Self {
        Self {
            device: AudioDevice {
                name: device_name,
                sample_rate,
            },
            window: AudioWindow {
                duration_sec: block_duration,
            },
            level,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    /// seconds of audio per level message
    pub block_duration: f64,
    pub source: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            block_duration: 0.05,
            source: "c922_mic".into(),
        }
    }
}

/// Mono input stream of normalized `[-1, 1]` samples
pub trait SampleSource {
    fn device_name(&self) -> Option<String>;
    fn sample_rate(&self) -> u32;

    /// Blocks until `len` samples are available
    fn read_block(&mut self, len: usize) -> Result<Vec<f32>, Error>;

    fn release(&mut self) {}
}

/// Sine tone generator, stands in for a microphone
#[derive(Debug, Clone)]
pub struct ToneSource {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    phase: f32,
    realtime: bool,
}

impl ToneSource {
    pub fn new(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude,
            phase: 0.0,
            realtime: false,
        }
    }

    /// Makes `read_block` block for the duration of the block, like a device
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }
}

impl SampleSource for ToneSource {
    fn device_name(&self) -> Option<String> {
        Some("tone".into())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self, len: usize) -> Result<Vec<f32>, Error> {
        let step = std::f32::consts::TAU * self.frequency / self.sample_rate as f32;

        if self.realtime && self.sample_rate > 0 {
            std::thread::sleep(std::time::Duration::from_secs_f64(
                len as f64 / self.sample_rate as f64,
            ));
        }

        Ok((0..len)
            .map(|_| {
                let s = self.amplitude * self.phase.sin();
                self.phase = (self.phase + step) % std::f32::consts::TAU;
                s
            })
            .collect())
    }
}

/// Publishes one `audio_level` envelope per block until shutdown or a read error.
pub async fn audio_loop<S: SampleSource>(
    bridge: Arc<Bridge>,
    mut source: S,
    config: AudioConfig,
    shutdown: Shutdown,
) -> Result<(), Error> {
    let sample_rate = source.sample_rate();
    let device_name = source.device_name();
    let block_size = ((sample_rate as f64 * config.block_duration) as usize).max(1);

    tracing::info!(
        device = ?device_name,
        sample_rate,
        block_size,
        "audio loop started"
    );

    let mut frame_id = 0u64;
    let res = loop {
        if shutdown.is_triggered() {
            break Ok(());
        }

        let samples = match source.read_block(block_size) {
            Ok(samples) => samples,
            Err(err) => {
                tracing::error!(%err, "audio read failed, stopping audio loop");
                break Err(err);
            }
        };

        let payload = AudioPayload::new(
            AudioLevel::from_samples(&samples),
            device_name.clone(),
            Some(sample_rate),
            Some(config.block_duration),
        );

        let envelope = Envelope::new(Payload::AudioLevel(payload), Some(frame_id), &config.source);
        if let Err(err) = bridge.publish(&envelope) {
            tracing::error!(%err, "failed to publish audio level");
            break Err(err);
        }

        frame_id += 1;
        tokio::task::yield_now().await;
    };

    source.release();
    tracing::info!(blocks = frame_id, "audio loop finished");

    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_square_wave_is_zero_dbfs() {
        let level = AudioLevel::from_samples(&[1.0f32, -1.0, 1.0, -1.0]);

        assert!((level.rms - 1.0).abs() < 1e-9);
        assert!(level.dbfs.abs() < 1e-9);
    }

    #[test]
    fn silence_is_clamped() {
        let level = AudioLevel::from_samples(&[0.0f64; 64]);

        assert_eq!(level.rms, 1e-8);
        assert!((level.dbfs + 160.0).abs() < 1e-6);

        let empty = AudioLevel::from_samples::<f32>(&[]);
        assert_eq!(empty.rms, 1e-8);
    }

    #[test]
    fn half_amplitude_is_about_minus_six_db() {
        let level = AudioLevel::from_samples(&[0.5f32, -0.5]);

        assert!((level.dbfs - 20.0 * 0.5f64.log10()).abs() < 1e-6);
    }

    #[test]
    fn tone_rms_matches_sine() {
        let mut tone = ToneSource::new(48_000, 1_000.0, 0.5);
        let block = tone.read_block(4_800).unwrap();
        let level = AudioLevel::from_samples(&block);

        // amplitude / sqrt(2)
        assert!((level.rms - 0.5 / 2f64.sqrt()).abs() < 1e-3);
    }

    struct Blocks {
        left: usize,
    }

    impl SampleSource for Blocks {
        fn device_name(&self) -> Option<String> {
            None
        }

        fn sample_rate(&self) -> u32 {
            1_000
        }

        fn read_block(&mut self, len: usize) -> Result<Vec<f32>, Error> {
            if self.left == 0 {
                return Err(Error::Capture("stream closed".into()));
            }

            self.left -= 1;
            Ok(vec![0.25; len])
        }
    }

    #[tokio::test]
    async fn audio_loop_publishes_until_read_fails() {
        let bridge = Arc::new(Bridge::default());
        let (_trigger, shutdown) = crate::shutdown::channel();

        let res = audio_loop(
            bridge.clone(),
            Blocks { left: 3 },
            AudioConfig::default(),
            shutdown,
        )
        .await;

        assert!(matches!(res, Err(Error::Capture(_))));
        assert_eq!(bridge.pending(), 3);
    }

    #[tokio::test]
    async fn audio_loop_stops_on_shutdown() {
        let bridge = Arc::new(Bridge::default());
        let (trigger, shutdown) = crate::shutdown::channel();
        trigger.trigger();

        let tone = ToneSource::new(8_000, 440.0, 0.5);
        audio_loop(bridge.clone(), tone, AudioConfig::default(), shutdown)
            .await
            .unwrap();

        assert_eq!(bridge.pending(), 0);
    }

    #[test]
    fn payload_wire_shape() {
        let payload = AudioPayload::new(
            AudioLevel { dbfs: -20.0, rms: 0.1 },
            None,
            Some(44_100),
            Some(0.05),
        );

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "device": {"name": null, "sample_rate": 44100},
                "window": {"duration_sec": 0.05},
                "level": {"dbfs": -20.0, "rms": 0.1},
            })
        );
    }
}
