use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{debug, error, info};

use mtrack::audio::{audio_loop, ToneSource};
use mtrack::capture::{FrameSource, SyntheticSource};
use mtrack::foreground::{build_model, ModelKind};
use mtrack::pipeline::detect_loop;
use mtrack::{load_config, shutdown, BBox, Bridge, Config, Error, MotionPipeline};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Model {
    Reference,
    Diff,
    Mog2,
}

impl From<Model> for ModelKind {
    fn from(m: Model) -> ModelKind {
        match m {
            Model::Reference => ModelKind::Reference,
            Model::Diff => ModelKind::Difference,
            Model::Mog2 => ModelKind::Mog2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "mtrack-server", about = "Motion tracking event server")]
struct Args {
    /// TOML config file, command line values override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// WebSocket listen host
    #[arg(long)]
    host: Option<String>,

    /// WebSocket listen port
    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<f64>,

    /// Minimum blob area in pixels
    #[arg(long)]
    min_area: Option<u32>,

    #[arg(long)]
    merge_iou: Option<f32>,

    #[arg(long)]
    match_iou: Option<f32>,

    #[arg(long)]
    max_age: Option<u32>,

    #[arg(long)]
    min_hits: Option<u32>,

    /// Number of recent centers kept per track
    #[arg(long)]
    trail: Option<usize>,

    #[arg(long, value_enum)]
    model: Option<Model>,

    /// Use generated frames instead of the camera
    #[arg(long)]
    synthetic: bool,

    /// Publish audio levels of a generated tone of this frequency
    #[arg(long, value_name = "HZ")]
    audio_tone: Option<f32>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.bridge.host = host.clone();
        }
        if let Some(port) = self.port {
            config.bridge.port = port;
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(min_area) = self.min_area {
            config.pipeline.blob.min_area = min_area;
        }
        if let Some(merge_iou) = self.merge_iou {
            config.pipeline.merge_iou = merge_iou;
        }
        if let Some(match_iou) = self.match_iou {
            config.pipeline.tracker.match_iou = match_iou;
        }
        if let Some(max_age) = self.max_age {
            config.pipeline.tracker.max_age = max_age;
        }
        if let Some(min_hits) = self.min_hits {
            config.pipeline.tracker.min_hits = min_hits;
        }
        if let Some(trail) = self.trail {
            config.pipeline.tracker.trail_len = trail;
        }
        if let Some(model) = self.model {
            config.pipeline.foreground.model = model.into();
        }
        if self.audio_tone.is_some() {
            config.audio.enabled = true;
        }
    }
}

fn open_source(args: &Args, config: &Config) -> Result<Box<dyn FrameSource + Send>, Error> {
    let capture = &config.capture;

    if args.synthetic {
        let (w, h) = (capture.width as i32, capture.height as i32);
        let source = SyntheticSource::new(capture.width, capture.height)
            .with_object(BBox::ltwh(w / 8, h / 4, w / 10, h / 6), 2, 1)
            .with_object(BBox::ltwh(w / 2, h / 2, w / 12, h / 5), -1, -1)
            .paced(capture.fps);

        return Ok(Box::new(source));
    }

    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(mtrack::capture::Camera::open(capture)?))
    }

    #[cfg(not(feature = "opencv"))]
    {
        Err(Error::Capture(
            "camera capture requires the `opencv` feature, use --synthetic".into(),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config: Config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);

    let source = open_source(&args, &config)?;
    let model = build_model(&config.pipeline.foreground)?;
    let pipeline = MotionPipeline::new(model, config.pipeline.clone());

    let bridge = Arc::new(Bridge::new(config.bridge.clone()));
    let (trigger, shutdown) = shutdown::channel();

    let detect = tokio::spawn(detect_loop(bridge.clone(), source, pipeline, shutdown.clone()));

    let audio = config.audio.enabled.then(|| {
        let tone = ToneSource::new(48_000, args.audio_tone.unwrap_or(440.0), 0.25).realtime();
        tokio::spawn(audio_loop(
            bridge.clone(),
            tone,
            config.audio.clone(),
            shutdown.clone(),
        ))
    });

    let inbound = {
        let bridge = bridge.clone();
        tokio::spawn(async move {
            while let Some(msg) = bridge.receive().await {
                info!(consumer = msg.consumer, text = %msg.text, "inbound message");
            }
        })
    };

    let server = tokio::spawn(bridge.clone().serve(shutdown));

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "unable to listen for ctrl-c");
    }
    info!("shutdown signal received");
    trigger.trigger();

    match detect.await {
        // already reported by the loop itself
        Ok(Err(err)) => debug!(%err, "detect loop ended with error"),
        Err(err) => error!(%err, "detect task panicked"),
        Ok(Ok(())) => {}
    }

    if let Some(audio) = audio {
        if let Ok(Err(err)) = audio.await {
            debug!(%err, "audio loop ended with error");
        }
    }

    inbound.abort();

    match server.await {
        Ok(res) => res,
        Err(err) => {
            error!(%err, "server task panicked");
            Ok(())
        }
    }
}
