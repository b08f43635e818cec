//! Runs the motion pipeline over generated frames and prints one envelope per line.

use clap::Parser;

use mtrack::capture::{FrameSource, SyntheticSource};
use mtrack::foreground::FrameDifference;
use mtrack::pipeline::PipelineConfig;
use mtrack::{BBox, Error, MotionPipeline};

#[derive(Parser, Debug)]
#[command(name = "dump-tracks", about = "Print tracks of a synthetic scene as JSON lines")]
struct Args {
    #[arg(long, default_value = "320")]
    width: u32,

    #[arg(long, default_value = "240")]
    height: u32,

    #[arg(long, default_value = "60")]
    frames: u64,

    /// Skip envelopes without confirmed tracks
    #[arg(long)]
    confirmed_only: bool,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();

    let mut source = SyntheticSource::new(args.width, args.height)
        .with_object(BBox::ltwh(10, 20, 48, 40), 3, 1)
        .with_object(BBox::ltwh(200, 150, 40, 56), -2, -1)
        .limit(args.frames);

    let mut pipeline = MotionPipeline::new(FrameDifference::default(), PipelineConfig::default());

    while let Some(frame) = source.read()? {
        let envelope = pipeline.process(&frame)?;

        if args.confirmed_only {
            if let mtrack::Payload::Tracks(p) = &envelope.payload {
                if p.tracks.is_empty() {
                    continue;
                }
            }
        }

        println!("{}", envelope.to_json()?);
    }

    Ok(())
}
