//! # Play
//!
//! Headless video player over the play-core pipeline: probes a source,
//! decodes it to raw frames through ffmpeg, paces them to the stream's frame
//! rate and feeds them to the selected sink.

use anyhow::{anyhow, bail, Result};
use play_core::backend::FfmpegBackend;
use play_core::frame::PixelLayout;
use play_core::pipeline::{PipelineController, PipelineEvent, PipelineState, PlayerConfig};
use play_core::render::{CountingSink, FrameSink, SnapshotSink};
use play_core::source::MediaSource;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

struct Options {
    source: MediaSource,
    layout: PixelLayout,
    fps: Option<f64>,
    frames: Option<u64>,
    snapshot_dir: Option<String>,
    snapshot_every: u64,
    quiet: bool,
}

fn print_usage() {
    eprintln!(
        "Usage: play <source> [options]\n\
         \n\
         Options:\n\
           --layout <rgb24|bgr24>    Raw pixel layout (default rgb24)\n\
           --fps <rate>              Override the probed frame rate\n\
           --frames <n>              Stop after n frames\n\
           --snapshot-dir <dir>      Write PNG snapshots to <dir>\n\
           --snapshot-every <n>      Snapshot every nth frame (default 30)\n\
           --quiet                   No per-frame progress output"
    );
}

fn parse_args() -> Result<Options> {
    let mut args = std::env::args().skip(1);
    let mut source: Option<MediaSource> = None;
    let mut layout = PixelLayout::Rgb24;
    let mut fps = None;
    let mut frames = None;
    let mut snapshot_dir = None;
    let mut snapshot_every = 30u64;
    let mut quiet = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--layout" => {
                let value = args.next().ok_or_else(|| anyhow!("--layout needs a value"))?;
                layout = value.parse().map_err(|e: String| anyhow!(e))?;
            }
            "--fps" => {
                let value = args.next().ok_or_else(|| anyhow!("--fps needs a value"))?;
                fps = Some(value.parse::<f64>()?);
            }
            "--frames" => {
                let value = args.next().ok_or_else(|| anyhow!("--frames needs a value"))?;
                frames = Some(value.parse::<u64>()?);
            }
            "--snapshot-dir" => {
                snapshot_dir =
                    Some(args.next().ok_or_else(|| anyhow!("--snapshot-dir needs a value"))?);
            }
            "--snapshot-every" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--snapshot-every needs a value"))?;
                snapshot_every = value.parse::<u64>()?.max(1);
            }
            "--quiet" => quiet = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if source.is_none() && !other.starts_with('-') => {
                source = other.parse().ok();
            }
            other => bail!("Unknown argument: {}", other),
        }
    }

    let Some(source) = source else {
        print_usage();
        bail!("No source given");
    };

    Ok(Options {
        source,
        layout,
        fps,
        frames,
        snapshot_dir,
        snapshot_every,
        quiet,
    })
}

fn build_sink(options: &Options) -> Result<Box<dyn FrameSink>> {
    if let Some(dir) = &options.snapshot_dir {
        std::fs::create_dir_all(dir)?;
        return Ok(Box::new(SnapshotSink::new(dir, options.snapshot_every)));
    }
    Ok(Box::new(CountingSink::new()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options = parse_args()?;

    let config = PlayerConfig {
        layout: options.layout,
        target_fps: options.fps,
        max_frames: options.frames,
    };

    let sink = build_sink(&options)?;
    let (controller, events) =
        PipelineController::new(Arc::new(FfmpegBackend::new()), sink, config);

    let started = Instant::now();
    controller.start(options.source.clone())?;

    let mut rendered = 0u64;
    let mut failure: Option<String> = None;
    for event in events.iter() {
        match event {
            PipelineEvent::FrameRendered(n) => {
                rendered = n;
                if !options.quiet && n % 30 == 0 {
                    eprint!("\rframe {}", n);
                }
            }
            PipelineEvent::EndOfStream => {
                if !options.quiet {
                    eprintln!();
                }
                tracing::info!("end of stream");
            }
            PipelineEvent::Error(message) => {
                failure = Some(message);
            }
            PipelineEvent::StateChanged(state) => {
                tracing::debug!(?state, "state changed");
                if matches!(state, PipelineState::Stopped | PipelineState::Failed(_)) {
                    break;
                }
            }
        }
    }

    let elapsed = started.elapsed();
    let effective_fps = if elapsed.as_secs_f64() > 0.0 {
        rendered as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    if let Some(message) = failure {
        bail!("Playback failed: {}", message);
    }

    println!(
        "{}: {} frames in {:.2}s ({:.1} fps)",
        options.source,
        rendered,
        elapsed.as_secs_f64(),
        effective_fps
    );

    Ok(())
}
