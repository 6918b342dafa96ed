#![recursion_limit = "256"]

use std::{
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::Context;
use burn::prelude::*;
use burn_depth_video::{
    CancelToken, DirMode, FrameLimit, InferenceBackend, InferenceParams, PadMode, RunConfig,
    WindowConfig,
    model::{LumaDisparity, LumaDisparityConfig},
    process_path,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Estimate per-frame depth for an image, image directory or video"
)]
struct Args {
    /// Burn record (`.mpk`) for the disparity model; built-in weights when omitted.
    #[arg(long, value_name = "PATH")]
    model_base: Option<PathBuf>,

    /// Image, directory of images, or video file.
    #[arg(long, value_name = "PATH")]
    data_dir: PathBuf,

    #[arg(long, value_name = "PATH")]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 3)]
    denoise_steps: usize,

    /// Keyframes per model call; must be even.
    #[arg(long, default_value_t = 32)]
    num_frames: usize,

    #[arg(long, default_value_t = 16)]
    decode_chunk_size: usize,

    #[arg(long, default_value_t = 16)]
    num_interp_frames: usize,

    #[arg(long, default_value_t = 6)]
    num_overlap_frames: usize,

    /// Longest side after resizing, before cropping to multiples of 64.
    #[arg(long, default_value_t = 1024)]
    max_resolution: u32,

    /// Stop decoding a video after this many frames; defaults to one window stride.
    #[arg(long, conflicts_with = "all_frames")]
    max_frames: Option<usize>,

    /// Decode every frame of a video.
    #[arg(long, default_value_t = false)]
    all_frames: bool,

    #[arg(long, value_enum, default_value_t = PadMode::Full)]
    pad_mode: PadMode,

    #[arg(long, value_enum, default_value_t = DirMode::Each)]
    dir_mode: DirMode,

    /// Defaults to the current time in seconds.
    #[arg(long)]
    seed: Option<u64>,

    /// Stretch each window's disparity to the full range.
    #[arg(long, default_value_t = false)]
    normalize: bool,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let seed = self.seed.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default()
        });

        RunConfig {
            max_resolution: self.max_resolution,
            max_frames: match (self.all_frames, self.max_frames) {
                (true, _) => FrameLimit::Unlimited,
                (false, Some(count)) => FrameLimit::Count(count),
                (false, None) => FrameLimit::Stride,
            },
            dir_mode: self.dir_mode,
            params: InferenceParams {
                denoise_steps: self.denoise_steps,
                decode_chunk_size: self.decode_chunk_size,
                window: WindowConfig::new(
                    self.num_frames,
                    self.num_interp_frames,
                    self.num_overlap_frames,
                )
                .with_pad_mode(self.pad_mode),
                seed,
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.run_config();
    config
        .params
        .window
        .validate()
        .context("invalid window configuration")?;
    info!(
        config = %serde_json::to_string(&config).context("failed to serialize run config")?,
        "resolved run configuration"
    );

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received, stopping before the next window");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let device = <InferenceBackend as Backend>::Device::default();
    let model_config = LumaDisparityConfig::new().with_normalize(args.normalize);
    let model = match &args.model_base {
        Some(checkpoint) => {
            LumaDisparity::<InferenceBackend>::load(&device, model_config, checkpoint)
                .with_context(|| format!("failed to load `{}`", checkpoint.display()))?
        }
        None => model_config.init::<InferenceBackend>(&device),
    };

    let written = process_path::<InferenceBackend, _>(
        &model,
        &args.data_dir,
        &config,
        &args.output_dir,
        &device,
        &cancel,
    )
    .with_context(|| format!("failed to process `{}`", args.data_dir.display()))?;

    for path in &written {
        println!("{}", path.display());
    }
    info!(outputs = written.len(), "done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> RunConfig {
        let base = ["infer_video", "--data-dir", "in.mp4", "--output-dir", "out"];
        Args::try_parse_from(base.iter().chain(extra))
            .unwrap()
            .run_config()
    }

    #[test]
    fn defaults_cap_video_at_one_stride_and_pad_full() {
        let config = parse(&["--seed", "7"]);
        assert_eq!(config.max_frames, FrameLimit::Stride);
        assert_eq!(config.max_frames.resolve(&config.params.window), Some(192));
        assert_eq!(config.params.window.pad_mode, PadMode::Full);
        assert_eq!(config.params.seed, 7);
    }

    #[test]
    fn frame_cap_flags_override_the_stride() {
        assert_eq!(
            parse(&["--max-frames", "40"]).max_frames,
            FrameLimit::Count(40)
        );
        assert_eq!(
            parse(&["--all-frames"]).max_frames,
            FrameLimit::Unlimited
        );
        assert!(
            Args::try_parse_from([
                "infer_video",
                "--data-dir",
                "in.mp4",
                "--output-dir",
                "out",
                "--all-frames",
                "--max-frames",
                "3",
            ])
            .is_err()
        );
    }
}
