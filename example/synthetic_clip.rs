#![recursion_limit = "256"]

use std::path::Path;

use burn::prelude::*;
use burn_depth_video::{
    CancelToken, InferenceBackend, InferenceParams, RunConfig, WindowConfig,
    media::FrameSequence,
    model::LumaDisparityConfig,
    pipeline::{infer_sequence, process_sequence},
};
use image::{Rgb, RgbImage};

const FRAMES: usize = 48;
const SIZE: u32 = 128;

/// A bright disc drifting across a dark gradient.
fn synthetic_clip() -> FrameSequence {
    let frames = (0..FRAMES)
        .map(|t| {
            let cx = 20.0 + t as f32 * 2.0;
            let cy = SIZE as f32 / 2.0;
            RgbImage::from_fn(SIZE, SIZE, |x, y| {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy < 400.0 {
                    Rgb([230, 220, 200])
                } else {
                    let shade = (y * 80 / SIZE) as u8;
                    Rgb([shade, shade, shade + 20])
                }
            })
        })
        .collect();
    FrameSequence::new("synthetic_clip", frames).with_fps(Some(24.0))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let device = <InferenceBackend as Backend>::Device::default();
    let model = LumaDisparityConfig::new().init::<InferenceBackend>(&device);

    let config = RunConfig {
        params: InferenceParams {
            window: WindowConfig::new(4, 6, 3),
            decode_chunk_size: 8,
            ..InferenceParams::default()
        },
        ..RunConfig::default()
    };

    let clip = synthetic_clip();
    let plan = config.params.window.plan(clip.len())?;
    println!(
        "{} frames -> {} windows of {} frames",
        clip.len(),
        plan.len(),
        plan.config().window_len()
    );

    let cancel = CancelToken::new();
    let stitched =
        infer_sequence::<InferenceBackend, _>(&model, &clip, &config.params, &device, &cancel)?;
    let mean_disparity = stitched
        .frames
        .iter()
        .map(|frame| frame.disparity.iter().sum::<f32>() / frame.disparity.len() as f32)
        .sum::<f32>()
        / stitched.len() as f32;
    println!("mean disparity over the clip: {mean_disparity:.4}");

    let output_dir = Path::new("output");
    match process_sequence::<InferenceBackend, _>(
        &model, clip, &config, output_dir, &device, &cancel,
    ) {
        Ok(path) => println!("wrote {}", path.display()),
        // Video output needs the `ffmpeg` executable.
        Err(err) => eprintln!("skipped video output: {err}"),
    }

    Ok(())
}
