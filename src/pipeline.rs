use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    blend::{StitchedOutput, Stitcher},
    error::{DepthVideoError, Result},
    inference::{DepthInfer, InferenceParams, WindowResult, frames_to_tensor},
    media::{self, FrameSequence, MediaKind},
    preprocess::preprocess,
    window::WindowConfig,
    writer::{merge_output, write_output},
};

/// Shared flag checked between windows. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a directory input is processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DirMode {
    /// Every image is its own run and its own PNG.
    #[default]
    Each,
    /// The sorted images form one clip written as a video.
    Sequence,
}

/// How many frames are decoded from a video input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLimit {
    /// One window stride, `step * num_frames / 2` frames.
    #[default]
    Stride,
    Count(usize),
    Unlimited,
}

impl FrameLimit {
    /// Decode cap for `window`, `None` meaning the whole video.
    pub fn resolve(&self, window: &WindowConfig) -> Option<usize> {
        match self {
            Self::Stride => Some(window.stride()),
            Self::Count(count) => Some(*count),
            Self::Unlimited => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub max_resolution: u32,
    pub max_frames: FrameLimit,
    pub dir_mode: DirMode,
    pub params: InferenceParams,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_resolution: 1024,
            max_frames: FrameLimit::Stride,
            dir_mode: DirMode::Each,
            params: InferenceParams::default(),
        }
    }
}

/// Runs `model` over every window of `sequence` and stitches the results.
///
/// Nothing is returned unless every window succeeded; cancellation is checked
/// before each window.
pub fn infer_sequence<B: Backend, M: DepthInfer<B> + ?Sized>(
    model: &M,
    sequence: &FrameSequence,
    params: &InferenceParams,
    device: &B::Device,
    cancel: &CancelToken,
) -> Result<StitchedOutput> {
    let plan = params.window.plan(sequence.len())?;
    let mut stitcher = Stitcher::new(plan);

    info!(
        input = %sequence.name,
        frames = sequence.len(),
        windows = plan.len(),
        window_len = plan.config().window_len(),
        model = model.name(),
        "running depth inference"
    );

    for window in plan.iter() {
        if cancel.is_cancelled() {
            warn!(
                window = window.index,
                merged = stitcher.windows_merged(),
                "run cancelled"
            );
            return Err(DepthVideoError::Cancelled);
        }

        info!(
            window = window.index + 1,
            of = plan.len(),
            start = window.start,
            end = window.end,
            pad = window.pad,
            "inferring window"
        );
        let frames = frames_to_tensor::<B>(
            window.frame_indices().map(|index| &sequence.frames[index]),
            device,
        )?;
        let output = model.infer(frames, params)?;
        stitcher.push(WindowResult::from_inference(window, output)?)?;
    }

    stitcher.finish()
}

/// Preprocesses, infers and writes one sequence. Returns the written path.
pub fn process_sequence<B: Backend, M: DepthInfer<B> + ?Sized>(
    model: &M,
    sequence: FrameSequence,
    config: &RunConfig,
    output_dir: &Path,
    device: &B::Device,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    let sequence = preprocess(sequence, config.max_resolution)?;
    let stitched = infer_sequence::<B, M>(model, &sequence, &config.params, device, cancel)?;
    let merged = merge_output(&stitched)?;
    write_output(output_dir, &sequence.name, &merged, sequence.fps)
}

/// Reads `input` (image, directory or video) and processes it into `output_dir`.
pub fn process_path<B: Backend, M: DepthInfer<B> + ?Sized>(
    model: &M,
    input: &Path,
    config: &RunConfig,
    output_dir: &Path,
    device: &B::Device,
    cancel: &CancelToken,
) -> Result<Vec<PathBuf>> {
    config.params.window.validate()?;

    if config.dir_mode == DirMode::Each && MediaKind::detect(input)? == MediaKind::Directory {
        let images = media::list_image_dir(input)?;
        if images.is_empty() {
            return Err(DepthVideoError::InvalidInput(format!(
                "`{}` contains no images",
                input.display()
            )));
        }

        // Outputs are named by stem, so `a.png` and `a.jpg` would overwrite each other.
        let mut stems = HashMap::new();
        for path in &images {
            if let Some(earlier) = stems.insert(media::stem_of(path), path) {
                return Err(DepthVideoError::InvalidInput(format!(
                    "`{}` and `{}` would both be written as `{}.png`",
                    earlier.display(),
                    path.display(),
                    media::stem_of(path)
                )));
            }
        }

        let mut written = Vec::with_capacity(images.len());
        for path in images {
            if cancel.is_cancelled() {
                return Err(DepthVideoError::Cancelled);
            }
            info!(path = %path.display(), "processing image");
            let sequence = media::read_image(&path)?;
            written.push(process_sequence::<B, M>(
                model, sequence, config, output_dir, device, cancel,
            )?);
        }
        return Ok(written);
    }

    let max_frames = config.max_frames.resolve(&config.params.window);
    let sequence = media::read_media(input, max_frames)?;
    process_sequence::<B, M>(model, sequence, config, output_dir, device, cancel)
        .map(|path| vec![path])
}
