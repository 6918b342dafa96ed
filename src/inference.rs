use burn::prelude::*;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DepthVideoError, Result},
    window::{Window, WindowConfig},
};

/// Per-call settings forwarded to the depth model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub denoise_steps: usize,
    pub decode_chunk_size: usize,
    pub window: WindowConfig,
    pub seed: u64,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            denoise_steps: 3,
            decode_chunk_size: 16,
            window: WindowConfig::default(),
            seed: 0,
        }
    }
}

/// Model output for one window, aligned 1:1 with the frames it was given.
#[derive(Clone, Debug)]
pub struct DepthInference<B: Backend> {
    /// `[T, 3, H, W]` in `[0, 1]`.
    pub image: Tensor<B, 4>,
    /// `[T, H, W]` in `[0, 1]`, larger is nearer.
    pub disparity: Tensor<B, 3>,
    /// `[T, 3, H, W]` in `[0, 1]`.
    pub disparity_colored: Tensor<B, 4>,
}

/// A video depth model seen as one opaque capability.
///
/// `frames` is `[T, 3, H, W]` with samples in `[0, 1]`; `T` may include padded
/// repeats of the last frame. Implementations must return exactly `T` outputs.
pub trait DepthInfer<B: Backend> {
    fn name(&self) -> &str;

    fn infer(&self, frames: Tensor<B, 4>, params: &InferenceParams) -> Result<DepthInference<B>>;
}

/// Packs RGB frames into a channel-first `[T, 3, H, W]` tensor scaled to `[0, 1]`.
pub fn frames_to_tensor<'a, B: Backend>(
    frames: impl IntoIterator<Item = &'a RgbImage>,
    device: &B::Device,
) -> Result<Tensor<B, 4>> {
    let mut data = Vec::new();
    let mut dims = None;
    let mut count = 0usize;

    for frame in frames {
        let (width, height) = frame.dimensions();
        match dims {
            None => dims = Some((width, height)),
            Some(expected) if expected != (width, height) => {
                return Err(DepthVideoError::InvalidInput(format!(
                    "frame {count} is {width}x{height}, expected {}x{}",
                    expected.0, expected.1
                )));
            }
            Some(_) => {}
        }

        let hw = width as usize * height as usize;
        let offset = data.len();
        data.resize(offset + 3 * hw, 0.0f32);
        for (idx, pixel) in frame.pixels().enumerate() {
            for channel in 0..3 {
                data[offset + channel * hw + idx] = pixel[channel] as f32 / 255.0;
            }
        }
        count += 1;
    }

    let Some((width, height)) = dims else {
        return Err(DepthVideoError::InvalidInput(
            "cannot build a tensor from zero frames".to_string(),
        ));
    };

    Ok(
        Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([
            count as i32,
            3,
            height as i32,
            width as i32,
        ]),
    )
}

fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| DepthVideoError::Inference(format!("failed to read model output: {err:?}")))
}

/// Host-side outputs for one frame. Planes are channel-first.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutput {
    /// `3·H·W`
    pub image: Vec<f32>,
    /// `H·W`
    pub disparity: Vec<f32>,
    /// `3·H·W`
    pub colored: Vec<f32>,
}

/// Outputs of one window with padded positions already dropped.
#[derive(Clone, Debug)]
pub struct WindowResult {
    pub window: Window,
    pub width: usize,
    pub height: usize,
    pub frames: Vec<FrameOutput>,
}

impl WindowResult {
    pub fn from_inference<B: Backend>(window: Window, output: DepthInference<B>) -> Result<Self> {
        let [frames, channels, height, width] = output.image.dims();
        let expected = window.padded_len();

        if frames != expected || channels != 3 {
            return Err(DepthVideoError::Inference(format!(
                "model returned image shape {:?}, expected [{expected}, 3, H, W]",
                output.image.dims()
            )));
        }
        if output.disparity.dims() != [frames, height, width] {
            return Err(DepthVideoError::Inference(format!(
                "model returned disparity shape {:?}, expected {:?}",
                output.disparity.dims(),
                [frames, height, width]
            )));
        }
        if output.disparity_colored.dims() != [frames, 3, height, width] {
            return Err(DepthVideoError::Inference(format!(
                "model returned colored disparity shape {:?}, expected {:?}",
                output.disparity_colored.dims(),
                [frames, 3, height, width]
            )));
        }

        let hw = height * width;
        let image = tensor_values(output.image)?;
        let disparity = tensor_values(output.disparity)?;
        let colored = tensor_values(output.disparity_colored)?;

        let frames = (0..window.len())
            .map(|t| FrameOutput {
                image: image[t * 3 * hw..(t + 1) * 3 * hw].to_vec(),
                disparity: disparity[t * hw..(t + 1) * hw].to_vec(),
                colored: colored[t * 3 * hw..(t + 1) * 3 * hw].to_vec(),
            })
            .collect();

        Ok(Self {
            window,
            width,
            height,
            frames,
        })
    }
}
