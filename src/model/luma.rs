use std::path::Path;

use burn::{
    module::{Module, Param},
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};
use tracing::{debug, info};

use crate::{
    colormap::{colorize_planar, normalize_min_max},
    error::{self, DepthVideoError},
    inference::{DepthInfer, DepthInference, InferenceParams},
};

/// Rec. 601 luma weights.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

#[derive(Config, Debug)]
pub struct LumaDisparityConfig {
    /// Treat dark pixels as near instead of bright ones.
    #[config(default = false)]
    pub invert: bool,
    /// Stretch each window's disparity to the full `[0, 1]` range.
    #[config(default = false)]
    pub normalize: bool,
}

impl LumaDisparityConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LumaDisparity<B> {
        LumaDisparity::new(device, self.clone())
    }
}

/// Checkpoint-optional disparity proxy: a 1x1 projection of RGB onto one channel.
///
/// Untrained, the projection is plain luma, which lets the whole driver run
/// without the pretrained diffusion weights. A burn record saved from this
/// module (or fitted elsewhere) can replace the projection.
#[derive(Module, Debug)]
pub struct LumaDisparity<B: Backend> {
    projection: Conv2d<B>,
    invert: bool,
    normalize: bool,
}

impl<B: Backend> LumaDisparity<B> {
    pub fn new(device: &B::Device, config: LumaDisparityConfig) -> Self {
        let mut projection = Conv2dConfig::new([3, 1], [1, 1])
            .with_bias(false)
            .init(device);
        let weight =
            Tensor::<B, 1>::from_floats(LUMA_WEIGHTS.as_slice(), device).reshape([1, 3, 1, 1]);
        projection.weight = Param::from_tensor(weight);

        Self {
            projection,
            invert: config.invert,
            normalize: config.normalize,
        }
    }

    /// Loads a full-precision record; parameters stay `f32` whatever the record held.
    pub fn load(
        device: &B::Device,
        config: LumaDisparityConfig,
        checkpoint: &Path,
    ) -> error::Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = Self::new(device, config)
            .load_file(checkpoint, &recorder, device)
            .map_err(|err| {
                DepthVideoError::Configuration(format!(
                    "failed to load checkpoint `{}`: {err}",
                    checkpoint.display()
                ))
            })?;
        info!(checkpoint = %checkpoint.display(), "loaded luma disparity weights");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> error::Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path, &recorder)
            .map_err(|err| DepthVideoError::Inference(format!("failed to save record: {err}")))
    }

    /// `[T, 3, H, W]` → `[T, H, W]`, processed `chunk` frames at a time.
    pub fn disparity(&self, frames: Tensor<B, 4>, chunk: usize) -> Tensor<B, 3> {
        let [count, _, height, width] = frames.dims();
        let chunk = chunk.clamp(1, count.max(1));

        let mut outputs = Vec::with_capacity(count.div_ceil(chunk));
        let mut start = 0;
        while start < count {
            let len = chunk.min(count - start);
            let projected = self
                .projection
                .forward(frames.clone().narrow(0, start, len))
                .clamp(0.0, 1.0);
            let projected = if self.invert {
                projected.neg().add_scalar(1.0)
            } else {
                projected
            };
            outputs.push(projected);
            start += len;
        }

        Tensor::cat(outputs, 0).reshape([count, height, width])
    }
}

impl<B: Backend> DepthInfer<B> for LumaDisparity<B> {
    fn name(&self) -> &str {
        "luma-disparity"
    }

    fn infer(
        &self,
        frames: Tensor<B, 4>,
        params: &InferenceParams,
    ) -> error::Result<DepthInference<B>> {
        let [count, channels, height, width] = frames.dims();
        if channels != 3 || count == 0 || height == 0 || width == 0 {
            return Err(DepthVideoError::Inference(format!(
                "expected [T, 3, H, W] frames, got {:?}",
                frames.dims()
            )));
        }

        debug!(
            frames = count,
            chunk = params.decode_chunk_size,
            "luma disparity forward"
        );
        let device = frames.device();
        let disparity = self.disparity(frames.clone(), params.decode_chunk_size);

        let mut values = disparity
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| DepthVideoError::Inference(format!("{err:?}")))?;
        if self.normalize {
            normalize_min_max(&mut values);
        }

        let hw = height * width;
        let colored: Vec<f32> = values.chunks_exact(hw).flat_map(colorize_planar).collect();

        Ok(DepthInference {
            image: frames,
            disparity: Tensor::<B, 1>::from_floats(values.as_slice(), &device)
                .reshape([count, height, width]),
            disparity_colored: Tensor::<B, 1>::from_floats(colored.as_slice(), &device)
                .reshape([count, 3, height, width]),
        })
    }
}
