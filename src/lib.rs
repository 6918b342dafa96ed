#![recursion_limit = "256"]

pub mod blend;
pub mod colormap;
pub mod error;
pub mod ffmpeg;
pub mod inference;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod window;
pub mod writer;

pub use error::{DepthVideoError, Result};
pub use inference::{DepthInfer, DepthInference, InferenceParams};
pub use pipeline::{CancelToken, DirMode, FrameLimit, RunConfig, process_path, process_sequence};
pub use window::{PadMode, WindowConfig, WindowPlan};

#[cfg(feature = "backend_cuda")]
pub type InferenceBackend = burn::backend::Cuda<f32>;

#[cfg(all(feature = "backend_wgpu", not(feature = "backend_cuda")))]
pub type InferenceBackend = burn::backend::Wgpu<f32>;

#[cfg(all(
    feature = "backend_ndarray",
    not(any(feature = "backend_wgpu", feature = "backend_cuda"))
))]
pub type InferenceBackend = burn::backend::NdArray<f32>;
