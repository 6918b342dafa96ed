use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, DepthVideoError>;

#[derive(Debug, thiserror::Error)]
pub enum DepthVideoError {
    #[error("unsupported input format `{}`", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("depth inference failed: {0}")]
    Inference(String),

    #[error("media tool failed: {0}")]
    Media(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("run cancelled")]
    Cancelled,
}

impl DepthVideoError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
