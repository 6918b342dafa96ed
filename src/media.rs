use std::{
    fs,
    path::{Path, PathBuf},
};

use image::RgbImage;
use tracing::{debug, info};

use crate::{
    error::{DepthVideoError, Result},
    ffmpeg,
};

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm"];

/// Ordered frames of one input, plus the source frame rate for video.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSequence {
    /// Input basename without extension; names the output file.
    pub name: String,
    pub frames: Vec<RgbImage>,
    pub fps: Option<f32>,
}

impl FrameSequence {
    pub fn new(name: impl Into<String>, frames: Vec<RgbImage>) -> Self {
        Self {
            name: name.into(),
            frames,
            fps: None,
        }
    }

    pub fn with_fps(mut self, fps: Option<f32>) -> Self {
        self.fps = fps;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(RgbImage::dimensions)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Directory,
    Image,
    Video,
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_image_path(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

impl MediaKind {
    pub fn detect(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|err| DepthVideoError::io(path, err))?;
        if metadata.is_dir() {
            return Ok(Self::Directory);
        }

        match extension_of(path) {
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => Ok(Self::Image),
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => Ok(Self::Video),
            _ => Err(DepthVideoError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Basename of `path` without its extension.
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn load_rgb(path: &Path) -> Result<RgbImage> {
    let bytes = fs::read(path).map_err(|err| DepthVideoError::io(path, err))?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image.to_rgb8())
}

pub fn read_image(path: &Path) -> Result<FrameSequence> {
    let frame = load_rgb(path)?;
    debug!(
        path = %path.display(),
        width = frame.width(),
        height = frame.height(),
        "read image"
    );
    Ok(FrameSequence::new(stem_of(path), vec![frame]))
}

/// Supported image files directly inside `dir`, sorted by file name.
pub fn list_image_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| DepthVideoError::io(dir, err))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| DepthVideoError::io(dir, err))?;
        let path = entry.path();
        if path.is_file() && is_image_path(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn read_image_dir(dir: &Path) -> Result<FrameSequence> {
    let paths = list_image_dir(dir)?;
    if paths.is_empty() {
        return Err(DepthVideoError::InvalidInput(format!(
            "`{}` contains no {} images",
            dir.display(),
            IMAGE_EXTENSIONS.join("/")
        )));
    }

    let frames = paths
        .iter()
        .map(|path| load_rgb(path))
        .collect::<Result<Vec<_>>>()?;
    info!(dir = %dir.display(), frames = frames.len(), "read image directory");
    Ok(FrameSequence::new(stem_of(dir), frames))
}

pub fn read_video(path: &Path, max_frames: Option<usize>) -> Result<FrameSequence> {
    if max_frames == Some(0) {
        return Err(DepthVideoError::Configuration(
            "max_frames must be positive".to_string(),
        ));
    }

    let video = ffmpeg::probe(path)?;
    let frames = ffmpeg::decode_frames(path, &video, max_frames)?;
    if frames.is_empty() {
        return Err(DepthVideoError::InvalidInput(format!(
            "`{}` decoded to zero frames",
            path.display()
        )));
    }

    info!(
        path = %path.display(),
        frames = frames.len(),
        width = video.width,
        height = video.height,
        fps = ?video.fps,
        "read video"
    );
    Ok(FrameSequence::new(stem_of(path), frames).with_fps(video.fps))
}

/// Reads `path` as whatever [`MediaKind`] it is.
pub fn read_media(path: &Path, max_frames: Option<usize>) -> Result<FrameSequence> {
    match MediaKind::detect(path)? {
        MediaKind::Directory => read_image_dir(path),
        MediaKind::Image => read_image(path),
        MediaKind::Video => read_video(path, max_frames),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn save_solid(path: &Path, value: u8) {
        RgbImage::from_pixel(8, 4, Rgb([value, value, value]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn detects_kinds_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.PNG");
        let video = dir.path().join("clip.mp4");
        let other = dir.path().join("notes.txt");
        save_solid(&image, 1);
        fs::write(&video, b"").unwrap();
        fs::write(&other, b"").unwrap();

        assert_eq!(MediaKind::detect(dir.path()).unwrap(), MediaKind::Directory);
        assert_eq!(MediaKind::detect(&image).unwrap(), MediaKind::Image);
        assert_eq!(MediaKind::detect(&video).unwrap(), MediaKind::Video);
        assert!(matches!(
            MediaKind::detect(&other),
            Err(DepthVideoError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            MediaKind::detect(&missing),
            Err(DepthVideoError::Io { .. })
        ));
    }

    #[test]
    fn directory_frames_are_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        save_solid(&dir.path().join("frame_002.png"), 2);
        save_solid(&dir.path().join("frame_000.png"), 0);
        save_solid(&dir.path().join("frame_001.jpg"), 1);
        fs::write(dir.path().join("readme.md"), b"skip").unwrap();

        let sequence = read_image_dir(dir.path()).unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.fps, None);
        assert_eq!(sequence.frames[0].get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(sequence.frames[2].get_pixel(0, 0), &Rgb([2, 2, 2]));
    }

    #[test]
    fn empty_directory_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_image_dir(dir.path()),
            Err(DepthVideoError::InvalidInput(_))
        ));
    }

    #[test]
    fn single_image_names_sequence_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("street.view.png");
        save_solid(&path, 9);

        let sequence = read_media(&path, None).unwrap();
        assert_eq!(sequence.name, "street.view");
        assert_eq!(sequence.dimensions(), Some((8, 4)));
    }

    #[test]
    fn zero_frame_cap_is_rejected_before_decoding() {
        assert!(matches!(
            read_video(Path::new("does-not-matter.mp4"), Some(0)),
            Err(DepthVideoError::Configuration(_))
        ));
    }
}
