use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{ImageError, ImageFormat, Rgb, RgbImage};
use tracing::{debug, info, warn};

use crate::{
    blend::StitchedOutput,
    error::{DepthVideoError, Result},
    ffmpeg::VideoEncoder,
    inference::FrameOutput,
};

/// Frame rate for multi-frame output whose source had none (image directories).
pub const DEFAULT_FPS: f32 = 30.0;

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Image on the left, colored disparity on the right: a `2W x H` frame.
pub fn merge_side_by_side(frame: &FrameOutput, width: usize, height: usize) -> Result<RgbImage> {
    let hw = width * height;
    if frame.image.len() != 3 * hw || frame.colored.len() != 3 * hw {
        return Err(DepthVideoError::InvalidInput(format!(
            "frame planes ({}, {}) do not match {width}x{height}",
            frame.image.len(),
            frame.colored.len()
        )));
    }

    let (out_width, out_height) = (
        u32::try_from(2 * width).map_err(|_| {
            DepthVideoError::InvalidInput(format!("output width {} overflows", 2 * width))
        })?,
        u32::try_from(height).map_err(|_| {
            DepthVideoError::InvalidInput(format!("output height {height} overflows"))
        })?,
    );

    Ok(RgbImage::from_fn(out_width, out_height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let (plane, column) = if x < width {
            (&frame.image, x)
        } else {
            (&frame.colored, x - width)
        };
        let idx = y * width + column;
        Rgb([
            to_u8(plane[idx]),
            to_u8(plane[hw + idx]),
            to_u8(plane[2 * hw + idx]),
        ])
    }))
}

pub fn merge_output(output: &StitchedOutput) -> Result<Vec<RgbImage>> {
    output
        .frames
        .iter()
        .map(|frame| merge_side_by_side(frame, output.width, output.height))
        .collect()
}

pub fn write_image(path: &Path, frame: &RgbImage) -> Result<()> {
    frame
        .save_with_format(path, ImageFormat::Png)
        .map_err(|err| match err {
            ImageError::IoError(source) => DepthVideoError::io(path, source),
            other => DepthVideoError::Image(other),
        })
}

pub fn write_video(path: &Path, frames: &[RgbImage], fps: f32) -> Result<()> {
    let Some(first) = frames.first() else {
        return Err(DepthVideoError::InvalidInput(
            "cannot encode a video without frames".to_string(),
        ));
    };

    let mut encoder = VideoEncoder::spawn(path, first.width(), first.height(), fps)?;
    for frame in frames {
        encoder.write_frame(frame)?;
    }
    encoder.finish()
}

/// Where `write_output` puts a result named `name` with `frame_count` frames.
pub fn output_path(dir: &Path, name: &str, frame_count: usize) -> PathBuf {
    let extension = if frame_count == 1 { "png" } else { "mp4" };
    dir.join(format!("{name}.{extension}"))
}

/// Writes one PNG for a single frame, otherwise an MP4 at `fps` (or [`DEFAULT_FPS`]).
///
/// Output goes to a hidden sibling first and is renamed into place, so a failed
/// write leaves nothing behind.
pub fn write_output(
    dir: &Path,
    name: &str,
    frames: &[RgbImage],
    fps: Option<f32>,
) -> Result<PathBuf> {
    if frames.is_empty() {
        return Err(DepthVideoError::InvalidInput(
            "nothing to write: zero frames".to_string(),
        ));
    }

    fs::create_dir_all(dir).map_err(|err| DepthVideoError::io(dir, err))?;

    let target = output_path(dir, name, frames.len());
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = dir.join(format!(".{file_name}.partial"));

    let written = if frames.len() == 1 {
        write_image(&partial, &frames[0])
    } else {
        let fps = fps.filter(|fps| *fps > 0.0).unwrap_or(DEFAULT_FPS);
        debug!(frames = frames.len(), fps, "encoding video");
        write_video(&partial, frames, fps)
    };

    if let Err(err) = written {
        if partial.exists() {
            if let Err(cleanup) = fs::remove_file(&partial) {
                warn!(path = %partial.display(), %cleanup, "failed to remove partial output");
            }
        }
        return Err(err);
    }

    fs::rename(&partial, &target).map_err(|err| DepthVideoError::io(&target, err))?;
    info!(path = %target.display(), frames = frames.len(), "saved output");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_one() -> FrameOutput {
        // image pixels: red, green; colored pixels: blue, white
        FrameOutput {
            image: vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
            disparity: vec![0.0, 1.0],
            colored: vec![0.0, 1.0, 0.0, 1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn side_by_side_places_image_left_and_colors_right() {
        let merged = merge_side_by_side(&two_by_one(), 2, 1).unwrap();
        assert_eq!(merged.dimensions(), (4, 1));
        assert_eq!(merged.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(merged.get_pixel(1, 0), &Rgb([0, 255, 0]));
        assert_eq!(merged.get_pixel(2, 0), &Rgb([0, 0, 255]));
        assert_eq!(merged.get_pixel(3, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn side_by_side_rejects_wrong_plane_size() {
        assert!(merge_side_by_side(&two_by_one(), 3, 1).is_err());
    }

    #[test]
    fn single_frame_roundtrips_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let frame = RgbImage::from_fn(16, 8, |x, y| Rgb([x as u8 * 15, y as u8 * 30, 7]));

        let path = write_output(dir.path(), "still", &[frame.clone()], None).unwrap();
        assert_eq!(path, dir.path().join("still.png"));

        let read_back = image::open(&path).unwrap().to_rgb8();
        assert_eq!(read_back, frame);
        assert!(!dir.path().join(".still.png.partial").exists());
    }

    #[test]
    fn missing_output_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let frame = RgbImage::new(2, 2);
        let path = write_output(&nested, "x", &[frame], None).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn multi_frame_output_is_named_mp4() {
        let dir = Path::new("out");
        assert_eq!(output_path(dir, "clip", 1), dir.join("clip.png"));
        assert_eq!(output_path(dir, "clip", 12), dir.join("clip.mp4"));
    }

    #[test]
    fn unwritable_output_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = write_output(&blocker, "x", &[RgbImage::new(2, 2)], None).unwrap_err();
        assert!(matches!(err, DepthVideoError::Io { .. }));
    }

    #[test]
    fn empty_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            write_output(dir.path(), "x", &[], None),
            Err(DepthVideoError::InvalidInput(_))
        ));
    }
}
