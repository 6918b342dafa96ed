use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use tracing::debug;

use crate::{
    error::{DepthVideoError, Result},
    media::FrameSequence,
};

/// Frame dimensions must be a multiple of this for the patch-based model.
pub const ALIGNMENT: u32 = 64;

/// Downscales `frame` so its longer side is at most `max_resolution`. Never upscales.
pub fn resize_max(frame: &RgbImage, max_resolution: u32) -> Result<RgbImage> {
    if max_resolution == 0 {
        return Err(DepthVideoError::Configuration(
            "max_resolution must be positive".to_string(),
        ));
    }

    let (width, height) = frame.dimensions();
    let longer = width.max(height);
    if longer <= max_resolution {
        return Ok(frame.clone());
    }

    let scale = max_resolution as f64 / longer as f64;
    let scaled_width = ((width as f64 * scale).round() as u32).clamp(1, max_resolution);
    let scaled_height = ((height as f64 * scale).round() as u32).clamp(1, max_resolution);

    Ok(imageops::resize(
        frame,
        scaled_width,
        scaled_height,
        FilterType::CatmullRom,
    ))
}

/// Center-crops both dimensions down to the nearest multiple of `multiple`.
pub fn crop_to_multiple(frame: &RgbImage, multiple: u32) -> Result<RgbImage> {
    let (width, height) = frame.dimensions();
    if width < multiple || height < multiple {
        return Err(DepthVideoError::InvalidInput(format!(
            "frame {width}x{height} is smaller than the {multiple}px alignment"
        )));
    }

    let target_width = width - width % multiple;
    let target_height = height - height % multiple;
    if target_width == width && target_height == height {
        return Ok(frame.clone());
    }

    let x = (width - target_width) / 2;
    let y = (height - target_height) / 2;
    Ok(imageops::crop_imm(frame, x, y, target_width, target_height).to_image())
}

/// Resizes and aligns every frame of `sequence`; all frames must end up the same size.
pub fn preprocess(mut sequence: FrameSequence, max_resolution: u32) -> Result<FrameSequence> {
    let mut expected = None;

    for (index, frame) in sequence.frames.iter_mut().enumerate() {
        let resized = resize_max(frame, max_resolution)?;
        let aligned = crop_to_multiple(&resized, ALIGNMENT)?;
        let dims = aligned.dimensions();

        match expected {
            None => expected = Some(dims),
            Some(first) if first != dims => {
                return Err(DepthVideoError::InvalidInput(format!(
                    "frame {index} preprocesses to {}x{}, expected {}x{}",
                    dims.0, dims.1, first.0, first.1
                )));
            }
            Some(_) => {}
        }

        *frame = aligned;
    }

    if let Some((width, height)) = expected {
        debug!(
            frames = sequence.frames.len(),
            width, height, "preprocessed frame sequence"
        );
    }

    Ok(sequence)
}
