use tracing::debug;

use crate::{
    error::{DepthVideoError, Result},
    inference::{FrameOutput, WindowResult},
    window::WindowPlan,
};

/// Weight of the later window at position `position` of an `overlap`-frame blend.
///
/// The ramp excludes both endpoints, so every blended frame mixes both windows
/// and `weight + (1 - weight) == 1`.
pub fn blend_weight(position: usize, overlap: usize) -> f32 {
    (position + 1) as f32 / (overlap + 1) as f32
}

fn lerp_into(dst: &mut [f32], src: &[f32], weight: f32) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = *d * (1.0 - weight) + s * weight;
    }
}

fn blend_frame(earlier: &mut FrameOutput, later: &FrameOutput, weight: f32) {
    lerp_into(&mut earlier.image, &later.image, weight);
    lerp_into(&mut earlier.disparity, &later.disparity, weight);
    lerp_into(&mut earlier.colored, &later.colored, weight);
}

/// One output per input frame, in input order.
#[derive(Clone, Debug)]
pub struct StitchedOutput {
    pub width: usize,
    pub height: usize,
    pub frames: Vec<FrameOutput>,
}

impl StitchedOutput {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Assembles window results, in plan order, into a [`StitchedOutput`].
#[derive(Debug)]
pub struct Stitcher {
    plan: WindowPlan,
    slots: Vec<Option<FrameOutput>>,
    dims: Option<(usize, usize)>,
    next_window: usize,
}

impl Stitcher {
    pub fn new(plan: WindowPlan) -> Self {
        Self {
            slots: vec![None; plan.total()],
            plan,
            dims: None,
            next_window: 0,
        }
    }

    pub fn windows_merged(&self) -> usize {
        self.next_window
    }

    pub fn is_complete(&self) -> bool {
        self.next_window == self.plan.len()
    }

    pub fn push(&mut self, result: WindowResult) -> Result<()> {
        let window = result.window;
        if self.plan.window(self.next_window) != Some(window) {
            return Err(DepthVideoError::InvalidInput(format!(
                "window {} ({}..{}) arrived out of order; expected window {}",
                window.index, window.start, window.end, self.next_window
            )));
        }
        if result.frames.len() != window.len() {
            return Err(DepthVideoError::InvalidInput(format!(
                "window {} carries {} frames, expected {}",
                window.index,
                result.frames.len(),
                window.len()
            )));
        }

        let dims = (result.width, result.height);
        match self.dims {
            None => self.dims = Some(dims),
            Some(expected) if expected != dims => {
                return Err(DepthVideoError::InvalidInput(format!(
                    "window {} is {}x{}, earlier windows were {}x{}",
                    window.index, dims.0, dims.1, expected.0, expected.1
                )));
            }
            Some(_) => {}
        }

        for (local, frame) in result.frames.into_iter().enumerate() {
            let global = window.start + local;
            let slot = &mut self.slots[global];

            if local < window.overlap {
                let Some(earlier) = slot.as_mut() else {
                    return Err(DepthVideoError::InvalidInput(format!(
                        "frame {global} is blended before any window produced it"
                    )));
                };
                blend_frame(earlier, &frame, blend_weight(local, window.overlap));
            } else if slot.is_some() {
                return Err(DepthVideoError::InvalidInput(format!(
                    "frame {global} written twice outside an overlap"
                )));
            } else {
                *slot = Some(frame);
            }
        }

        debug!(
            window = window.index,
            start = window.start,
            end = window.end,
            blended = window.overlap,
            "stitched window"
        );
        self.next_window += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<StitchedOutput> {
        let (width, height) = self.dims.unwrap_or_default();
        let total = self.slots.len();

        let frames = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    DepthVideoError::InvalidInput(format!(
                        "frame {index} of {total} was never produced"
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(StitchedOutput {
            width,
            height,
            frames,
        })
    }
}
