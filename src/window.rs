use serde::{Deserialize, Serialize};

use crate::error::{DepthVideoError, Result};

/// How the final, short window of a plan is filled up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PadMode {
    /// Repeat the last frame until the window holds `window_len` frames.
    #[default]
    Full,
    /// Repeat the last frame until the window holds an even number of frames (at least 2).
    Even,
}

/// Windowing parameters shared by the planner, the stitcher and the model.
///
/// A segment is `num_interp_frames + 2` frames: two keyframes and the frames
/// interpolated between them. Consecutive segments share `num_overlap_frames`
/// frames, and one window batches `num_frames / 2` segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    pub num_frames: usize,
    pub num_interp_frames: usize,
    pub num_overlap_frames: usize,
    #[serde(default)]
    pub pad_mode: PadMode,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(32, 16, 6)
    }
}

impl WindowConfig {
    pub fn new(num_frames: usize, num_interp_frames: usize, num_overlap_frames: usize) -> Self {
        Self {
            num_frames,
            num_interp_frames,
            num_overlap_frames,
            pad_mode: PadMode::Full,
        }
    }

    pub fn with_pad_mode(mut self, pad_mode: PadMode) -> Self {
        self.pad_mode = pad_mode;
        self
    }

    pub fn max_overlap_frames(&self) -> usize {
        (self.num_interp_frames + 3) / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 || self.num_frames % 2 != 0 {
            return Err(DepthVideoError::Configuration(format!(
                "num_frames must be a positive even number, got {}",
                self.num_frames
            )));
        }

        let max_overlap = self.max_overlap_frames();
        if self.num_overlap_frames < 2 || self.num_overlap_frames > max_overlap {
            return Err(DepthVideoError::Configuration(format!(
                "num_overlap_frames must lie in [2, {max_overlap}] for num_interp_frames = {}, got {}",
                self.num_interp_frames, self.num_overlap_frames
            )));
        }

        Ok(())
    }

    /// Distance between the starts of two consecutive segments.
    pub fn step(&self) -> usize {
        (self.num_interp_frames + 2).saturating_sub(self.num_overlap_frames)
    }

    /// Distance between the starts of two consecutive windows.
    ///
    /// Never below `num_overlap_frames`, so at most two windows cover a frame.
    pub fn stride(&self) -> usize {
        (self.step() * (self.num_frames / 2)).max(self.num_overlap_frames)
    }

    /// Frames handed to the model per call.
    pub fn window_len(&self) -> usize {
        self.stride() + self.num_overlap_frames
    }

    pub fn plan(&self, total: usize) -> Result<WindowPlan> {
        self.validate()?;
        if total == 0 {
            return Err(DepthVideoError::InvalidInput(
                "cannot plan windows over an empty frame sequence".to_string(),
            ));
        }

        Ok(WindowPlan {
            config: *self,
            total,
        })
    }
}

/// Half-open range `[start, end)` of real frames, followed by `pad` copies of frame `end - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub pad: usize,
    /// Frames at the head of this window shared with the previous window.
    pub overlap: usize,
}

impl Window {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn padded_len(&self) -> usize {
        self.len() + self.pad
    }

    /// Source index of every frame the model receives, padding included.
    pub fn frame_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let last = self.end.saturating_sub(1);
        (self.start..self.end).chain(std::iter::repeat_n(last, self.pad))
    }
}

/// A validated windowing of `total` frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowPlan {
    config: WindowConfig,
    total: usize,
}

impl WindowPlan {
    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        let overlap = self.config.num_overlap_frames;
        if self.total <= overlap {
            return 1;
        }
        (self.total - overlap).div_ceil(self.config.stride()).max(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> Windows {
        Windows {
            plan: *self,
            next: 0,
        }
    }

    pub fn window(&self, index: usize) -> Option<Window> {
        if index >= self.len() {
            return None;
        }

        let window_len = self.config.window_len();
        let start = index * self.config.stride();
        let end = (start + window_len).min(self.total);
        let len = end - start;

        let pad = if len == window_len {
            0
        } else {
            let target = match self.config.pad_mode {
                PadMode::Even => (len + len % 2).max(2),
                PadMode::Full => window_len,
            };
            target - len
        };

        let overlap = if index == 0 {
            0
        } else {
            self.config.num_overlap_frames.min(len)
        };

        Some(Window {
            index,
            start,
            end,
            pad,
            overlap,
        })
    }
}

impl IntoIterator for &WindowPlan {
    type Item = Window;
    type IntoIter = Windows;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy iterator over the windows of a [`WindowPlan`].
#[derive(Clone, Debug)]
pub struct Windows {
    plan: WindowPlan,
    next: usize,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.plan.window(self.next)?;
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(plan: &WindowPlan) -> Vec<(usize, usize, usize)> {
        plan.iter().map(|w| (w.start, w.end, w.pad)).collect()
    }

    #[test]
    fn derived_quantities_follow_segment_layout() {
        let config = WindowConfig::new(32, 16, 6);
        assert_eq!(config.step(), 12);
        assert_eq!(config.stride(), 192);
        assert_eq!(config.window_len(), 198);
    }

    #[test]
    fn small_scenario_has_exact_bounds() {
        let plan = WindowConfig::new(4, 2, 2).plan(10).unwrap();
        assert_eq!(plan.config().step(), 2);
        assert_eq!(plan.config().window_len(), 6);
        assert_eq!(bounds(&plan), vec![(0, 6, 0), (4, 10, 0)]);

        let windows: Vec<_> = plan.iter().collect();
        assert_eq!(windows[0].overlap, 0);
        assert_eq!(windows[1].overlap, 2);
    }

    #[test]
    fn short_tail_is_padded_to_full_window_by_default() {
        let plan = WindowConfig::new(4, 2, 2).plan(11).unwrap();
        assert_eq!(bounds(&plan), vec![(0, 6, 0), (4, 10, 0), (8, 11, 3)]);

        let tail = plan.window(2).unwrap();
        assert_eq!(tail.padded_len(), plan.config().window_len());
        assert_eq!(
            tail.frame_indices().collect::<Vec<_>>(),
            vec![8, 9, 10, 10, 10, 10]
        );
    }

    #[test]
    fn every_window_reaches_the_model_at_full_length() {
        let configs = [
            WindowConfig::default(),
            WindowConfig::new(4, 2, 2),
            WindowConfig::new(6, 4, 3),
            WindowConfig::new(2, 5, 4),
        ];
        for config in configs {
            for total in [1, 2, 5, 11, 57, 100, 250] {
                let plan = config.plan(total).unwrap();
                for window in plan.iter() {
                    assert_eq!(
                        window.padded_len(),
                        config.window_len(),
                        "{config:?} total={total} window={window:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn even_pad_mode_pads_tail_to_even_count() {
        let plan = WindowConfig::new(4, 2, 2)
            .with_pad_mode(PadMode::Even)
            .plan(11)
            .unwrap();
        assert_eq!(bounds(&plan), vec![(0, 6, 0), (4, 10, 0), (8, 11, 1)]);

        let tail = plan.window(2).unwrap();
        assert_eq!(tail.padded_len(), 4);
        assert_eq!(tail.frame_indices().collect::<Vec<_>>(), vec![8, 9, 10, 10]);
    }

    #[test]
    fn single_frame_gets_one_padded_window() {
        let plan = WindowConfig::default().plan(1).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(bounds(&plan), vec![(0, 1, 197)]);

        let even = WindowConfig::default()
            .with_pad_mode(PadMode::Even)
            .plan(1)
            .unwrap();
        assert_eq!(bounds(&even), vec![(0, 1, 1)]);
    }

    #[test]
    fn input_shorter_than_window_is_one_window() {
        let plan = WindowConfig::default().plan(100).unwrap();
        assert_eq!(bounds(&plan), vec![(0, 100, 98)]);
    }

    #[test]
    fn plan_is_restartable() {
        let plan = WindowConfig::new(6, 4, 3).plan(40).unwrap();
        let first: Vec<_> = plan.iter().collect();
        let second: Vec<_> = plan.iter().collect();
        assert_eq!(first, second);
        assert_eq!(plan.iter().len(), first.len());
    }

    #[test]
    fn windows_cover_every_index_once_outside_overlaps() {
        let configs = [
            WindowConfig::new(4, 2, 2),
            WindowConfig::new(6, 4, 3),
            WindowConfig::new(2, 4, 2),
            WindowConfig::new(8, 16, 6),
            WindowConfig::new(4, 5, 4),
        ];

        for config in configs {
            for total in 1..120 {
                let plan = config.plan(total).unwrap();
                let mut hits = vec![0usize; total];
                for window in plan.iter() {
                    assert!(window.end <= total);
                    // Head overlap belongs to the previous window.
                    for index in window.start + window.overlap..window.end {
                        hits[index] += 1;
                    }
                }
                assert!(
                    hits.iter().all(|&count| count == 1),
                    "{config:?} total={total} hits={hits:?}"
                );
            }
        }
    }

    #[test]
    fn adjacent_windows_share_exactly_the_overlap() {
        let config = WindowConfig::new(6, 4, 3);
        let plan = config.plan(57).unwrap();
        let windows: Vec<_> = plan.iter().collect();
        for pair in windows.windows(2) {
            let shared = pair[0].end.saturating_sub(pair[1].start);
            assert_eq!(shared, config.num_overlap_frames);
            assert_eq!(pair[1].overlap, shared);
        }
    }

    #[test]
    fn overlap_below_two_is_rejected() {
        let err = WindowConfig::new(4, 2, 1).plan(10).unwrap_err();
        assert!(matches!(err, DepthVideoError::Configuration(_)));
    }

    #[test]
    fn overlap_above_bound_is_rejected() {
        let config = WindowConfig::new(32, 16, 10);
        assert_eq!(config.max_overlap_frames(), 9);
        assert!(matches!(
            config.validate(),
            Err(DepthVideoError::Configuration(_))
        ));
    }

    #[test]
    fn odd_num_frames_is_rejected() {
        assert!(matches!(
            WindowConfig::new(5, 2, 2).validate(),
            Err(DepthVideoError::Configuration(_))
        ));
        assert!(matches!(
            WindowConfig::new(0, 2, 2).validate(),
            Err(DepthVideoError::Configuration(_))
        ));
    }

    #[test]
    fn stride_is_widened_to_the_overlap() {
        // step = 5 + 2 - 4 = 3, one segment per window, widened to 4
        let config = WindowConfig::new(2, 5, 4);
        config.validate().unwrap();
        assert_eq!(config.step(), 3);
        assert_eq!(config.stride(), 4);
        assert_eq!(config.window_len(), 8);

        let plan = config.plan(20).unwrap();
        assert_eq!(
            bounds(&plan),
            vec![(0, 8, 0), (4, 12, 0), (8, 16, 0), (12, 20, 0)]
        );
    }

    #[test]
    fn single_segment_windows_cover_every_index() {
        for interp in 1..12 {
            let config = WindowConfig::new(2, interp, 2);
            for overlap in 2..=config.max_overlap_frames() {
                let config = WindowConfig::new(2, interp, overlap);
                for total in 1..80 {
                    let plan = config.plan(total).unwrap();
                    let mut hits = vec![0usize; total];
                    let windows: Vec<_> = plan.iter().collect();
                    for window in &windows {
                        for index in window.start + window.overlap..window.end {
                            hits[index] += 1;
                        }
                    }
                    assert!(
                        hits.iter().all(|&count| count == 1),
                        "{config:?} total={total} hits={hits:?}"
                    );
                    for pair in windows.windows(2) {
                        assert_eq!(pair[0].end - pair[1].start, overlap);
                    }
                }
            }
        }
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(matches!(
            WindowConfig::new(4, 2, 2).plan(0),
            Err(DepthVideoError::InvalidInput(_))
        ));
    }
}
