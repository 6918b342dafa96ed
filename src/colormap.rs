//! Disparity visualization.

/// ColorBrewer "Spectral", low to high.
const SPECTRAL: [[f32; 3]; 11] = [
    [0.619_608, 0.003_922, 0.258_824],
    [0.835_294, 0.243_137, 0.309_804],
    [0.956_863, 0.427_451, 0.262_745],
    [0.992_157, 0.682_353, 0.380_392],
    [0.996_078, 0.878_431, 0.545_098],
    [1.000_000, 1.000_000, 0.749_020],
    [0.901_961, 0.960_784, 0.596_078],
    [0.670_588, 0.866_667, 0.643_137],
    [0.400_000, 0.760_784, 0.647_059],
    [0.196_078, 0.533_333, 0.741_176],
    [0.368_627, 0.309_804, 0.635_294],
];

/// Maps `value` in `[0, 1]` onto the Spectral ramp. Non-finite values map to the low end.
pub fn spectral(value: f32) -> [f32; 3] {
    let value = if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    };

    let position = value * (SPECTRAL.len() - 1) as f32;
    let lower = (position.floor() as usize).min(SPECTRAL.len() - 2);
    let t = position - lower as f32;
    let (a, b) = (SPECTRAL[lower], SPECTRAL[lower + 1]);

    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Rescales finite values to `[0, 1]` by their min/max. Non-finite values become 0.
pub fn normalize_min_max(values: &mut [f32]) {
    let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
    for &value in values.iter() {
        if value.is_finite() {
            min = min.min(value);
            max = max.max(value);
        }
    }
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 1.0;
    }

    let range = (max - min).max(f32::EPSILON);
    for value in values.iter_mut() {
        *value = if value.is_finite() {
            ((*value - min) / range).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
}

/// Colors an `H·W` disparity plane into a channel-first `3·H·W` plane.
pub fn colorize_planar(disparity: &[f32]) -> Vec<f32> {
    let hw = disparity.len();
    let mut colored = vec![0.0f32; 3 * hw];
    for (idx, &value) in disparity.iter().enumerate() {
        let rgb = spectral(value);
        for channel in 0..3 {
            colored[channel * hw + idx] = rgb[channel];
        }
    }
    colored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rgb_close(actual: [f32; 3], expected: [f32; 3]) {
        for channel in 0..3 {
            assert!(
                (actual[channel] - expected[channel]).abs() < 1e-6,
                "{actual:?} != {expected:?}"
            );
        }
    }

    #[test]
    fn ramp_hits_control_points() {
        assert_rgb_close(spectral(0.0), SPECTRAL[0]);
        assert_rgb_close(spectral(0.5), SPECTRAL[5]);
        assert_rgb_close(spectral(1.0), SPECTRAL[10]);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        assert_rgb_close(spectral(-3.0), SPECTRAL[0]);
        assert_rgb_close(spectral(7.0), SPECTRAL[10]);
        assert_rgb_close(spectral(f32::NAN), SPECTRAL[0]);
    }

    #[test]
    fn min_max_handles_non_finite() {
        let mut values = [2.0, 4.0, f32::NAN, 3.0];
        normalize_min_max(&mut values);
        assert_eq!(values, [0.0, 1.0, 0.0, 0.5]);
    }

    #[test]
    fn colorize_is_channel_first() {
        let colored = colorize_planar(&[0.0, 1.0]);
        assert_eq!(colored.len(), 6);
        assert_rgb_close([colored[0], colored[2], colored[4]], SPECTRAL[0]);
        assert_rgb_close([colored[1], colored[3], colored[5]], SPECTRAL[10]);
    }
}
