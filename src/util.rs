pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Linearly re-maps `value` from `[start1, stop1]` onto `[start2, stop2]`.
    ///
    /// Values outside the source range extrapolate; nothing is clamped.
    pub fn map_range(value: f32, start1: f32, stop1: f32, start2: f32, stop2: f32) -> f32 {
        start2 + (stop2 - start2) * (value - start1) / (stop1 - start1)
    }
}

#[cfg(test)]
mod tests {
    use super::math::*;
    use approx::assert_relative_eq;

    #[test]
    fn degrees_convert_to_radians() {
        assert_relative_eq!(degree_to_radian(180.0), std::f32::consts::PI);
        assert_relative_eq!(degree_to_radian(75.0), 1.308_997, epsilon = 1e-5);
    }

    #[test]
    fn red_channel_maps_onto_depth_range() {
        assert_relative_eq!(map_range(0.0, 0.0, 255.0, -100.0, 100.0), -100.0);
        assert_relative_eq!(map_range(255.0, 0.0, 255.0, -100.0, 100.0), 100.0);
        assert_relative_eq!(map_range(127.5, 0.0, 255.0, -100.0, 100.0), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn map_range_is_monotonic() {
        let mut previous = f32::MIN;
        for red in 0..=255u8 {
            let depth = map_range(red as f32, 0.0, 255.0, -100.0, 100.0);
            assert!(depth > previous);
            previous = depth;
        }
    }
}
