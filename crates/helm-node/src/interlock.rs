/// Wraps any angle into `[0, 360)`.
pub fn normalize_degrees(angle: f32) -> f32 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if a >= 360.0 { 0.0 } else { a }
}

/// Shortest-arc distance between two headings, always within `[0, 180]`.
pub fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (normalize_degrees(a) - normalize_degrees(b)).abs();
    d.min(360.0 - d)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterlockInputs {
    pub commanded_angle: f32,
    pub actual_angle: f32,
    pub thrust_request: bool,
    pub connected: bool,
}

/// Relay may be energized only when every condition holds at once.
pub fn relay_enabled(inputs: &InterlockInputs, tolerance_deg: f32) -> bool {
    inputs.connected
        && inputs.thrust_request
        && circular_distance(inputs.commanded_angle, inputs.actual_angle) < tolerance_deg
}

/// Remembers the last level written to a digital output so unchanged
/// levels are not written again.
#[derive(Debug, Clone, Default)]
pub struct OutputLatch {
    level: Option<bool>,
}

impl OutputLatch {
    /// Returns the level to write, or `None` when the output already holds it.
    pub fn update(&mut self, level: bool) -> Option<bool> {
        if self.level == Some(level) {
            return None;
        }
        self.level = Some(level);
        Some(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f32 = 3.6;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn normalizes_negative_and_multi_turn() {
        assert!(close(normalize_degrees(-10.0), 350.0));
        assert!(close(normalize_degrees(725.0), 5.0));
        assert_eq!(normalize_degrees(360.0), 0.0);
        let tiny = normalize_degrees(-1e-7);
        assert!((0.0..360.0).contains(&tiny));
    }

    #[test]
    fn distance_matches_reference_and_stays_within_half_turn() {
        let angles = [-725.0f32, -360.0, -181.0, -1.0, 0.0, 2.0, 8.0, 10.0, 179.5, 180.0, 270.0, 358.0, 359.9, 720.0, 1000.0];
        for &a in &angles {
            for &b in &angles {
                let d = circular_distance(a, b);
                assert!((0.0..=180.0).contains(&d), "{} vs {} -> {}", a, b, d);
                let raw = (a - b).rem_euclid(360.0);
                let reference = raw.min(360.0 - raw);
                assert!(close(d, reference), "{} vs {}: {} != {}", a, b, d, reference);
                assert!(close(d, circular_distance(b, a)));
            }
        }
    }

    #[test]
    fn wrap_boundary_outside_tolerance_disables_relay() {
        let inputs = InterlockInputs { commanded_angle: 358.0, actual_angle: 2.0, thrust_request: true, connected: true };
        assert!(close(circular_distance(358.0, 2.0), 4.0));
        assert!(!relay_enabled(&inputs, TOL));
    }

    #[test]
    fn within_tolerance_enables_relay() {
        let inputs = InterlockInputs { commanded_angle: 10.0, actual_angle: 8.0, thrust_request: true, connected: true };
        assert!(close(circular_distance(10.0, 8.0), 2.0));
        assert!(relay_enabled(&inputs, TOL));
    }

    #[test]
    fn exhaustive_interlock_table() {
        for connected in [false, true] {
            for thrust_request in [false, true] {
                for (actual, aligned) in [(1.0f32, true), (359.0, true), (10.0, false), (180.0, false)] {
                    let inputs = InterlockInputs { commanded_angle: 0.0, actual_angle: actual, thrust_request, connected };
                    let expected = connected && thrust_request && aligned;
                    assert_eq!(relay_enabled(&inputs, TOL), expected, "{:?}", inputs);
                }
            }
        }
    }

    #[test]
    fn distance_equal_to_tolerance_is_not_within() {
        let inputs = InterlockInputs { commanded_angle: 4.0, actual_angle: 0.0, thrust_request: true, connected: true };
        assert!(!relay_enabled(&inputs, 4.0));
    }

    #[test]
    fn latch_writes_only_on_change() {
        let mut latch = OutputLatch::default();
        assert_eq!(latch.update(false), Some(false));
        assert_eq!(latch.update(false), None);
        assert_eq!(latch.update(true), Some(true));
        assert_eq!(latch.update(true), None);
        assert_eq!(latch.update(false), Some(false));
    }
}
