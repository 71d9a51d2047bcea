pub mod granular;
pub mod tracker;

// Constants for the pitch tracker
pub const WINDOW_LENGTH: usize = 2048;
pub const HOP_LENGTH: usize = 64;
pub const MIN_F0: f32 = 55.0;
pub const MAX_F0: f32 = 2200.0;
pub const CONFIDENCE_THRESHOLD: f32 = 0.3;
pub const NOISE_FLOOR: f32 = 1e-6;
pub const PEAK_THRESHOLD: f32 = 0.9;

// Constants for the granular shifter
pub const GRAIN_COUNT: usize = 4;
pub const MIN_RATIO: f32 = 0.5;
pub const MAX_RATIO: f32 = 2.0;
/// Covers one period down to about 43 Hz at 44.1 kHz.
pub const SEARCH_SAMPLES: usize = 1024;
pub const MATCH_SAMPLES: usize = 512;

/// Clamps a pitch ratio into the range the shifter is built for.
/// Non-finite ratios fall back to no shift.
pub fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.clamp(MIN_RATIO, MAX_RATIO)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_sane() {
        assert!(MIN_F0 > 0.0);
        assert!(MAX_F0 > MIN_F0);
        assert!(WINDOW_LENGTH.is_power_of_two());
        assert!(HOP_LENGTH > 0 && HOP_LENGTH <= WINDOW_LENGTH);
        assert!(CONFIDENCE_THRESHOLD > 0.0 && CONFIDENCE_THRESHOLD < 1.0);
        assert!(MIN_RATIO < 1.0 && MAX_RATIO > 1.0);
    }

    #[test]
    fn test_clamp_ratio() {
        assert_eq!(clamp_ratio(3.0), MAX_RATIO);
        assert_eq!(clamp_ratio(0.1), MIN_RATIO);
        assert_eq!(clamp_ratio(1.25), 1.25);
        assert_eq!(clamp_ratio(f32::NAN), 1.0);
        assert_eq!(clamp_ratio(f32::INFINITY), 1.0);
    }
}
