//! Tunable constants of the pitch core, gathered into validated config structs.

use anyhow::{Result, bail};

use crate::audio::autotune::granular::ColdStart;
use crate::audio::autotune::{
    CONFIDENCE_THRESHOLD, GRAIN_COUNT, HOP_LENGTH, MATCH_SAMPLES, MAX_F0, MAX_RATIO, MIN_F0,
    NOISE_FLOOR, PEAK_THRESHOLD, SEARCH_SAMPLES, WINDOW_LENGTH,
};

/// Pitch tracker settings. Frequencies are converted to lag bounds at
/// `prepare` time, so the same config works at any sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Analysis window length in samples (power of two).
    pub window_size: usize,
    /// Samples between two estimates.
    pub hop_size: usize,
    pub min_frequency_hz: f32,
    pub max_frequency_hz: f32,
    /// Minimum normalized correlation for a voiced estimate.
    pub confidence_threshold: f32,
    /// Mean energy per sample below which the window counts as silence.
    pub noise_floor: f32,
    /// A correlation peak within this fraction of the global maximum is
    /// preferred when it has a shorter lag (guards against octave errors).
    pub peak_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_LENGTH,
            hop_size: HOP_LENGTH,
            min_frequency_hz: MIN_F0,
            max_frequency_hz: MAX_F0,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            noise_floor: NOISE_FLOOR,
            peak_threshold: PEAK_THRESHOLD,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 64 || !self.window_size.is_power_of_two() {
            bail!(
                "window_size must be a power of two >= 64, got {}",
                self.window_size
            );
        }
        if self.hop_size == 0 || self.hop_size > self.window_size {
            bail!(
                "hop_size must be in 1..={}, got {}",
                self.window_size,
                self.hop_size
            );
        }
        if !(self.min_frequency_hz > 0.0 && self.min_frequency_hz < self.max_frequency_hz) {
            bail!(
                "frequency range must satisfy 0 < min < max, got {}..{}",
                self.min_frequency_hz,
                self.max_frequency_hz
            );
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold <= 1.0) {
            bail!(
                "confidence_threshold must be in (0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(self.peak_threshold > 0.0 && self.peak_threshold <= 1.0) {
            bail!(
                "peak_threshold must be in (0, 1], got {}",
                self.peak_threshold
            );
        }
        if !(self.noise_floor >= 0.0) {
            bail!("noise_floor must be >= 0, got {}", self.noise_floor);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShifterConfig {
    /// Nominal grain length in samples.
    pub grain_samples: usize,
    /// Number of overlapping grains, evenly staggered in phase.
    pub grain_count: usize,
    /// Largest ratio the history buffer is sized for.
    pub max_ratio: f32,
    /// Widest lag range searched when a grain restarts without a period hint.
    /// Should cover the longest expected period.
    pub search_samples: usize,
    /// Length of the segments compared during that search.
    pub match_samples: usize,
    pub cold_start: ColdStart,
}

impl Default for ShifterConfig {
    fn default() -> Self {
        Self {
            grain_samples: 1024,
            grain_count: GRAIN_COUNT,
            max_ratio: MAX_RATIO,
            search_samples: SEARCH_SAMPLES,
            match_samples: MATCH_SAMPLES,
            cold_start: ColdStart::PassThrough,
        }
    }
}

impl ShifterConfig {
    pub fn validate(&self) -> Result<()> {
        if !(32..=16384).contains(&self.grain_samples) {
            bail!(
                "grain_samples must be in 32..=16384, got {}",
                self.grain_samples
            );
        }
        // A single grain has zero weight at its restart.
        if !(2..=16).contains(&self.grain_count) {
            bail!("grain_count must be in 2..=16, got {}", self.grain_count);
        }
        if !(1.0..=4.0).contains(&self.max_ratio) {
            bail!("max_ratio must be in [1, 4], got {}", self.max_ratio);
        }
        if !(16..=8192).contains(&self.search_samples) {
            bail!(
                "search_samples must be in 16..=8192, got {}",
                self.search_samples
            );
        }
        if !(16..=4096).contains(&self.match_samples) {
            bail!(
                "match_samples must be in 16..=4096, got {}",
                self.match_samples
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutoTuneConfig {
    pub tracker: TrackerConfig,
    pub shifter: ShifterConfig,
    /// Retune time at 100 % speed.
    pub fast_retune_ms: f32,
    /// Retune time at 0 % speed.
    pub slow_retune_ms: f32,
    /// Jitter depth at 100 % humanize.
    pub max_humanize_cents: f32,
    /// Seed of the humanize jitter; identical seeds give identical output.
    pub seed: u64,
}

impl Default for AutoTuneConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            shifter: ShifterConfig::default(),
            fast_retune_ms: 1.0,
            slow_retune_ms: 400.0,
            max_humanize_cents: 15.0,
            seed: 0x5eed,
        }
    }
}

impl AutoTuneConfig {
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.shifter.validate()?;
        if !(self.fast_retune_ms > 0.0 && self.fast_retune_ms <= self.slow_retune_ms) {
            bail!(
                "retune times must satisfy 0 < fast <= slow, got {}..{}",
                self.fast_retune_ms,
                self.slow_retune_ms
            );
        }
        if !(0.0..=100.0).contains(&self.max_humanize_cents) {
            bail!(
                "max_humanize_cents must be in [0, 100], got {}",
                self.max_humanize_cents
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarmonizerConfig {
    pub shifter: ShifterConfig,
    /// Longest per-voice delay; delay lines are sized from it.
    pub max_delay_ms: f32,
}

impl Default for HarmonizerConfig {
    fn default() -> Self {
        Self {
            shifter: ShifterConfig {
                grain_samples: 2048,
                cold_start: ColdStart::Silence,
                ..ShifterConfig::default()
            },
            max_delay_ms: 500.0,
        }
    }
}

impl HarmonizerConfig {
    pub fn validate(&self) -> Result<()> {
        self.shifter.validate()?;
        if !(0.0..=2000.0).contains(&self.max_delay_ms) {
            bail!(
                "max_delay_ms must be in [0, 2000], got {}",
                self.max_delay_ms
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        TrackerConfig::default().validate().unwrap();
        ShifterConfig::default().validate().unwrap();
        AutoTuneConfig::default().validate().unwrap();
        HarmonizerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_tracker_rejects_bad_window() {
        let config = TrackerConfig {
            window_size: 1000,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracker_rejects_inverted_range() {
        let config = TrackerConfig {
            min_frequency_hz: 900.0,
            max_frequency_hz: 100.0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tracker_rejects_zero_hop() {
        let config = TrackerConfig {
            hop_size: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shifter_boundaries() {
        let mut config = ShifterConfig {
            grain_samples: 32,
            grain_count: 2,
            max_ratio: 1.0,
            ..ShifterConfig::default()
        };
        assert!(config.validate().is_ok());
        config.grain_count = 1;
        assert!(config.validate().is_err());
        config.grain_count = 2;
        config.match_samples = 8;
        assert!(config.validate().is_err());
        config.match_samples = 512;
        config.search_samples = 10_000;
        assert!(config.validate().is_err());
        config.search_samples = 1024;
        config.grain_samples = 31;
        assert!(config.validate().is_err());
        config.grain_samples = 16384;
        config.grain_count = 17;
        assert!(config.validate().is_err());
        config.grain_count = 16;
        config.max_ratio = 4.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_autotune_rejects_swapped_retune_times() {
        let config = AutoTuneConfig {
            fast_retune_ms: 500.0,
            slow_retune_ms: 10.0,
            ..AutoTuneConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_harmonizer_rejects_negative_delay() {
        let config = HarmonizerConfig {
            max_delay_ms: -1.0,
            ..HarmonizerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
