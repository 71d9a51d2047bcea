use crate::audio::config::TrackerConfig;
use tracing::{debug, warn};

/// Result of one pitch analysis. A frequency of 0 means "no pitch": callers
/// hold their previous state instead of using it as a frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// Normalized correlation at the chosen lag, roughly in [-1, 1].
    pub confidence: f32,
}

impl PitchEstimate {
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        frequency_hz: 0.0,
        confidence: 0.0,
    };

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Autocorrelation pitch tracker over a rolling window.
///
/// Samples go in one at a time through [`PitchTracker::push`]; an estimate is
/// computed on demand with [`PitchTracker::estimate`], or every `hop_size`
/// samples with [`PitchTracker::tick`]. All buffers are allocated in
/// [`PitchTracker::new`].
#[derive(Debug, Clone)]
pub struct PitchTracker {
    config: TrackerConfig,
    sample_rate: u32,
    window: Vec<f32>,
    write_pos: usize,
    hop_counter: usize,
    frame: Vec<f32>,
    nacf: Vec<f32>,
    min_period: usize,
    max_period: usize,
}

impl PitchTracker {
    pub fn new(config: TrackerConfig, sample_rate: u32) -> Self {
        let window_size = config.window_size;
        let mut tracker = Self {
            config,
            sample_rate,
            window: vec![0.0; window_size],
            write_pos: 0,
            hop_counter: 0,
            frame: vec![0.0; window_size],
            nacf: vec![0.0; window_size / 2 + 1],
            min_period: 2,
            max_period: 3,
        };
        tracker.set_sample_rate(sample_rate);
        tracker
    }

    /// Re-derives the lag search range for a new sample rate and clears the window.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        let sr = self.sample_rate as f32;
        // Every lag must leave a full half window of overlap, plus one
        // neighbour on each side for peak picking.
        let limit = (self.config.window_size / 2).saturating_sub(2).max(3);

        let mut max_period = (sr / self.config.min_frequency_hz).ceil() as usize;
        if max_period > limit {
            warn!(
                sample_rate = self.sample_rate,
                requested = max_period,
                limit,
                "Lowest tracked frequency does not fit the analysis window, clamping"
            );
            max_period = limit;
        }
        let max_period = max_period.max(3);
        let min_period = ((sr / self.config.max_frequency_hz).floor() as usize).clamp(2, max_period - 1);

        self.min_period = min_period;
        self.max_period = max_period;
        debug!(
            sample_rate = self.sample_rate,
            min_period, max_period, "Pitch tracker lag range"
        );
        self.reset();
    }

    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.write_pos = 0;
        self.hop_counter = 0;
    }

    /// Lag search range in samples, inclusive.
    pub fn period_range(&self) -> (usize, usize) {
        (self.min_period, self.max_period)
    }

    /// Average delay between a pitch change and its estimate.
    pub fn latency_samples(&self) -> usize {
        self.config.window_size / 2
    }

    pub fn push(&mut self, sample: f32) {
        self.window[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.window.len();
    }

    /// Pushes a sample and returns a fresh estimate on every `hop_size`-th call.
    pub fn tick(&mut self, sample: f32) -> Option<PitchEstimate> {
        self.push(sample);
        self.hop_counter += 1;
        if self.hop_counter >= self.config.hop_size {
            self.hop_counter = 0;
            Some(self.estimate())
        } else {
            None
        }
    }

    pub fn estimate(&mut self) -> PitchEstimate {
        let n = self.window.len();

        // Unroll the ring into chronological order.
        let (older, newer) = self.window.split_at(self.write_pos);
        self.frame[..newer.len()].copy_from_slice(newer);
        self.frame[newer.len()..].copy_from_slice(older);

        let energy: f32 = self.frame.iter().map(|x| x * x).sum();
        if !energy.is_finite() || energy < self.config.noise_floor * n as f32 {
            return PitchEstimate::UNVOICED;
        }

        self.normalized_autocorrelation();

        let (min, max) = (self.min_period, self.max_period);
        let global_max = self.nacf[min..=max]
            .iter()
            .copied()
            .fold(f32::MIN, f32::max);
        if global_max < self.config.confidence_threshold {
            return PitchEstimate {
                frequency_hz: 0.0,
                confidence: global_max.max(0.0),
            };
        }

        // First local maximum close to the global one: shorter lags win
        // over their multiples, which correlate almost as well.
        let cutoff = self.config.peak_threshold * global_max;
        let peak = (min..=max).find(|&lag| {
            let v = self.nacf[lag];
            v >= cutoff && v >= self.nacf[lag - 1] && v >= self.nacf[lag + 1]
        });
        let Some(lag) = peak else {
            // Correlation still rising at the edge of the range: the pitch
            // lies outside the tracked band.
            return PitchEstimate::UNVOICED;
        };

        let confidence = self.nacf[lag];
        if confidence < self.config.confidence_threshold {
            return PitchEstimate {
                frequency_hz: 0.0,
                confidence: confidence.max(0.0),
            };
        }

        let delta = parabolic_offset(self.nacf[lag - 1], confidence, self.nacf[lag + 1]);
        let refined_lag = lag as f32 + delta;
        PitchEstimate {
            frequency_hz: self.sample_rate as f32 / refined_lag,
            confidence,
        }
    }

    /// Fills `nacf[lag]` for `min_period - 1 ..= max_period + 1`.
    ///
    /// Every lag correlates the first half of the frame against an equally
    /// long shifted segment, normalized by the mean energy of both segments.
    fn normalized_autocorrelation(&mut self) {
        let frame = &self.frame;
        let w = frame.len() / 2;
        let first = self.min_period - 1;
        let last = self.max_period + 1;

        let e0: f32 = frame[..w].iter().map(|x| x * x).sum();
        let mut e_lag: f32 = frame[first..first + w].iter().map(|x| x * x).sum();

        for lag in first..=last {
            if lag > first {
                let entering = frame[lag + w - 1];
                let leaving = frame[lag - 1];
                e_lag = (e_lag + entering * entering - leaving * leaving).max(0.0);
            }
            let r: f32 = frame[..w]
                .iter()
                .zip(&frame[lag..lag + w])
                .map(|(a, b)| a * b)
                .sum();
            let denom = e0 + e_lag;
            self.nacf[lag] = if denom > f32::EPSILON {
                2.0 * r / denom
            } else {
                0.0
            };
        }
    }
}

/// Sub-sample offset of the vertex of the parabola through
/// `(-1, left)`, `(0, centre)`, `(1, right)`. Zero for a flat triple.
pub(crate) fn parabolic_offset(left: f32, centre: f32, right: f32) -> f32 {
    let denom = left - 2.0 * centre + right;
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn sine_wave(freq: f32, sr: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| 0.5 * (2.0 * std::f32::consts::PI * freq * n as f32 / sr as f32).sin())
            .collect()
    }

    fn analyse(signal: &[f32], sr: u32) -> PitchEstimate {
        let mut tracker = PitchTracker::new(TrackerConfig::default(), sr);
        for &s in signal {
            tracker.push(s);
        }
        tracker.estimate()
    }

    #[test]
    fn test_detects_sines_within_one_percent() {
        let sr = 44100;
        for f0 in [110.0, 220.0, 440.0, 880.0] {
            let estimate = analyse(&sine_wave(f0, sr, 4096), sr);
            assert!(estimate.is_voiced(), "{f0} Hz not detected");
            let error = (estimate.frequency_hz - f0).abs() / f0;
            assert!(
                error < 0.01,
                "{f0} Hz detected as {} Hz",
                estimate.frequency_hz
            );
            assert!(estimate.confidence > 0.9);
        }
    }

    #[test]
    fn test_detects_harmonic_rich_tone_at_fundamental() {
        let sr = 44100;
        let f0 = 196.0;
        let signal: Vec<f32> = (0..4096)
            .map(|n| {
                let t = n as f32 / sr as f32;
                (1..=5)
                    .map(|h| {
                        (2.0 * std::f32::consts::PI * f0 * h as f32 * t).sin() / h as f32
                    })
                    .sum::<f32>()
                    * 0.3
            })
            .collect();
        let estimate = analyse(&signal, sr);
        assert!((estimate.frequency_hz - f0).abs() / f0 < 0.01);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let estimate = analyse(&vec![0.0; 4096], 44100);
        assert_eq!(estimate, PitchEstimate::UNVOICED);
    }

    #[test]
    fn test_noise_is_unvoiced() {
        let mut rng = SmallRng::seed_from_u64(7);
        let noise: Vec<f32> = (0..4096).map(|_| rng.gen_range(-0.5..=0.5)).collect();
        let estimate = analyse(&noise, 44100);
        assert_eq!(estimate.frequency_hz, 0.0);
    }

    #[test]
    fn test_tick_estimates_every_hop() {
        let config = TrackerConfig {
            hop_size: 100,
            ..TrackerConfig::default()
        };
        let mut tracker = PitchTracker::new(config, 44100);
        let signal = sine_wave(440.0, 44100, 1000);
        let hits: Vec<usize> = signal
            .iter()
            .enumerate()
            .filter_map(|(i, &s)| tracker.tick(s).map(|_| i))
            .collect();
        assert_eq!(hits, vec![99, 199, 299, 399, 499, 599, 699, 799, 899, 999]);
    }

    #[test]
    fn test_period_range_clamped_to_half_window() {
        let tracker = PitchTracker::new(TrackerConfig::default(), 96000);
        let (min, max) = tracker.period_range();
        assert!(min >= 2);
        assert!(max <= WINDOW_HALF - 2);
        assert!(min < max);
    }

    const WINDOW_HALF: usize = crate::audio::autotune::WINDOW_LENGTH / 2;

    #[test]
    fn test_period_range_tracks_sample_rate() {
        let mut tracker = PitchTracker::new(TrackerConfig::default(), 44100);
        assert_eq!(tracker.period_range(), (20, 802));
        tracker.set_sample_rate(22050);
        assert_eq!(tracker.period_range(), (10, 401));
    }

    #[test]
    fn test_reset_clears_window() {
        let sr = 44100;
        let mut tracker = PitchTracker::new(TrackerConfig::default(), sr);
        for s in sine_wave(220.0, sr, 4096) {
            tracker.push(s);
        }
        assert!(tracker.estimate().is_voiced());
        tracker.reset();
        assert_eq!(tracker.estimate(), PitchEstimate::UNVOICED);
    }

    #[test]
    fn test_parabolic_offset() {
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
        assert_eq!(parabolic_offset(0.5, 1.0, 0.5), 0.0);
        assert!(parabolic_offset(0.9, 1.0, 0.5) < 0.0);
        assert!(parabolic_offset(0.5, 1.0, 0.9) > 0.0);
        let x = parabolic_offset(-2.0, 0.0, -1.0);
        assert!((x - 0.1666666).abs() < 1e-5);
    }
}
