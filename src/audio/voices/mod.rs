//! Effects built from the tracker, the scale map and the granular shifter.
//!
//! [`AutoTune`] drives one shifter from the detected pitch, [`Harmonizer`]
//! drives up to four from scale-degree intervals. [`VoiceBank`] wraps either
//! one behind the [`PitchEffect`] host contract.

pub mod correction;
pub mod harmony;

pub use correction::AutoTune;
pub use harmony::Harmonizer;

/// Sample rate and block size effects are prepared with on construction.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 512;

/// Above this magnitude the output bends smoothly towards [`SOFT_CLIP_CEILING`].
pub const SOFT_CLIP_KNEE: f32 = 1.0;
pub const SOFT_CLIP_CEILING: f32 = 2.0;

/// Host-facing lifecycle shared by both effects.
///
/// `prepare` and `reset` may allocate or clear state and must not run
/// concurrently with `process_block`. `process_block` never allocates.
pub trait PitchEffect {
    /// Sizes every buffer for `sample_rate` and blocks of up to `max_block_size`.
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Processes `min(input.len(), output.len())` mono samples.
    fn process_block(&mut self, input: &[f32], output: &mut [f32]);

    /// Clears all audio history and smoothing state.
    fn reset(&mut self);

    fn latency_samples(&self) -> usize;
}

/// The two pitch effects behind one type, so a host can switch modes
/// without boxing.
pub enum VoiceBank {
    AutoTune(AutoTune),
    Harmonizer(Harmonizer),
}

impl VoiceBank {
    /// Stereo entry point. The auto-tuner corrects the mono downmix and
    /// duplicates it; the harmonizer pans its voices across both channels.
    pub fn process_stereo(
        &mut self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        match self {
            VoiceBank::AutoTune(fx) => fx.process_stereo(left_in, right_in, left_out, right_out),
            VoiceBank::Harmonizer(fx) => fx.process_stereo(left_in, right_in, left_out, right_out),
        }
    }
}

impl PitchEffect for VoiceBank {
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        match self {
            VoiceBank::AutoTune(fx) => fx.prepare(sample_rate, max_block_size),
            VoiceBank::Harmonizer(fx) => fx.prepare(sample_rate, max_block_size),
        }
    }

    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        match self {
            VoiceBank::AutoTune(fx) => fx.process_block(input, output),
            VoiceBank::Harmonizer(fx) => fx.process_block(input, output),
        }
    }

    fn reset(&mut self) {
        match self {
            VoiceBank::AutoTune(fx) => fx.reset(),
            VoiceBank::Harmonizer(fx) => fx.reset(),
        }
    }

    fn latency_samples(&self) -> usize {
        match self {
            VoiceBank::AutoTune(fx) => fx.latency_samples(),
            VoiceBank::Harmonizer(fx) => fx.latency_samples(),
        }
    }
}

impl From<AutoTune> for VoiceBank {
    fn from(fx: AutoTune) -> Self {
        VoiceBank::AutoTune(fx)
    }
}

impl From<Harmonizer> for VoiceBank {
    fn from(fx: Harmonizer) -> Self {
        VoiceBank::Harmonizer(fx)
    }
}

/// Identity within ±[`SOFT_CLIP_KNEE`], exponential approach to
/// ±[`SOFT_CLIP_CEILING`] above it: `2 - e^(1 - |x|)` with the defaults.
/// Continuous with unit slope at the knee.
pub fn soft_clip(x: f32) -> f32 {
    let magnitude = x.abs();
    if magnitude <= SOFT_CLIP_KNEE {
        return x;
    }
    let headroom = SOFT_CLIP_CEILING - SOFT_CLIP_KNEE;
    let bent = SOFT_CLIP_KNEE + headroom * (1.0 - (-(magnitude - SOFT_CLIP_KNEE) / headroom).exp());
    bent.copysign(x)
}

/// Constant-power pan law; `pan` runs from -1 (left) to 1 (right).
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Integer-sample delay line with a fixed maximum, allocated in `allocate`.
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Resizes for delays up to `max_delay_samples` and clears.
    pub fn allocate(&mut self, max_delay_samples: usize) {
        self.buffer = vec![0.0; max_delay_samples + 1];
        self.write_pos = 0;
    }

    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Writes `input` and returns the sample written `delay` calls ago.
    /// Delays beyond the capacity are capped.
    pub fn process(&mut self, input: f32, delay: usize) -> f32 {
        let capacity = self.buffer.len();
        if capacity == 0 {
            return input;
        }
        self.buffer[self.write_pos] = input;
        let delay = delay.min(capacity - 1);
        let read = (self.write_pos + capacity - delay) % capacity;
        self.write_pos = (self.write_pos + 1) % capacity;
        self.buffer[read]
    }
}

/// Averages two channels into `mono`.
pub(crate) fn downmix(left: &[f32], right: &[f32], mono: &mut [f32]) {
    for ((m, &l), &r) in mono.iter_mut().zip(left).zip(right) {
        *m = 0.5 * (l + r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_clip_is_identity_below_knee() {
        for x in [-1.0, -0.75, -0.3, 0.0, 0.2, 0.75, 0.99, 1.0] {
            assert_eq!(soft_clip(x), x);
        }
        assert!((soft_clip(1.001) - 1.001).abs() < 1e-5);
        assert!((soft_clip(2.0) - (2.0 - (-1.0f32).exp())).abs() < 1e-6);
    }

    #[test]
    fn test_soft_clip_is_bounded_continuous_and_odd() {
        let mut previous = soft_clip(0.0);
        for i in 1..=4000 {
            let x = i as f32 * 0.001;
            let y = soft_clip(x);
            assert!(y < SOFT_CLIP_CEILING);
            assert!(y >= previous);
            assert!(y - previous <= 0.001 + 1e-6);
            assert_eq!(soft_clip(-x), -y);
            previous = y;
        }
        assert!(soft_clip(50.0) <= SOFT_CLIP_CEILING);
    }

    #[test]
    fn test_pan_law_is_constant_power() {
        for pan in [-1.0, -0.5, 0.0, 0.3, 1.0] {
            let (l, r) = pan_gains(pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-6);
        }
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
    }

    #[test]
    fn test_delay_line_delays_by_requested_samples() {
        let mut line = DelayLine::default();
        line.allocate(8);
        let out: Vec<f32> = (1..=10).map(|i| line.process(i as f32, 3)).collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_delay_line_zero_delay_and_cap() {
        let mut line = DelayLine::default();
        assert_eq!(line.process(0.5, 10), 0.5);
        line.allocate(2);
        assert_eq!(line.process(1.0, 0), 1.0);
        assert_eq!(line.max_delay(), 2);
        // Requested delay of 100 is capped at 2.
        line.clear();
        let out: Vec<f32> = (1..=4).map(|i| line.process(i as f32, 100)).collect();
        assert_eq!(out, vec![0.0, 0.0, 1.0, 2.0]);
    }
}
