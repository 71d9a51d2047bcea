use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::audio::autotune::clamp_ratio;
use crate::audio::autotune::granular::GranularShifter;
use crate::audio::autotune::tracker::PitchTracker;
use crate::audio::config::AutoTuneConfig;
use crate::audio::params::{AutoTuneParams, AutoTuneSettings};
use crate::audio::voices::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, PitchEffect, downmix};

/// Per-block values derived from the parameter snapshot.
#[derive(Debug, Clone, Copy)]
struct BlockControls {
    settings: AutoTuneSettings,
    smoothing: f32,
    sensitivity: f32,
    humanize_cents: f32,
    blend: f32,
}

/// Single-voice scale-locked pitch correction.
///
/// The tracker re-estimates the input pitch every `hop_size` samples. Each
/// sample the distance to the nearest scale note is smoothed into a
/// correction, turned into a ratio and fed to one granular shifter.
pub struct AutoTune {
    config: AutoTuneConfig,
    params: Arc<AutoTuneParams>,
    tracker: PitchTracker,
    shifter: GranularShifter,
    rng: SmallRng,
    sample_rate: u32,
    max_block_size: usize,
    mono_in: Vec<f32>,
    mono_out: Vec<f32>,
    current_pitch: f32,
    target_pitch: f32,
    smoothed_correction: f32,
    ratio: f32,
}

impl AutoTune {
    /// Builds the effect from a config that is assumed valid.
    pub fn new(config: AutoTuneConfig, params: Arc<AutoTuneParams>) -> Self {
        let tracker = PitchTracker::new(config.tracker.clone(), DEFAULT_SAMPLE_RATE);
        let shifter = GranularShifter::new(&config.shifter);
        let rng = SmallRng::seed_from_u64(config.seed);
        let mut fx = Self {
            config,
            params,
            tracker,
            shifter,
            rng,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: 0,
            mono_in: Vec::new(),
            mono_out: Vec::new(),
            current_pitch: 0.0,
            target_pitch: 0.0,
            smoothed_correction: 0.0,
            ratio: 1.0,
        };
        fx.prepare(DEFAULT_SAMPLE_RATE, DEFAULT_MAX_BLOCK_SIZE);
        fx
    }

    /// Validates `config` before building.
    pub fn with_config(config: AutoTuneConfig, params: Arc<AutoTuneParams>) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::new(config, params))
    }

    pub fn params(&self) -> &Arc<AutoTuneParams> {
        &self.params
    }

    /// Last detected input pitch in Hz, 0 before the first voiced estimate.
    pub fn current_pitch(&self) -> f32 {
        self.current_pitch
    }

    /// Scale note the correction is heading for, 0 before the first voiced estimate.
    pub fn target_pitch(&self) -> f32 {
        self.target_pitch
    }

    /// Ratio applied to the most recent sample.
    pub fn current_ratio(&self) -> f32 {
        self.ratio
    }

    fn block_controls(&self) -> BlockControls {
        let settings = self.params.snapshot();
        let fast = self.config.fast_retune_ms;
        let slow = self.config.slow_retune_ms;
        // Exponential sweep: equal knob travel gives equal retune-time factors.
        let retune_ms = slow * (fast / slow).powf(settings.speed / 100.0);
        let retune_samples = retune_ms * 0.001 * self.sample_rate as f32;
        BlockControls {
            settings,
            smoothing: 1.0 - (-1.0 / retune_samples.max(1.0)).exp(),
            sensitivity: settings.sensitivity / 100.0,
            humanize_cents: self.config.max_humanize_cents * settings.humanize / 100.0,
            blend: settings.blend / 100.0,
        }
    }

    fn tick(&mut self, input: f32, controls: &BlockControls) -> f32 {
        if let Some(estimate) = self.tracker.tick(input) {
            if estimate.is_voiced() {
                self.current_pitch = estimate.frequency_hz;
                self.target_pitch = controls.settings.key.nearest_frequency(self.current_pitch);
                self.shifter
                    .set_period_hint(Some(self.sample_rate as f32 / self.current_pitch));
            }
        }

        self.ratio = if self.current_pitch > 0.0 && self.target_pitch > 0.0 {
            let mut pitch_diff = (self.target_pitch - self.current_pitch) * controls.sensitivity;
            if controls.humanize_cents > 0.0 {
                let cents = self.rng.gen_range(-1.0f32..=1.0) * controls.humanize_cents;
                pitch_diff += self.current_pitch * (2f32.powf(cents / 1200.0) - 1.0);
            }
            self.smoothed_correction += controls.smoothing * (pitch_diff - self.smoothed_correction);
            clamp_ratio((self.current_pitch + self.smoothed_correction) / self.current_pitch)
        } else {
            1.0
        };

        let wet = self.shifter.process(input, self.ratio);
        input * (1.0 - controls.blend) + wet * controls.blend
    }

    /// Corrects the mono downmix of a stereo pair and writes it to both outputs.
    pub fn process_stereo(
        &mut self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        let n = left_in
            .len()
            .min(right_in.len())
            .min(left_out.len())
            .min(right_out.len());
        let mut start = 0;
        while start < n {
            let end = (start + self.max_block_size).min(n);
            let len = end - start;
            let mut mono_in = std::mem::take(&mut self.mono_in);
            let mut mono_out = std::mem::take(&mut self.mono_out);
            downmix(&left_in[start..end], &right_in[start..end], &mut mono_in[..len]);
            self.process_block(&mono_in[..len], &mut mono_out[..len]);
            left_out[start..end].copy_from_slice(&mono_out[..len]);
            right_out[start..end].copy_from_slice(&mono_out[..len]);
            self.mono_in = mono_in;
            self.mono_out = mono_out;
            start = end;
        }
    }
}

impl PitchEffect for AutoTune {
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        self.sample_rate = sample_rate.max(1);
        self.max_block_size = max_block_size.max(1);
        self.mono_in = vec![0.0; self.max_block_size];
        self.mono_out = vec![0.0; self.max_block_size];
        self.tracker.set_sample_rate(self.sample_rate);
        debug!(
            sample_rate = self.sample_rate,
            max_block_size = self.max_block_size,
            "Prepared auto-tune"
        );
        self.reset();
    }

    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let controls = self.block_controls();
        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.tick(x, &controls);
        }
    }

    fn reset(&mut self) {
        self.tracker.reset();
        self.shifter.reset();
        self.rng = SmallRng::seed_from_u64(self.config.seed);
        self.current_pitch = 0.0;
        self.target_pitch = 0.0;
        self.smoothed_correction = 0.0;
        self.ratio = 1.0;
        debug!("Reset auto-tune state");
    }

    fn latency_samples(&self) -> usize {
        self.tracker.latency_samples()
    }
}
