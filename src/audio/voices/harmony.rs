use std::sync::Arc;

use tracing::debug;

use crate::audio::autotune::clamp_ratio;
use crate::audio::autotune::granular::GranularShifter;
use crate::audio::config::HarmonizerConfig;
use crate::audio::params::{HarmonizerParams, HarmonizerSettings, VOICE_COUNT};
use crate::audio::scales::semitones_to_ratio;
use crate::audio::voices::{
    DEFAULT_MAX_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, DelayLine, PitchEffect, downmix, pan_gains,
    soft_clip,
};

/// One harmony voice: its own shifter and delay line plus the gains
/// resolved for the current block.
struct HarmonyVoice {
    shifter: GranularShifter,
    delay: DelayLine,
    active: bool,
    ratio: f32,
    delay_samples: usize,
    level: f32,
    gain_left: f32,
    gain_right: f32,
}

impl HarmonyVoice {
    fn new(config: &HarmonizerConfig) -> Self {
        Self {
            shifter: GranularShifter::new(&config.shifter),
            delay: DelayLine::default(),
            active: false,
            ratio: 1.0,
            delay_samples: 0,
            level: 0.0,
            gain_left: 0.0,
            gain_right: 0.0,
        }
    }

    fn clear(&mut self) {
        self.shifter.reset();
        self.delay.clear();
    }

    #[inline]
    fn render(&mut self, input: f32) -> f32 {
        let shifted = self.shifter.process(input, self.ratio);
        self.delay.process(shifted, self.delay_samples)
    }
}

/// Four-voice scale-aware harmonizer.
///
/// Each enabled voice shifts the (mono) input by the scale-degree interval
/// it is configured with, delays, pans and scales it, and the voices are
/// summed onto the dry signal through a soft clipper. Disabled voices are
/// skipped entirely.
pub struct Harmonizer {
    config: HarmonizerConfig,
    params: Arc<HarmonizerParams>,
    voices: Vec<HarmonyVoice>,
    sample_rate: u32,
    max_block_size: usize,
    mono: Vec<f32>,
}

impl Harmonizer {
    /// Builds the effect from a config that is assumed valid.
    pub fn new(config: HarmonizerConfig, params: Arc<HarmonizerParams>) -> Self {
        let voices = (0..VOICE_COUNT).map(|_| HarmonyVoice::new(&config)).collect();
        let mut fx = Self {
            config,
            params,
            voices,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: 0,
            mono: Vec::new(),
        };
        fx.prepare(DEFAULT_SAMPLE_RATE, DEFAULT_MAX_BLOCK_SIZE);
        fx
    }

    /// Validates `config` before building.
    pub fn with_config(
        config: HarmonizerConfig,
        params: Arc<HarmonizerParams>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self::new(config, params))
    }

    pub fn params(&self) -> &Arc<HarmonizerParams> {
        &self.params
    }

    /// Number of voices that processed the last block.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Pitch ratio of an active voice.
    pub fn voice_ratio(&self, index: usize) -> Option<f32> {
        self.voices
            .get(index)
            .filter(|v| v.active)
            .map(|v| v.ratio)
    }

    fn ms_to_samples(&self, ms: f32) -> usize {
        (ms * 0.001 * self.sample_rate as f32).round() as usize
    }

    /// Applies one parameter snapshot to the voices.
    fn configure_voices(&mut self, settings: &HarmonizerSettings) {
        let sample_rate = self.sample_rate as f32;
        for (index, (voice, config)) in self.voices.iter_mut().zip(&settings.voices).enumerate() {
            if !config.enabled {
                if voice.active {
                    debug!(voice = index, "Harmony voice disabled");
                    voice.active = false;
                }
                continue;
            }
            if !voice.active {
                // History from before the voice was switched off is stale.
                voice.clear();
                voice.active = true;
                debug!(
                    voice = index,
                    interval = config.interval_degrees,
                    "Harmony voice enabled"
                );
            }

            let semitones = settings.key.interval_semitones(config.interval_degrees);
            voice.ratio = clamp_ratio(semitones_to_ratio(semitones as f32));
            voice.delay_samples = ((config.delay_ms * 0.001 * sample_rate).round() as usize)
                .min(voice.delay.max_delay());
            voice.level = config.level_percent / 100.0;
            let (left, right) = pan_gains(config.pan_percent / 100.0);
            voice.gain_left = left * voice.level;
            voice.gain_right = right * voice.level;
        }
    }

    /// True-stereo entry point: the voices run on the mono downmix and are
    /// panned back out; the dry signal keeps its stereo image.
    pub fn process_stereo(
        &mut self,
        left_in: &[f32],
        right_in: &[f32],
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) {
        let settings = self.params.snapshot();
        self.configure_voices(&settings);
        let dry_gain = settings.dry_level / 100.0;
        let blend = settings.blend / 100.0;

        let n = left_in
            .len()
            .min(right_in.len())
            .min(left_out.len())
            .min(right_out.len());
        let mut start = 0;
        while start < n {
            let end = (start + self.max_block_size).min(n);
            let len = end - start;
            downmix(&left_in[start..end], &right_in[start..end], &mut self.mono[..len]);

            for i in 0..len {
                let dry = self.mono[i];
                let (dry_left, dry_right) = (left_in[start + i], right_in[start + i]);
                let mut left = dry_left * dry_gain;
                let mut right = dry_right * dry_gain;
                for voice in self.voices.iter_mut().filter(|v| v.active) {
                    let wet = voice.render(dry);
                    left += wet * voice.gain_left;
                    right += wet * voice.gain_right;
                }
                left_out[start + i] = dry_left * (1.0 - blend) + soft_clip(left) * blend;
                right_out[start + i] = dry_right * (1.0 - blend) + soft_clip(right) * blend;
            }
            start = end;
        }
    }
}

impl PitchEffect for Harmonizer {
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        self.sample_rate = sample_rate.max(1);
        self.max_block_size = max_block_size.max(1);
        self.mono = vec![0.0; self.max_block_size];
        let max_delay = self.ms_to_samples(self.config.max_delay_ms);
        for voice in &mut self.voices {
            voice.delay.allocate(max_delay);
        }
        debug!(
            sample_rate = self.sample_rate,
            max_block_size = self.max_block_size,
            max_delay,
            "Prepared harmonizer"
        );
        self.reset();
    }

    /// Mono entry point: voices are summed at their level, pan is ignored.
    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        let settings = self.params.snapshot();
        self.configure_voices(&settings);
        let dry_gain = settings.dry_level / 100.0;
        let blend = settings.blend / 100.0;

        for (out, &dry) in output.iter_mut().zip(input) {
            let mut mix = dry * dry_gain;
            for voice in self.voices.iter_mut().filter(|v| v.active) {
                mix += voice.render(dry) * voice.level;
            }
            *out = dry * (1.0 - blend) + soft_clip(mix) * blend;
        }
    }

    fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.clear();
            voice.active = false;
        }
        debug!("Reset harmonizer state");
    }

    /// Worst-case grain offset plus the longest delay among enabled voices.
    fn latency_samples(&self) -> usize {
        let settings = self.params.snapshot();
        let max_delay_ms = settings
            .voices
            .iter()
            .filter(|v| v.enabled)
            .map(|v| v.delay_ms)
            .fold(0.0f32, f32::max);
        self.config.shifter.grain_samples + self.ms_to_samples(max_delay_ms)
    }
}
