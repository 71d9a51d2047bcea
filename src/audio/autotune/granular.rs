use crate::audio::autotune::MIN_RATIO;
use crate::audio::autotune::tracker::parabolic_offset;
use crate::audio::config::ShifterConfig;
use tracing::debug;

/// What the shifter emits before it holds one grain of history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColdStart {
    /// Forward the input unchanged.
    #[default]
    PassThrough,
    /// Emit silence.
    Silence,
}

#[derive(Debug, Clone, Copy)]
struct Grain {
    /// Samples since the grain last restarted, in `0..grain_samples`.
    tick: usize,
    /// Fractional read delay behind the newest sample.
    delay: f32,
}

/// Overlap-add pitch shifter with Hann-windowed grains read from a ring buffer.
///
/// `grain_count` grains run with evenly staggered phases. Each grain's read
/// delay changes by `1 - ratio` per sample, so its read head moves at `ratio`
/// samples per sample. A grain restarts when its window weight is zero; the
/// new read delay is searched so that the grain starts in phase with the most
/// recently restarted one, which keeps all grains on a whole number of input
/// periods from each other. Without that alignment the overlap-add would
/// average the shift away.
///
/// The search compares `match_samples` of history at each candidate lag by
/// normalized correlation. With a period hint it only spans one period,
/// otherwise `search_samples`.
#[derive(Debug, Clone)]
pub struct GranularShifter {
    history: Vec<f32>,
    write_pos: usize,
    filled: usize,
    grain_samples: usize,
    grains: Vec<Grain>,
    window: Vec<f32>,
    max_ratio: f32,
    search_samples: usize,
    match_samples: usize,
    period_hint: Option<f32>,
    started: bool,
    cold_start: ColdStart,
}

impl GranularShifter {
    pub fn new(config: &ShifterConfig) -> Self {
        let grain_samples = config.grain_samples.max(2);
        let grain_count = config.grain_count.max(2);
        let max_ratio = config.max_ratio.max(1.0);
        let search_samples = config.search_samples.max(1);
        let match_samples = config.match_samples.max(1);

        let travel = (max_ratio - 1.0).max(1.0 - MIN_RATIO) * grain_samples as f32;
        let capacity = travel.ceil() as usize + search_samples + match_samples + 8;

        // Periodic Hann: the staggered weights of evenly spaced grains sum
        // to a constant for two or more grains.
        let window = (0..grain_samples)
            .map(|n| {
                let x = std::f32::consts::PI * 2.0 * n as f32 / grain_samples as f32;
                0.5 * (1.0 - x.cos())
            })
            .collect();
        let grains = (0..grain_count)
            .map(|g| Grain {
                tick: g * grain_samples / grain_count,
                delay: 0.0,
            })
            .collect();

        debug!(
            grain_samples,
            grain_count, capacity, search_samples, "Allocated granular shifter"
        );
        Self {
            history: vec![0.0; capacity],
            write_pos: 0,
            filled: 0,
            grain_samples,
            grains,
            window,
            max_ratio,
            search_samples,
            match_samples,
            period_hint: None,
            started: false,
            cold_start: config.cold_start,
        }
    }

    pub fn capacity(&self) -> usize {
        self.history.len()
    }

    pub fn grain_samples(&self) -> usize {
        self.grain_samples
    }

    /// True once a full grain of history has been written.
    pub fn is_primed(&self) -> bool {
        self.filled >= self.grain_samples
    }

    /// Nominal read delay behind the input, in samples.
    pub fn latency_samples(&self) -> usize {
        self.grain_samples
    }

    /// Phase of each grain in [0, 1).
    pub fn grain_phases(&self) -> impl Iterator<Item = f32> + '_ {
        self.grains
            .iter()
            .map(|g| g.tick as f32 / self.grain_samples as f32)
    }

    /// Period of the input in samples, if known. Narrows the restart search
    /// to one period. Non-finite or tiny periods clear the hint.
    pub fn set_period_hint(&mut self, period_samples: Option<f32>) {
        self.period_hint = period_samples.filter(|p| p.is_finite() && *p >= 2.0);
    }

    /// Zeroes the history, clears the period hint and restarts the
    /// cold-start guard. Grain phases return to their initial stagger.
    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.period_hint = None;
        self.started = false;
        let grain_count = self.grains.len();
        for (g, grain) in self.grains.iter_mut().enumerate() {
            grain.tick = g * self.grain_samples / grain_count;
            grain.delay = 0.0;
        }
    }

    /// Writes one input sample and returns one output sample shifted by `ratio`.
    ///
    /// The ratio is expected to be clamped by the caller. Values outside
    /// `[0, max_ratio]` are clamped here and non-finite ratios act as 1.0.
    pub fn process(&mut self, input: f32, ratio: f32) -> f32 {
        let capacity = self.history.len();
        let newest = self.write_pos;
        self.history[newest] = input;
        self.write_pos = (self.write_pos + 1) % capacity;
        self.filled = (self.filled + 1).min(capacity);

        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, self.max_ratio)
        } else {
            1.0
        };
        let max_delay = self.max_delay();

        if !self.started {
            let start = self.start_delay(ratio);
            for grain in &mut self.grains {
                grain.delay = (start + (1.0 - ratio) * grain.tick as f32).clamp(0.0, max_delay);
            }
            self.started = true;
        }

        // Restarts are aligned before any grain advances for this sample.
        for g in 0..self.grains.len() {
            if self.grains[g].tick == 0 {
                self.grains[g].delay = self.restart_delay(g, newest, ratio);
            }
        }

        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for grain in &mut self.grains {
            let weight = self.window[grain.tick];
            if weight > 0.0 {
                let whole = grain.delay as usize;
                let frac = grain.delay - whole as f32;
                let i0 = (newest + capacity - whole) % capacity;
                let i1 = (i0 + capacity - 1) % capacity;
                let sample = self.history[i0] * (1.0 - frac) + self.history[i1] * frac;

                acc += weight * sample;
                weight_sum += weight;
            }

            grain.delay = (grain.delay + 1.0 - ratio).clamp(0.0, max_delay);
            grain.tick += 1;
            if grain.tick >= self.grain_samples {
                grain.tick = 0;
            }
        }

        if self.filled < self.grain_samples {
            return match self.cold_start {
                ColdStart::PassThrough => input,
                ColdStart::Silence => 0.0,
            };
        }
        if weight_sum > 1e-6 {
            acc / weight_sum
        } else {
            0.0
        }
    }

    /// Runs [`GranularShifter::process`] over a block at a constant ratio.
    pub fn process_slice(&mut self, input: &[f32], output: &mut [f32], ratio: f32) {
        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.process(x, ratio);
        }
    }

    /// Largest read delay that leaves room for a full match segment.
    fn max_delay(&self) -> f32 {
        (self.history.len() - self.match_samples - 2) as f32
    }

    /// Smallest delay a grain can start at and stay behind the write cursor
    /// for its whole life.
    fn start_delay(&self, ratio: f32) -> f32 {
        if ratio > 1.0 {
            (ratio - 1.0) * self.grain_samples as f32 + 1.0
        } else {
            0.0
        }
    }

    /// Delay for grain `g` restarting now: at least [`Self::start_delay`],
    /// in phase with the most recently restarted other grain.
    fn restart_delay(&self, g: usize, newest: usize, ratio: f32) -> f32 {
        let start = self.start_delay(ratio);
        let max_delay = self.max_delay();
        let Some(reference) = self
            .grains
            .iter()
            .enumerate()
            .filter(|&(i, other)| i != g && other.tick > 0)
            .min_by_key(|&(_, other)| other.tick)
            .map(|(_, other)| other.delay)
        else {
            return start;
        };

        let span = self
            .period_hint
            .map_or(self.search_samples, |period| {
                (period.ceil() as usize + 2).min(self.search_samples)
            }) as isize;
        let growth = (1.0 - ratio).max(0.0) * self.grain_samples as f32;
        let first = (start - reference).ceil() as isize;
        let last = (first + span).min((max_delay - growth - reference).floor() as isize);
        if last < first {
            return start.min(max_delay);
        }

        let anchor = newest as isize - reference.round() as isize;
        let mut best_lag = first;
        let mut best = f32::NEG_INFINITY;
        // Near-ties keep the shorter lag, so unity stays an exact copy.
        for lag in (first..=last).step_by(2) {
            let score = self.similarity(anchor, lag, 2);
            if score > best + 1e-4 {
                best = score;
                best_lag = lag;
            }
        }

        let mut lag = best_lag;
        let mut score = self.similarity(anchor, lag, 1);
        for candidate in [best_lag - 1, best_lag + 1] {
            if (first..=last).contains(&candidate) {
                let s = self.similarity(anchor, candidate, 1);
                if s > score + 1e-6 {
                    lag = candidate;
                    score = s;
                }
            }
        }
        if score <= 0.0 {
            // Nothing to line up with, e.g. silence.
            return start;
        }

        let delta = if lag > first && lag < last {
            parabolic_offset(
                self.similarity(anchor, lag - 1, 1),
                score,
                self.similarity(anchor, lag + 1, 1),
            )
        } else {
            0.0
        };
        (reference + lag as f32 + delta).clamp(start.min(max_delay), max_delay)
    }

    /// Normalized correlation between the `match_samples` ending at `anchor`
    /// and those ending `lag` samples earlier.
    fn similarity(&self, anchor: isize, lag: isize, step: usize) -> f32 {
        let capacity = self.history.len() as isize;
        let (mut r, mut e0, mut e1) = (0.0f32, 0.0f32, 0.0f32);
        for k in (0..self.match_samples as isize).step_by(step) {
            let a = self.history[(anchor - k).rem_euclid(capacity) as usize];
            let b = self.history[(anchor - lag - k).rem_euclid(capacity) as usize];
            r += a * b;
            e0 += a * a;
            e1 += b * b;
        }
        let denom = (e0 * e1).sqrt();
        if denom > 1e-9 { r / denom } else { 0.0 }
    }
}
