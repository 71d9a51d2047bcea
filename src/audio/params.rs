//! Lock-free parameter surface shared between a control thread and the audio thread.
//!
//! The control side writes individual fields whenever it likes. The audio side
//! calls `snapshot()` once per block; every value is clamped into range there,
//! so a racing or out-of-range write can never reach the DSP code.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use atomic_float::AtomicF32;

use crate::audio::scales::{Key, Note, Scale};

pub const VOICE_COUNT: usize = 4;
pub const MAX_INTERVAL_DEGREES: i32 = 7;
pub const MAX_VOICE_DELAY_MS: f32 = 500.0;

/// Atomic f32 for control values.
#[derive(Debug)]
pub struct AtomicFloat {
    value: AtomicF32,
}

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self {
            value: AtomicF32::new(value),
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Relaxed);
    }
}

impl Default for AtomicFloat {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// NaN maps to `min`; everything else is clamped.
fn clamp_or_min(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

fn percent(value: f32) -> f32 {
    clamp_or_min(value, 0.0, 100.0)
}

/// Root note and scale, stored as indices.
#[derive(Debug, Default)]
pub struct KeyParams {
    root: AtomicUsize,
    scale: AtomicUsize,
}

impl KeyParams {
    pub fn new(key: Key) -> Self {
        Self {
            root: AtomicUsize::new(key.root().index()),
            scale: AtomicUsize::new(key.scale().index()),
        }
    }

    pub fn set_root(&self, root: Note) {
        self.root.store(root.index(), Ordering::Relaxed);
    }

    pub fn set_scale(&self, scale: Scale) {
        self.scale.store(scale.index(), Ordering::Relaxed);
    }

    pub fn set_key(&self, key: Key) {
        self.set_root(key.root());
        self.set_scale(key.scale());
    }

    /// Raw index writes, as a UI knob would send them.
    pub fn set_root_index(&self, index: usize) {
        self.root.store(index, Ordering::Relaxed);
    }

    pub fn set_scale_index(&self, index: usize) {
        self.scale.store(index, Ordering::Relaxed);
    }

    pub fn key(&self) -> Key {
        Key::new(
            Note::from_index(self.root.load(Ordering::Relaxed)),
            Scale::from_index(self.scale.load(Ordering::Relaxed)),
        )
    }
}

/// Auto-tune controls. All percentages are 0..=100.
#[derive(Debug)]
pub struct AutoTuneParams {
    pub key: KeyParams,
    pub speed: AtomicFloat,
    pub sensitivity: AtomicFloat,
    pub humanize: AtomicFloat,
    pub blend: AtomicFloat,
}

/// Plain copy of [`AutoTuneParams`], valid for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoTuneSettings {
    pub key: Key,
    pub speed: f32,
    pub sensitivity: f32,
    pub humanize: f32,
    pub blend: f32,
}

impl Default for AutoTuneParams {
    fn default() -> Self {
        Self {
            key: KeyParams::default(),
            speed: AtomicFloat::new(80.0),
            sensitivity: AtomicFloat::new(100.0),
            humanize: AtomicFloat::new(0.0),
            blend: AtomicFloat::new(100.0),
        }
    }
}

impl AutoTuneParams {
    pub fn snapshot(&self) -> AutoTuneSettings {
        AutoTuneSettings {
            key: self.key.key(),
            speed: percent(self.speed.get()),
            sensitivity: percent(self.sensitivity.get()),
            humanize: percent(self.humanize.get()),
            blend: percent(self.blend.get()),
        }
    }
}

/// One harmony voice as read by the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceConfig {
    pub enabled: bool,
    /// Signed scale degrees, -7..=7.
    pub interval_degrees: i32,
    /// 0..=500 ms.
    pub delay_ms: f32,
    /// -100 (left) ..= 100 (right).
    pub pan_percent: f32,
    /// 0..=100.
    pub level_percent: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_degrees: 0,
            delay_ms: 0.0,
            pan_percent: 0.0,
            level_percent: 100.0,
        }
    }
}

impl VoiceConfig {
    pub fn clamped(self) -> Self {
        Self {
            enabled: self.enabled,
            interval_degrees: self
                .interval_degrees
                .clamp(-MAX_INTERVAL_DEGREES, MAX_INTERVAL_DEGREES),
            delay_ms: clamp_or_min(self.delay_ms, 0.0, MAX_VOICE_DELAY_MS),
            pan_percent: if self.pan_percent.is_nan() {
                0.0
            } else {
                self.pan_percent.clamp(-100.0, 100.0)
            },
            level_percent: percent(self.level_percent),
        }
    }
}

/// Parses `interval[:delay_ms[:pan[:level]]]`, e.g. `2`, `-3:40`, `4:0:-60:80`.
impl std::str::FromStr for VoiceConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':').map(str::trim);
        let interval_degrees = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or("Missing voice interval")?
            .parse::<i32>()
            .map_err(|e| format!("Invalid voice interval in {s:?}: {e}"))?;
        if interval_degrees.abs() > MAX_INTERVAL_DEGREES {
            return Err(format!(
                "Voice interval must be within -{0}..={0} degrees, got {interval_degrees}",
                MAX_INTERVAL_DEGREES
            ));
        }
        let mut field = |name: &str, default: f32| -> Result<f32, String> {
            match parts.next() {
                Some(p) => p
                    .parse::<f32>()
                    .map_err(|e| format!("Invalid voice {name} in {s:?}: {e}")),
                None => Ok(default),
            }
        };
        let delay_ms = field("delay", 0.0)?;
        let pan_percent = field("pan", 0.0)?;
        let level_percent = field("level", 100.0)?;
        Ok(VoiceConfig {
            enabled: true,
            interval_degrees,
            delay_ms,
            pan_percent,
            level_percent,
        }
        .clamped())
    }
}

#[derive(Debug)]
pub struct VoiceParams {
    pub enabled: AtomicBool,
    pub interval_degrees: AtomicI32,
    pub delay_ms: AtomicFloat,
    pub pan_percent: AtomicFloat,
    pub level_percent: AtomicFloat,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self::new(VoiceConfig::default())
    }
}

impl VoiceParams {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            interval_degrees: AtomicI32::new(config.interval_degrees),
            delay_ms: AtomicFloat::new(config.delay_ms),
            pan_percent: AtomicFloat::new(config.pan_percent),
            level_percent: AtomicFloat::new(config.level_percent),
        }
    }

    pub fn set(&self, config: VoiceConfig) {
        self.enabled.store(config.enabled, Ordering::Relaxed);
        self.interval_degrees
            .store(config.interval_degrees, Ordering::Relaxed);
        self.delay_ms.set(config.delay_ms);
        self.pan_percent.set(config.pan_percent);
        self.level_percent.set(config.level_percent);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> VoiceConfig {
        VoiceConfig {
            enabled: self.enabled.load(Ordering::Relaxed),
            interval_degrees: self.interval_degrees.load(Ordering::Relaxed),
            delay_ms: self.delay_ms.get(),
            pan_percent: self.pan_percent.get(),
            level_percent: self.level_percent.get(),
        }
        .clamped()
    }
}

#[derive(Debug)]
pub struct HarmonizerParams {
    pub key: KeyParams,
    /// Level of the dry signal inside the harmony mix, 0..=100.
    pub dry_level: AtomicFloat,
    /// Dry/wet crossfade of the whole effect, 0..=100.
    pub blend: AtomicFloat,
    pub voices: [VoiceParams; VOICE_COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonizerSettings {
    pub key: Key,
    pub dry_level: f32,
    pub blend: f32,
    pub voices: [VoiceConfig; VOICE_COUNT],
}

impl Default for HarmonizerParams {
    fn default() -> Self {
        Self {
            key: KeyParams::default(),
            dry_level: AtomicFloat::new(100.0),
            blend: AtomicFloat::new(100.0),
            voices: Default::default(),
        }
    }
}

impl HarmonizerParams {
    pub fn snapshot(&self) -> HarmonizerSettings {
        HarmonizerSettings {
            key: self.key.key(),
            dry_level: percent(self.dry_level.get()),
            blend: percent(self.blend.get()),
            voices: std::array::from_fn(|v| self.voices[v].snapshot()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_snapshot_clamps_out_of_range_writes() {
        let params = AutoTuneParams::default();
        params.speed.set(250.0);
        params.blend.set(-4.0);
        params.humanize.set(f32::NAN);
        params.key.set_root_index(14);
        params.key.set_scale_index(99);

        let settings = params.snapshot();
        assert_eq!(settings.speed, 100.0);
        assert_eq!(settings.blend, 0.0);
        assert_eq!(settings.humanize, 0.0);
        assert_eq!(settings.key.root(), Note::D);
        assert_eq!(settings.key.scale(), Scale::Chromatic);
    }

    #[test]
    fn test_voice_snapshot_clamps() {
        let voice = VoiceParams::new(VoiceConfig {
            enabled: true,
            interval_degrees: 12,
            delay_ms: 900.0,
            pan_percent: -300.0,
            level_percent: 120.0,
        });
        let config = voice.snapshot();
        assert_eq!(config.interval_degrees, 7);
        assert_eq!(config.delay_ms, 500.0);
        assert_eq!(config.pan_percent, -100.0);
        assert_eq!(config.level_percent, 100.0);
    }

    #[test]
    fn test_parse_voice_config() {
        let voice: VoiceConfig = "4:20:-60:80".parse().unwrap();
        assert!(voice.enabled);
        assert_eq!(voice.interval_degrees, 4);
        assert_eq!(voice.delay_ms, 20.0);
        assert_eq!(voice.pan_percent, -60.0);
        assert_eq!(voice.level_percent, 80.0);

        let voice: VoiceConfig = "-2".parse().unwrap();
        assert_eq!(voice.interval_degrees, -2);
        assert_eq!(voice.level_percent, 100.0);

        assert!("".parse::<VoiceConfig>().is_err());
        assert!("9".parse::<VoiceConfig>().is_err());
        assert!("2:abc".parse::<VoiceConfig>().is_err());
    }

    #[test]
    fn test_writes_from_another_thread_are_seen() {
        let params = Arc::new(HarmonizerParams::default());
        let writer = Arc::clone(&params);
        std::thread::spawn(move || {
            writer.voices[2].set(VoiceConfig {
                enabled: true,
                interval_degrees: -3,
                ..VoiceConfig::default()
            });
            writer.key.set_key("A minor".parse().unwrap());
        })
        .join()
        .unwrap();

        let settings = params.snapshot();
        assert!(settings.voices[2].enabled);
        assert_eq!(settings.voices[2].interval_degrees, -3);
        assert!(!settings.voices[0].enabled);
        assert_eq!(settings.key.to_string(), "A minor");
    }
}
