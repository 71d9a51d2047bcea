use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fretwarp::audio::Audio;
use fretwarp::audio::autotune::tracker::PitchTracker;
use fretwarp::audio::config::{AutoTuneConfig, HarmonizerConfig, TrackerConfig};
use fretwarp::audio::file;
use fretwarp::audio::params::{AutoTuneParams, HarmonizerParams, VOICE_COUNT, VoiceConfig};
use fretwarp::audio::scales::{Key, frequency_to_midi_note, note_name};
use fretwarp::audio::voices::{AutoTune, Harmonizer, PitchEffect, VoiceBank};

const BLOCK_SIZE: usize = 512;

#[derive(Parser)]
#[command(version, about = "Offline pitch correction and harmony for guitar recordings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the detected pitch of the first channel over time.
    Detect {
        input: PathBuf,
        /// Print every Nth voiced estimate.
        #[arg(long, default_value_t = 16)]
        every: usize,
    },
    /// Snap the input to the nearest note of a key.
    Autotune {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "C major")]
        key: Key,
        #[arg(long, default_value_t = 80.0)]
        speed: f32,
        #[arg(long, default_value_t = 100.0)]
        sensitivity: f32,
        #[arg(long, default_value_t = 0.0)]
        humanize: f32,
        #[arg(long, default_value_t = 100.0)]
        blend: f32,
    },
    /// Add up to four scale-aware harmony voices.
    Harmonize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value = "C major")]
        key: Key,
        /// interval[:delay_ms[:pan[:level]]], e.g. `2`, `-3:40:-50`.
        #[arg(long = "voice")]
        voices: Vec<VoiceConfig>,
        #[arg(long, default_value_t = 100.0)]
        dry: f32,
        #[arg(long, default_value_t = 100.0)]
        blend: f32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Detect { input, every } => detect(&input, every.max(1)),
        Command::Autotune {
            input,
            output,
            key,
            speed,
            sensitivity,
            humanize,
            blend,
        } => {
            let params = AutoTuneParams::default();
            params.key.set_key(key);
            params.speed.set(speed);
            params.sensitivity.set(sensitivity);
            params.humanize.set(humanize);
            params.blend.set(blend);
            autotune(&input, &output, Arc::new(params))
        }
        Command::Harmonize {
            input,
            output,
            key,
            voices,
            dry,
            blend,
        } => {
            if voices.len() > VOICE_COUNT {
                bail!("At most {VOICE_COUNT} voices are supported, got {}", voices.len());
            }
            let params = HarmonizerParams::default();
            params.key.set_key(key);
            params.dry_level.set(dry);
            params.blend.set(blend);
            for (slot, voice) in params.voices.iter().zip(voices) {
                slot.set(voice);
            }
            harmonize(&input, &output, Arc::new(params))
        }
    }
}

fn load(input: &Path) -> Result<Audio> {
    let audio = file::load_audio_from_path(input)?;
    info!(
        ?input,
        sample_rate = audio.sample_rate(),
        seconds = audio.duration_secs(),
        "Loaded input"
    );
    if audio.is_empty() {
        warn!(?input, "Input holds no samples");
    }
    Ok(audio)
}

fn detect(input: &Path, every: usize) -> Result<()> {
    let audio = load(input)?;
    let config = TrackerConfig::default();
    config.validate()?;
    let mut tracker = PitchTracker::new(config, audio.sample_rate());
    let latency = tracker.latency_samples();

    println!("{:>9}  {:>9}  {:>5}  {:>6}", "time_s", "freq_hz", "note", "conf");
    let mut voiced = 0usize;
    for (n, &sample) in audio.left().iter().enumerate() {
        let Some(estimate) = tracker.tick(sample) else {
            continue;
        };
        if !estimate.is_voiced() {
            continue;
        }
        if voiced % every == 0 {
            // Estimates describe the centre of the analysis window.
            let time = n.saturating_sub(latency) as f32 / audio.sample_rate() as f32;
            let midi = frequency_to_midi_note(estimate.frequency_hz).round() as i32;
            println!(
                "{time:>9.3}  {:>9.2}  {:>5}  {:>6.3}",
                estimate.frequency_hz,
                note_name(midi),
                estimate.confidence
            );
        }
        voiced += 1;
    }
    info!(voiced, "Detection finished");
    Ok(())
}

fn run_channel(effect: &mut VoiceBank, input: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0; input.len()];
    for (i, o) in input.chunks(BLOCK_SIZE).zip(output.chunks_mut(BLOCK_SIZE)) {
        effect.process_block(i, o);
    }
    output
}

fn autotune(input: &Path, output: &Path, params: Arc<AutoTuneParams>) -> Result<()> {
    let audio = load(input)?;
    let settings = params.snapshot();
    info!(
        key = %settings.key,
        speed = settings.speed,
        sensitivity = settings.sensitivity,
        humanize = settings.humanize,
        blend = settings.blend,
        "Running auto-tune"
    );

    let make = || -> Result<VoiceBank> {
        let mut fx = AutoTune::with_config(AutoTuneConfig::default(), Arc::clone(&params))?;
        fx.prepare(audio.sample_rate(), BLOCK_SIZE);
        Ok(fx.into())
    };
    let (mut left_fx, mut right_fx) = (make()?, make()?);
    info!(latency = left_fx.latency_samples(), "Effect latency in samples");

    let result = if audio.is_dual_mono() {
        let mono = run_channel(&mut left_fx, audio.left());
        Audio::from_mono(audio.sample_rate(), mono)
    } else {
        let (left, right) = rayon::join(
            || run_channel(&mut left_fx, audio.left()),
            || run_channel(&mut right_fx, audio.right()),
        );
        Audio::new(audio.sample_rate(), left, right)
    };

    file::save_audio_to_path(&result, output)?;
    info!(?output, "Wrote auto-tuned audio");
    Ok(())
}

fn harmonize(input: &Path, output: &Path, params: Arc<HarmonizerParams>) -> Result<()> {
    let audio = load(input)?;
    let settings = params.snapshot();
    let enabled = settings.voices.iter().filter(|v| v.enabled).count();
    if enabled == 0 {
        warn!("No harmony voices given; output is the dry signal");
    }
    info!(key = %settings.key, voices = enabled, "Running harmonizer");

    let mut fx: VoiceBank =
        Harmonizer::with_config(HarmonizerConfig::default(), Arc::clone(&params))?.into();
    fx.prepare(audio.sample_rate(), BLOCK_SIZE);
    info!(latency = fx.latency_samples(), "Effect latency in samples");

    let mut left = vec![0.0; audio.length()];
    let mut right = vec![0.0; audio.length()];
    fx.process_stereo(audio.left(), audio.right(), &mut left, &mut right);

    file::save_audio_to_path(&Audio::new(audio.sample_rate(), left, right), output)?;
    info!(?output, "Wrote harmonized audio");
    Ok(())
}
