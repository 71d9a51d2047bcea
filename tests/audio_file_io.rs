//! Integration tests for WAV file I/O.
//!
//! - Round-tripping synthetic audio through save + load
//! - Reading float and multi-channel files written by other tools
//! - Handling invalid / missing files

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use fretwarp::audio::Audio;
use fretwarp::audio::file::{self, AudioFileData};

fn output_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.push("tests");
    p.push("out");
    fs::create_dir_all(&p).expect("failed to create tests/out directory");
    p.push(name);
    p
}

#[test]
fn round_trip_save_and_load_wav() -> anyhow::Result<()> {
    let sample_rate = 44100;
    let n_samples = sample_rate as usize / 100; // 10 ms
    let left: Vec<f32> = (0..n_samples)
        .map(|n| 0.8 * (2.0 * std::f32::consts::PI * 440.0 * n as f32 / sample_rate as f32).sin())
        .collect();
    let right: Vec<f32> = left.iter().map(|x| -0.5 * x).collect();
    let audio = Audio::new(sample_rate, left.clone(), right.clone());

    let out_path = output_path("round_trip.wav");
    if out_path.exists() {
        fs::remove_file(&out_path)?;
    }
    file::save_audio_to_path(&audio, &out_path)?;
    let loaded = file::load_audio_from_path(&out_path)?;

    assert_eq!(loaded.sample_rate(), sample_rate);
    assert_eq!(loaded.length(), n_samples);
    // 16-bit quantization error.
    let tolerance = 3.0 / i16::MAX as f32;
    for (a, b) in left.iter().zip(loaded.left()) {
        assert!((a - b).abs() <= tolerance, "left {a} vs {b}");
    }
    for (a, b) in right.iter().zip(loaded.right()) {
        assert!((a - b).abs() <= tolerance, "right {a} vs {b}");
    }
    Ok(())
}

#[test]
fn out_of_range_samples_are_clipped_on_save() -> anyhow::Result<()> {
    let audio = Audio::from_mono(8000, vec![2.0, -3.0, 0.25]);
    let out_path = output_path("clipped.wav");
    file::save_audio_to_path(&audio, &out_path)?;
    let loaded = file::load_audio_from_path(&out_path)?;
    assert!((loaded.left()[0] - 1.0).abs() < 1e-3);
    assert!((loaded.left()[1] + 1.0).abs() < 1e-3);
    assert!((loaded.left()[2] - 0.25).abs() < 1e-3);
    Ok(())
}

#[test]
fn loads_float_wav_with_extra_channels() -> anyhow::Result<()> {
    let path = output_path("float_three_channel.wav");
    let spec = hound::WavSpec {
        channels: 3,
        sample_rate: 22050,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for frame in 0..100 {
        let x = frame as f32 / 100.0;
        writer.write_sample(x)?;
        writer.write_sample(-x)?;
        writer.write_sample(0.9f32)?;
    }
    writer.finalize()?;

    let data = AudioFileData::load(&path)?;
    assert_eq!(data.n_channels(), 3);
    assert_eq!(data.n_samples(), 100);

    let audio = data.to_audio();
    assert_eq!(audio.sample_rate(), 22050);
    assert_eq!(audio.left()[50], 0.5);
    assert_eq!(audio.right()[50], -0.5);
    Ok(())
}

#[test]
fn loads_24_bit_integer_wav() -> anyhow::Result<()> {
    let path = output_path("int24_mono.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48000,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    writer.write_sample(1i32 << 22)?;
    writer.write_sample(-(1i32 << 23))?;
    writer.finalize()?;

    let audio = file::load_audio_from_path(&path)?;
    assert_eq!(audio.left(), &[0.5, -1.0]);
    assert_eq!(audio.left(), audio.right());
    Ok(())
}

#[test]
fn loading_nonexistent_file_returns_error() {
    let bogus = output_path("this_file_should_not_exist_12345.wav");
    assert!(!bogus.exists(), "bogus path unexpectedly exists: {:?}", bogus);

    let result = file::load_audio_from_path(&bogus);
    assert!(result.is_err(), "expected error for a missing file");
}

#[test]
fn loading_invalid_file_returns_error() -> anyhow::Result<()> {
    let path = output_path("not_audio.txt");
    {
        let mut f = fs::File::create(&path)?;
        writeln!(f, "this is not an audio file")?;
    }

    let result = file::load_audio_from_path(&path);
    assert!(result.is_err(), "expected error for a non-WAV file");
    Ok(())
}

#[test]
fn saving_to_unsupported_extension_fails() {
    let audio = Audio::from_mono(8000, vec![0.0; 8]);
    assert!(file::save_audio_to_path(&audio, output_path("out.flac")).is_err());
}
