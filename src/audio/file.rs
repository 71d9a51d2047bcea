use crate::audio::Audio;
use anyhow::{Context, Result, anyhow, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

/// Audio file with interleaved samples:
/// layout = [ch0_f0, ch1_f0, ..., ch{n-1}_f0, ch0_f1, ch1_f1, ...]
pub struct AudioFileData {
    samples: Vec<f32>,
    n_samples: usize,
    sample_rate: u32,
    n_channels: usize,
}

impl AudioFileData {
    /// Reads a WAV file of integer or float PCM, scaled to [-1, 1].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader =
            WavReader::open(path).with_context(|| format!("Failed to open {path:?}"))?;
        let spec = reader.spec();
        let n_channels = spec.channels as usize;
        if n_channels == 0 {
            bail!("WAV header reports 0 channels for file {path:?}");
        }

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .with_context(|| format!("Failed to decode samples from {path:?}"))?,
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|s| s as f32 * scale))
                    .collect::<Result<_, _>>()
                    .with_context(|| format!("Failed to decode samples from {path:?}"))?
            }
        };

        if samples.len() % n_channels != 0 {
            return Err(anyhow!(
                "Sample count {} is not divisible by channel count {} for file {:?}",
                samples.len(),
                n_channels,
                path
            ));
        }
        let n_samples = samples.len() / n_channels;
        debug!(
            ?path,
            sample_rate = spec.sample_rate,
            n_channels,
            n_samples,
            "Loaded WAV file"
        );

        Ok(AudioFileData {
            samples,
            sample_rate: spec.sample_rate,
            n_samples,
            n_channels,
        })
    }

    /// Construct from already-interleaved samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 {
            return Err(anyhow!("channels must be > 0"));
        }
        if samples.len() % channels as usize != 0 {
            return Err(anyhow!(
                "samples length {} is not divisible by channels {}",
                samples.len(),
                channels
            ));
        }

        let n_channels = channels as usize;
        let n_samples = samples.len() / n_channels;

        Ok(AudioFileData {
            samples,
            sample_rate,
            n_channels,
            n_samples,
        })
    }

    /// Stereo file data from de-interleaved audio.
    pub fn from_audio(audio: &Audio) -> Self {
        AudioFileData {
            samples: audio.interleaved(),
            sample_rate: audio.sample_rate(),
            n_samples: audio.length(),
            n_channels: 2,
        }
    }

    /// Save audio data to a WAV file (16-bit PCM, interleaved channels).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("wav") => {
                let spec = WavSpec {
                    channels: self.n_channels as u16,
                    sample_rate: self.sample_rate,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                };

                let mut writer = WavWriter::create(path, spec)
                    .with_context(|| format!("Failed to create {path:?}"))?;

                for &sample in &self.samples {
                    // Clamp to [-1.0, 1.0] before scaling to i16
                    let clamped = sample.clamp(-1.0, 1.0);
                    let int_sample = (clamped * i16::MAX as f32) as i16;
                    writer.write_sample(int_sample)?;
                }

                writer.finalize()?;
                debug!(?path, n_samples = self.n_samples, "Saved WAV file");
                Ok(())
            }
            _ => Err(anyhow!("Unsupported file format; only .wav is supported.")),
        }
    }

    /// Mono files are duplicated to both channels; channels past the second
    /// are dropped.
    pub fn to_audio(&self) -> Audio {
        if self.n_channels == 1 {
            return Audio::from_mono(self.sample_rate, self.samples.clone());
        }
        let mut left = Vec::with_capacity(self.n_samples);
        let mut right = Vec::with_capacity(self.n_samples);

        for frame in self.samples.chunks_exact(self.n_channels) {
            left.push(frame[0]);
            right.push(frame[1]);
        }
        Audio::new(self.sample_rate, left, right)
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub fn load_audio_from_path<P: AsRef<Path>>(path: P) -> Result<Audio> {
    Ok(AudioFileData::load(path)?.to_audio())
}

pub fn save_audio_to_path<P: AsRef<Path>>(audio: &Audio, path: P) -> Result<()> {
    AudioFileData::from_audio(audio).save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_layouts() {
        assert!(AudioFileData::new(vec![0.0; 4], 44100, 0).is_err());
        assert!(AudioFileData::new(vec![0.0; 5], 44100, 2).is_err());
        let data = AudioFileData::new(vec![0.0; 6], 44100, 3).unwrap();
        assert_eq!(data.n_samples(), 2);
    }

    #[test]
    fn test_to_audio_takes_first_two_channels() {
        let data = AudioFileData::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 8000, 3).unwrap();
        let audio = data.to_audio();
        assert_eq!(audio.left(), &[1.0, 4.0]);
        assert_eq!(audio.right(), &[2.0, 5.0]);
    }

    #[test]
    fn test_mono_is_duplicated() {
        let data = AudioFileData::new(vec![0.1, 0.2, 0.3], 8000, 1).unwrap();
        let audio = data.to_audio();
        assert_eq!(audio.left(), audio.right());
        assert_eq!(audio.length(), 3);
    }

    #[test]
    fn test_save_rejects_non_wav_extension() {
        let data = AudioFileData::new(vec![0.0; 2], 8000, 1).unwrap();
        assert!(data.save("out.mp3").is_err());
    }
}
