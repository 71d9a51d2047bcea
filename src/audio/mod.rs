pub mod autotune;
pub mod config;
pub mod file;
pub mod params;
pub mod scales;
pub mod voices;

use tracing::debug;

/// De-interleaved stereo audio. Mono sources carry the same samples on
/// both channels.
#[derive(Clone, Debug)]
pub struct Audio {
    sample_rate: u32,
    length: usize,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl Audio {
    /// Builds stereo audio; the shorter channel is padded with silence.
    pub fn new(sample_rate: u32, mut left: Vec<f32>, mut right: Vec<f32>) -> Self {
        let length = left.len().max(right.len());
        if left.len() != right.len() {
            debug!(
                left_len = left.len(),
                right_len = right.len(),
                "Padding mismatched channel lengths"
            );
        }
        left.resize(length, 0.0);
        right.resize(length, 0.0);
        Self {
            sample_rate,
            length,
            left,
            right,
        }
    }

    pub fn from_mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, samples.clone(), samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Length in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.length as f32 / self.sample_rate.max(1) as f32
    }

    /// True when both channels hold identical samples.
    pub fn is_dual_mono(&self) -> bool {
        self.left == self.right
    }

    /// Returns interleaved stereo samples as a Vec<f32>
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.length * 2];
        interleave_stereo(&self.left, &self.right, &mut out);
        out
    }
}

/// Interleaves two channels into `out`, which must hold two samples per frame.
fn interleave_stereo(left: &[f32], right: &[f32], out: &mut [f32]) {
    for (i, frame) in out.chunks_exact_mut(2).enumerate() {
        frame[0] = left.get(i).copied().unwrap_or(0.0);
        frame[1] = right.get(i).copied().unwrap_or(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_channels_are_padded() {
        let audio = Audio::new(48000, vec![1.0, 2.0, 3.0], vec![4.0]);
        assert_eq!(audio.length(), 3);
        assert_eq!(audio.right(), &[4.0, 0.0, 0.0]);
    }

    #[test]
    fn test_interleaved_layout() {
        let audio = Audio::new(44100, vec![1.0, 2.0], vec![-1.0, -2.0]);
        assert_eq!(audio.interleaved(), vec![1.0, -1.0, 2.0, -2.0]);
        assert!(!audio.is_dual_mono());
        assert!(Audio::from_mono(44100, vec![0.5; 4]).is_dual_mono());
    }
}
