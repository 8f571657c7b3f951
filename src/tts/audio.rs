//! Synthesized audio handed back across the boundary.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

/// Mono float32 PCM in `[-1, 1]` at `sample_rate` Hz.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Raw little-endian float32 bytes, the `NSData` payload iOS callers expect.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Write a 16-bit PCM WAV file.
    ///
    /// 16-bit PCM rather than IEEE float: Android's `MediaPlayer` accepts a
    /// float WAV header but plays silence.
    pub fn write_wav(&self, output_path: &Path) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(output_path, spec)
            .with_context(|| format!("Cannot create WAV: {}", output_path.display()))?;
        for &s in &self.samples {
            let s16 = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            writer.write_sample(s16).context("WAV write error")?;
        }
        writer.finalize().context("WAV finalise error")?;
        info!(
            samples = self.samples.len(),
            secs = self.duration_secs(),
            path = %output_path.display(),
            "wrote wav"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_bytes_layout() {
        let audio = AudioBuffer::new(vec![1.0, -0.5], 24_000);
        let bytes = audio.to_le_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-0.5f32).to_le_bytes());
    }

    #[test]
    fn test_duration() {
        let audio = AudioBuffer::new(vec![0.0; 12_000], 24_000);
        assert_eq!(audio.duration_secs(), 0.5);
        assert_eq!(AudioBuffer::new(vec![0.0; 4], 0).duration_secs(), 0.0);
    }

    #[test]
    fn test_write_wav_clamps_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        AudioBuffer::new(vec![0.0, 1.0, -1.0, 2.0], 16_000).write_wav(&path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, i16::MAX, -i16::MAX, i16::MAX]);
    }
}
