//! JSON configuration read next to model files.
//!
//! | File                         | Read by                      |
//! |------------------------------|------------------------------|
//! | `<model file>.json`          | [`LlmSidecar::for_model`]    |
//! | `<model dir>/config.json`    | [`TtsManifest::for_model_dir`] |
//!
//! Both files are optional; a missing file yields the defaults, a malformed
//! one fails the load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::tts::ModelType;

fn read_optional_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = std::fs::read(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM sidecar
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_VOCAB_SIZE: usize = 32_000;
pub const DEFAULT_CONTEXT_SIZE: usize = 2_048;

/// Optional `<model>.json` describing a language model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSidecar {
    pub vocab_size: usize,
    pub context_size: usize,
}

impl Default for LlmSidecar {
    fn default() -> Self {
        Self { vocab_size: DEFAULT_VOCAB_SIZE, context_size: DEFAULT_CONTEXT_SIZE }
    }
}

impl LlmSidecar {
    /// Path of the sidecar for `model_path` (`model.gguf` → `model.gguf.json`).
    pub fn path_for(model_path: &Path) -> PathBuf {
        let mut name = model_path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub fn for_model(model_path: &Path) -> Result<Self> {
        let sidecar: Self = read_optional_json(&Self::path_for(model_path))?;
        if sidecar.vocab_size < 256 {
            bail!("vocab_size {} cannot hold the byte vocabulary", sidecar.vocab_size);
        }
        if sidecar.context_size == 0 {
            bail!("context_size must be non-zero");
        }
        Ok(sidecar)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TTS manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Optional `config.json` inside a TTS model directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TtsManifest {
    /// Output sample rate; defaults per model type.
    pub sample_rate: Option<u32>,

    /// Named speakers, index = speaker id.
    pub speakers: Vec<String>,

    /// Speaker count for multi-speaker models without names.
    pub num_speakers: Option<usize>,

    /// Acoustic model filename (default `model.onnx`).
    pub model_file: Option<String>,

    /// Vocoder filename for matcha (default `vocoder.onnx`).
    pub vocoder_file: Option<String>,

    pub noise_scale: Option<f32>,
    pub noise_scale_w: Option<f32>,
    pub length_scale: Option<f32>,
}

impl TtsManifest {
    pub fn for_model_dir(dir: &Path) -> Result<Self> {
        read_optional_json(&dir.join("config.json"))
    }

    pub fn sample_rate_for(&self, model_type: ModelType) -> u32 {
        self.sample_rate.unwrap_or_else(|| model_type.default_sample_rate())
    }

    pub fn model_file(&self) -> &str {
        self.model_file.as_deref().unwrap_or("model.onnx")
    }

    pub fn vocoder_file(&self) -> &str {
        self.vocoder_file.as_deref().unwrap_or("vocoder.onnx")
    }

    /// Speaker count declared by the manifest (names win over the bare count).
    pub fn declared_speakers(&self) -> usize {
        if !self.speakers.is_empty() {
            self.speakers.len()
        } else {
            self.num_speakers.unwrap_or(1).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = LlmSidecar::for_model(&dir.path().join("m.gguf")).unwrap();
        assert_eq!(sidecar.vocab_size, DEFAULT_VOCAB_SIZE);
        assert_eq!(sidecar.context_size, DEFAULT_CONTEXT_SIZE);
    }

    #[test]
    fn test_sidecar_partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.gguf");
        std::fs::write(LlmSidecar::path_for(&model), r#"{"context_size": 512}"#).unwrap();
        let sidecar = LlmSidecar::for_model(&model).unwrap();
        assert_eq!(sidecar.vocab_size, DEFAULT_VOCAB_SIZE);
        assert_eq!(sidecar.context_size, 512);
    }

    #[test]
    fn test_sidecar_rejects_tiny_vocab() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.gguf");
        std::fs::write(LlmSidecar::path_for(&model), r#"{"vocab_size": 100}"#).unwrap();
        assert!(LlmSidecar::for_model(&model).is_err());
    }

    #[test]
    fn test_sidecar_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("m.gguf");
        std::fs::write(LlmSidecar::path_for(&model), "{not json").unwrap();
        assert!(LlmSidecar::for_model(&model).is_err());
    }

    #[test]
    fn test_manifest_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let m = TtsManifest::for_model_dir(dir.path()).unwrap();
        assert_eq!(m.sample_rate_for(ModelType::Kitten), 24_000);
        assert_eq!(m.sample_rate_for(ModelType::Vits), 22_050);
        assert_eq!(m.model_file(), "model.onnx");
        assert_eq!(m.declared_speakers(), 1);
    }

    #[test]
    fn test_manifest_speakers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"sample_rate": 16000, "speakers": ["amy", "ben"], "num_speakers": 9}"#,
        )
        .unwrap();
        let m = TtsManifest::for_model_dir(dir.path()).unwrap();
        assert_eq!(m.sample_rate_for(ModelType::Matcha), 16_000);
        assert_eq!(m.declared_speakers(), 2);
    }
}
