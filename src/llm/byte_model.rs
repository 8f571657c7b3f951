//! Byte-level reference backend.
//!
//! Used when no native inference engine has been installed with
//! [`ModelBridge::install_global`](super::ModelBridge::install_global).
//! It opens the model file for real (so bad paths fail the load and the model
//! size is the file size) but does not evaluate weights:
//!
//! - tokens are UTF-8 bytes, ids `0..256`; ids `256..vocab_size` are control
//!   tokens and detokenize to nothing, so tokenize → detokenize is lossless;
//! - generation returns a fixed notice bounded by `max_tokens` bytes.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use tracing::debug;

use super::{GenerationParams, LanguageModel, ModelLoader, TokenId};
use crate::config::LlmSidecar;

/// Ids at or above this value are control tokens.
const FIRST_CONTROL_TOKEN: TokenId = 256;

pub struct ByteModel {
    path: PathBuf,
    size_bytes: u64,
    vocab_size: usize,
    context_size: usize,
}

impl ByteModel {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open model: {}", path.display()))?;
        let meta = file
            .metadata()
            .with_context(|| format!("Cannot stat model: {}", path.display()))?;
        if !meta.is_file() {
            bail!("{} is not a regular file", path.display());
        }
        let sidecar = LlmSidecar::for_model(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: meta.len(),
            vocab_size: sidecar.vocab_size,
            context_size: sidecar.context_size,
        })
    }

    fn reply(&self, prompt_tokens: usize) -> String {
        format!(
            "Generated response for a {prompt_tokens}-token prompt. \
             No native inference engine is linked; the model at {} was opened but not evaluated.",
            self.path.display()
        )
    }
}

/// Longest prefix of `s` that is at most `max_bytes` long and ends on a char boundary.
fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl LanguageModel for ByteModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn model_size(&self) -> u64 {
        self.size_bytes
    }

    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<String> {
        let bytes: Vec<u8> = tokens
            .iter()
            .filter(|&&t| (0..FIRST_CONTROL_TOKEN).contains(&t))
            .map(|&t| t as u8)
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let prompt_tokens = prompt.len();
        if prompt_tokens >= self.context_size {
            bail!(
                "prompt of {} tokens does not fit the {}-token context window",
                prompt_tokens,
                self.context_size
            );
        }
        let budget = usize::try_from(params.max_tokens)
            .unwrap_or(0)
            .min(self.context_size - prompt_tokens);
        debug!(budget, temperature = params.temperature, top_p = params.top_p, top_k = params.top_k, "byte model generate");
        let reply = self.reply(prompt_tokens);
        Ok(truncate_at_boundary(&reply, budget).to_string())
    }
}

/// [`ModelLoader`] producing [`ByteModel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteModelLoader;

impl ModelLoader for ByteModelLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn LanguageModel>> {
        Ok(Box::new(ByteModel::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelBridge, NOT_LOADED};

    fn model_file(dir: &tempfile::TempDir, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join("tiny.gguf");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_missing_path_fails() {
        assert!(ByteModel::open(Path::new("missing/path")).is_err());
    }

    #[test]
    fn test_directory_is_not_a_model() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ByteModel::open(dir.path()).is_err());
    }

    #[test]
    fn test_model_size_is_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let m = ByteModel::open(&model_file(&dir, &[0u8; 4096])).unwrap();
        assert_eq!(m.model_size(), 4096);
        assert_eq!(m.vocab_size(), 32_000);
        assert_eq!(m.context_size(), 2_048);
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let m = ByteModel::open(&model_file(&dir, b"w")).unwrap();
        for text in ["", "hello world", "naïve café — ünïcode ✓", "line\nbreak\t"] {
            let ids = m.tokenize(text).unwrap();
            assert_eq!(ids.len(), text.len());
            assert!(ids.iter().all(|&t| (0..256).contains(&t)));
            assert_eq!(m.detokenize(&ids).unwrap(), text);
        }
    }

    #[test]
    fn test_control_tokens_render_empty() {
        let dir = tempfile::tempdir().unwrap();
        let m = ByteModel::open(&model_file(&dir, b"w")).unwrap();
        assert_eq!(m.detokenize(&[256, 104, 105, 31_999]).unwrap(), "hi");
    }

    #[test]
    fn test_generate_respects_max_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let m = ByteModel::open(&model_file(&dir, b"w")).unwrap();
        let params = GenerationParams { max_tokens: 10, ..Default::default() };
        let out = m.generate("hi", &params).unwrap();
        assert!(!out.is_empty());
        assert!(out.len() <= 10);
        let none = GenerationParams { max_tokens: -1, ..Default::default() };
        assert_eq!(m.generate("hi", &none).unwrap(), "");
    }

    #[test]
    fn test_prompt_longer_than_context_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, b"w");
        std::fs::write(LlmSidecar::path_for(&path), r#"{"context_size": 8}"#).unwrap();
        let m = ByteModel::open(&path).unwrap();
        assert!(m.generate("this prompt is too long", &GenerationParams::default()).is_err());
    }

    #[test]
    fn test_truncate_at_boundary() {
        assert_eq!(truncate_at_boundary("héllo", 2), "h");
        assert_eq!(truncate_at_boundary("héllo", 3), "hé");
        assert_eq!(truncate_at_boundary("abc", 10), "abc");
    }

    #[test]
    fn test_bridge_scenario_missing_model() {
        let bridge = ModelBridge::new(ByteModelLoader);
        let h = bridge.load("missing/path");
        assert_eq!(h, 0);
        let params = GenerationParams { max_tokens: 10, temperature: 0.7, top_p: 0.9, top_k: 40 };
        assert_eq!(bridge.generate(h, "hi", &params), NOT_LOADED);
    }

    #[test]
    fn test_bridge_round_trip_through_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = model_file(&dir, b"weights");
        let bridge = ModelBridge::new(ByteModelLoader);
        let h = bridge.load(path.to_str().unwrap());
        assert_ne!(h, 0);
        let ids = bridge.tokenize(h, "Hello, JNI").unwrap();
        assert_eq!(bridge.detokenize(h, &ids), "Hello, JNI");
        assert_eq!(bridge.model_size(h), 7);
        assert!(bridge.release(h));
        assert_eq!(bridge.tokenize(h, "x"), None);
    }
}
