//! Model handle bridge: language-model resources behind integer handles.
//!
//! The managed caller gets a non-zero `i64` from [`ModelBridge::load`], passes
//! it back on every call and releases it once with [`ModelBridge::release`].
//! Every operation exists twice:
//!
//! * `try_*` returns [`Result`], used by Rust callers and tests;
//! * the plain name converts failures to the boundary sentinel
//!   (`0`, `None`, `""`, [`NOT_LOADED`]) and logs them.
//!
//! The JNI layer only calls the sentinel forms.

pub mod byte_model;

use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::handle::HandleTable;

pub use byte_model::{ByteModel, ByteModelLoader};

/// Returned by [`ModelBridge::generate`] when the handle does not name a loaded model.
pub const NOT_LOADED: &str = "Error: Model not loaded";

/// Token identifier as seen by the managed runtime (`jint`).
pub type TokenId = i32;

/// Sampling configuration, forwarded to the backend unmodified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    /// Upper bound on generated tokens.
    pub max_tokens: i32,
    /// Distribution sharpening (0 = greedy).
    pub temperature: f32,
    /// Nucleus bound (1.0 = disabled).
    pub top_p: f32,
    /// Candidate count bound (0 = disabled).
    pub top_k: i32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_tokens: 256, temperature: 0.7, top_p: 0.9, top_k: 40 }
    }
}

/// A loaded language model, provided by the wrapped inference engine.
///
/// Implementations are shared across threads; anything non-reentrant must be
/// guarded internally.
pub trait LanguageModel: Send + Sync {
    fn vocab_size(&self) -> usize;
    fn context_size(&self) -> usize;
    /// Size of the model's weights in bytes.
    fn model_size(&self) -> u64;
    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<TokenId>>;
    fn detokenize(&self, tokens: &[TokenId]) -> anyhow::Result<String>;
    fn generate(&self, prompt: &str, params: &GenerationParams) -> anyhow::Result<String>;
}

/// Constructs [`LanguageModel`]s from filesystem paths.
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn LanguageModel>>;
}

impl<F> ModelLoader for F
where
    F: Fn(&Path) -> anyhow::Result<Box<dyn LanguageModel>> + Send + Sync,
{
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn LanguageModel>> {
        self(path)
    }
}

static GLOBAL: OnceCell<ModelBridge> = OnceCell::new();

/// Handle table plus the loader used to fill it.
pub struct ModelBridge {
    models: HandleTable<Box<dyn LanguageModel>>,
    loader: Box<dyn ModelLoader>,
}

impl ModelBridge {
    pub fn new(loader: impl ModelLoader + 'static) -> Self {
        Self { models: HandleTable::new(), loader: Box::new(loader) }
    }

    /// Process-wide bridge used by the JNI exports.
    ///
    /// Defaults to [`ByteModelLoader`] unless [`install_global`](Self::install_global)
    /// ran first.
    pub fn global() -> &'static ModelBridge {
        GLOBAL.get_or_init(|| ModelBridge::new(ByteModelLoader))
    }

    /// Use `loader` for the process-wide bridge.
    ///
    /// Must be called before the first [`global`](Self::global) access;
    /// returns `false` (and changes nothing) afterwards.
    pub fn install_global(loader: impl ModelLoader + 'static) -> bool {
        GLOBAL.set(ModelBridge::new(loader)).is_ok()
    }

    /// Number of models currently loaded.
    pub fn live_models(&self) -> usize {
        self.models.len()
    }

    // ── Result API ───────────────────────────────────────────────────────────

    pub fn try_load(&self, path: &str) -> Result<i64> {
        if path.is_empty() {
            return Err(BridgeError::invalid("empty model path"));
        }
        let model = self
            .loader
            .load(Path::new(path))
            .map_err(|e| BridgeError::load(path, e))?;
        let handle = self.models.insert(model);
        info!(path, handle = format_args!("{handle:#x}"), "model loaded");
        Ok(handle)
    }

    pub fn try_generate(&self, handle: i64, prompt: &str, params: &GenerationParams) -> Result<String> {
        let model = self.models.get(handle)?;
        debug!(handle = format_args!("{handle:#x}"), ?params, prompt_len = prompt.len(), "generate");
        Ok(model.generate(prompt, params)?)
    }

    pub fn try_tokenize(&self, handle: i64, text: &str) -> Result<Vec<TokenId>> {
        let model = self.models.get(handle)?;
        let tokens = model.tokenize(text)?;
        check_token_range(&tokens, model.vocab_size())?;
        Ok(tokens)
    }

    pub fn try_detokenize(&self, handle: i64, tokens: &[TokenId]) -> Result<String> {
        let model = self.models.get(handle)?;
        check_token_range(tokens, model.vocab_size())?;
        Ok(model.detokenize(tokens)?)
    }

    pub fn try_vocab_size(&self, handle: i64) -> Result<usize> {
        Ok(self.models.get(handle)?.vocab_size())
    }

    pub fn try_context_size(&self, handle: i64) -> Result<usize> {
        Ok(self.models.get(handle)?.context_size())
    }

    pub fn try_model_size(&self, handle: i64) -> Result<u64> {
        Ok(self.models.get(handle)?.model_size())
    }

    /// Release the model behind `handle`.
    ///
    /// Returns `false` for 0, foreign, or already-released handles; those are
    /// ignored.  A call still running on the model keeps it alive until it
    /// returns.
    pub fn release(&self, handle: i64) -> bool {
        match self.models.remove(handle) {
            Some(_) => {
                info!(handle = format_args!("{handle:#x}"), "model released");
                true
            }
            None => {
                if handle != 0 {
                    warn!(handle = format_args!("{handle:#x}"), "release of unknown or released handle ignored");
                }
                false
            }
        }
    }

    // ── Sentinel API ─────────────────────────────────────────────────────────

    /// Load a model; `0` on failure.
    pub fn load(&self, path: &str) -> i64 {
        self.try_load(path).unwrap_or_else(|e| {
            warn!("{e}");
            0
        })
    }

    /// Generate text; [`NOT_LOADED`] for a bad handle, `"Error: …"` otherwise.
    pub fn generate(&self, handle: i64, prompt: &str, params: &GenerationParams) -> String {
        match self.try_generate(handle, prompt, params) {
            Ok(text) => text,
            Err(BridgeError::InvalidHandle(_)) => {
                warn!(handle = format_args!("{handle:#x}"), "generate: model not loaded");
                NOT_LOADED.to_string()
            }
            Err(e) => {
                warn!("generate failed: {e}");
                format!("Error: {e}")
            }
        }
    }

    /// Tokenize; `None` for a bad handle or tokenizer failure.
    pub fn tokenize(&self, handle: i64, text: &str) -> Option<Vec<TokenId>> {
        self.try_tokenize(handle, text).map_err(|e| warn!("tokenize: {e}")).ok()
    }

    /// Detokenize; empty string on any failure.
    pub fn detokenize(&self, handle: i64, tokens: &[TokenId]) -> String {
        self.try_detokenize(handle, tokens).unwrap_or_else(|e| {
            warn!("detokenize: {e}");
            String::new()
        })
    }

    pub fn vocab_size(&self, handle: i64) -> i64 {
        self.try_vocab_size(handle).map_or(0, saturate)
    }

    pub fn context_size(&self, handle: i64) -> i64 {
        self.try_context_size(handle).map_or(0, saturate)
    }

    pub fn model_size(&self, handle: i64) -> i64 {
        self.try_model_size(handle).map_or(0, saturate)
    }
}

fn saturate<N: TryInto<i64>>(n: N) -> i64 {
    n.try_into().unwrap_or(i64::MAX)
}

fn check_token_range(tokens: &[TokenId], vocab_size: usize) -> Result<()> {
    match tokens.iter().position(|&t| t < 0 || t as usize >= vocab_size) {
        Some(i) => Err(BridgeError::invalid(format!(
            "token {} at position {} outside [0, {})",
            tokens[i], i, vocab_size
        ))),
        None => Ok(()),
    }
}
